//! Return Material Authorization form logic.

use crate::allocation::{InventoryService, LookupFilter};
use crate::error::{CoreError, Result};
use crate::types::non_empty;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Rate and line of an item on a purchase order. Both empty when the item
/// is not on the order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PoItemRate {
    pub rate: f64,
    pub po_line_reference: String,
}

/// One pick-list entry for the part number field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoItemOption {
    pub item_code: String,
    pub label: String,
}

/// Purchase order queries answered by the host.
pub trait PurchaseOrderService: Send + Sync {
    /// Distinct items on the order whose code, name or description
    /// contains `txt`, in line order.
    fn items_from_purchase_order(&self, purchase_order: &str, txt: &str) -> Result<Vec<PoItemOption>>;

    /// Rate and line reference of the first line carrying the item.
    fn item_rate_from_purchase_order(&self, purchase_order: &str, item_code: &str) -> Result<PoItemRate>;
}

fn html_tags() -> Result<&'static Regex> {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    if let Some(re) = TAGS.get() {
        return Ok(re);
    }
    let re = Regex::new(r"<[^>]*>")
        .map_err(|e| CoreError::InvalidFormat(format!("html tag pattern: {}", e)))?;
    Ok(TAGS.get_or_init(|| re))
}

/// Remove markup tags and surrounding whitespace.
pub fn strip_html(text: &str) -> Result<String> {
    Ok(html_tags()?.replace_all(text, "").trim().to_string())
}

/// Return Material Authorization being edited.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReturnAuthorization {
    pub purchase_order: Option<String>,
    pub part_number: Option<String>,
    pub part_description: String,
    pub rate: f64,
    pub po_line_reference: String,
    pub quantity: f64,
    pub value: f64,
}

impl ReturnAuthorization {
    pub fn new() -> Self {
        Self::default()
    }

    /// Purchase order changed. Part lookups follow the new order.
    pub fn set_purchase_order(&mut self, purchase_order: Option<&str>) {
        self.purchase_order = non_empty(purchase_order);
    }

    /// Part number changed.
    ///
    /// Clearing it clears description, rate and line reference. Setting it
    /// loads the description from the item master and, with an order
    /// selected, the order rate. Nothing changes if a lookup fails.
    pub fn set_part_number(
        &mut self,
        part_number: Option<&str>,
        inventory: &dyn InventoryService,
        orders: &dyn PurchaseOrderService,
    ) -> Result<()> {
        let Some(part_number) = non_empty(part_number) else {
            self.part_number = None;
            self.part_description.clear();
            self.rate = 0.0;
            self.po_line_reference.clear();
            return Ok(());
        };

        let description = match inventory.item_master(&part_number)? {
            Some(item) => {
                let raw = item
                    .description
                    .as_deref()
                    .and_then(|d| non_empty(Some(d)))
                    .unwrap_or(item.display_name);
                strip_html(&raw)?
            }
            None => String::new(),
        };

        let order_rate = match &self.purchase_order {
            Some(po) => Some(orders.item_rate_from_purchase_order(po, &part_number)?),
            None => None,
        };

        self.part_number = Some(part_number);
        self.part_description = description;
        if let Some(order_rate) = order_rate {
            if order_rate.rate != 0.0 {
                self.rate = order_rate.rate;
            }
            if !order_rate.po_line_reference.is_empty() {
                self.po_line_reference = order_rate.po_line_reference;
            }
        }

        tracing::debug!(part = ?self.part_number, rate = self.rate, "rma part loaded");
        Ok(())
    }

    /// Quantity changed.
    pub fn set_quantity(&mut self, quantity: f64) {
        self.quantity = quantity;
        self.recompute_value();
    }

    pub fn set_rate(&mut self, rate: f64) {
        self.rate = rate;
    }

    /// Recompute derived fields before save.
    pub fn validate(&mut self) -> Result<()> {
        if self.quantity < 0.0 {
            return Err(CoreError::InvalidOperation(format!(
                "return quantity cannot be negative: {}",
                self.quantity
            )));
        }
        self.recompute_value();
        Ok(())
    }

    fn recompute_value(&mut self) {
        self.value = self.quantity * self.rate;
    }

    /// Lookup restriction for the part number field. Nothing is offered
    /// until an order is chosen.
    pub fn part_number_filter(&self) -> LookupFilter {
        match &self.purchase_order {
            Some(po) => LookupFilter::PurchaseOrderItems {
                purchase_order: po.clone(),
            },
            None => LookupFilter::Nothing,
        }
    }

    /// Pick-list for the part number field. Empty without an order.
    pub fn part_number_options(&self, orders: &dyn PurchaseOrderService, txt: &str) -> Result<Vec<PoItemOption>> {
        match &self.purchase_order {
            Some(po) => orders.items_from_purchase_order(po, txt),
            None => Ok(Vec::new()),
        }
    }
}

//! In-memory purchase order book.

use crate::error::Result;
use crate::procurement::rma::{PoItemOption, PoItemRate, PurchaseOrderService};
use parking_lot::RwLock;
use std::collections::HashMap;

/// One line of a purchase order.
#[derive(Clone, Debug, PartialEq)]
pub struct PurchaseOrderLine {
    /// Line identifier, used as the line reference on returns.
    pub name: String,
    pub item_code: String,
    pub item_name: Option<String>,
    pub description: Option<String>,
    pub rate: f64,
}

impl PurchaseOrderLine {
    fn matches(&self, needle: &str) -> bool {
        let contains = |field: &str| field.to_lowercase().contains(needle);
        contains(&self.item_code)
            || self.item_name.as_deref().is_some_and(contains)
            || self.description.as_deref().is_some_and(contains)
    }
}

/// Purchase orders held in memory, lines kept in entry order.
#[derive(Default)]
pub struct PurchaseOrderBook {
    orders: RwLock<HashMap<String, Vec<PurchaseOrderLine>>>,
}

impl PurchaseOrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_line(&self, purchase_order: &str, line: PurchaseOrderLine) {
        self.orders
            .write()
            .entry(purchase_order.to_string())
            .or_default()
            .push(line);
    }
}

impl PurchaseOrderService for PurchaseOrderBook {
    fn items_from_purchase_order(&self, purchase_order: &str, txt: &str) -> Result<Vec<PoItemOption>> {
        let orders = self.orders.read();
        let Some(lines) = orders.get(purchase_order) else {
            return Ok(Vec::new());
        };

        let needle = txt.trim().to_lowercase();
        let mut options: Vec<PoItemOption> = Vec::new();
        for line in lines.iter().filter(|line| line.matches(&needle)) {
            if options.iter().any(|o| o.item_code == line.item_code) {
                continue;
            }
            options.push(PoItemOption {
                item_code: line.item_code.clone(),
                label: line.item_name.clone().unwrap_or_else(|| line.item_code.clone()),
            });
        }
        Ok(options)
    }

    fn item_rate_from_purchase_order(&self, purchase_order: &str, item_code: &str) -> Result<PoItemRate> {
        let orders = self.orders.read();
        let line = orders
            .get(purchase_order)
            .and_then(|lines| lines.iter().find(|line| line.item_code == item_code));

        Ok(line
            .map(|line| PoItemRate {
                rate: line.rate,
                po_line_reference: line.name.clone(),
            })
            .unwrap_or_default())
    }
}

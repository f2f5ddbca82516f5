//! Reserve Stock document: validation, submission and the unreserve gate.

use crate::allocation::{AllocationRow, AllocationSession, InventoryService, RowStatus};
use crate::error::{CoreError, Result};
use crate::notices::{CoreEvent, NoticeHub};
use crate::types::{Affordance, DocName, DocStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reservation persistence and status changes, owned by the host.
pub trait ReservationService: Send + Sync {
    /// Load a reservation.
    fn fetch(&self, name: &DocName) -> Result<ReserveStock>;

    /// Store a reservation as it is.
    fn persist(&self, doc: &ReserveStock) -> Result<()>;

    /// Quantity of a batch in a warehouse held by submitted reservations
    /// other than `exclude`.
    fn reserved_batch_qty(
        &self,
        batch_no: &str,
        warehouse: &str,
        exclude: Option<&DocName>,
    ) -> Result<f64>;

    /// Move every row that is not yet Unreserved to Unreserved.
    /// Returns the number of rows changed.
    fn mark_as_unreserved(&self, name: &DocName) -> Result<usize>;
}

/// A stock reservation with its rows.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReserveStock {
    pub name: DocName,
    pub docstatus: DocStatus,
    pub items: Vec<AllocationRow>,
}

impl ReserveStock {
    pub fn new(name: impl Into<DocName>) -> Self {
        Self {
            name: name.into(),
            docstatus: DocStatus::Draft,
            items: Vec::new(),
        }
    }

    pub fn with_rows(mut self, rows: Vec<AllocationRow>) -> Self {
        self.items = rows;
        self
    }

    /// Open the rows for editing.
    pub fn edit_rows(&mut self) -> AllocationSession {
        AllocationSession::from_rows(std::mem::take(&mut self.items))
    }

    /// Take edited rows back.
    pub fn finish_editing(&mut self, session: AllocationSession) {
        self.items = session.into_rows();
    }

    /// Any row that still holds stock.
    pub fn has_reserved_rows(&self) -> bool {
        self.items
            .iter()
            .any(|row| row.status != Some(RowStatus::Unreserved))
    }

    /// Whether the Unreserve button is offered.
    pub fn can_unreserve(&self) -> bool {
        self.docstatus == DocStatus::Submitted && self.has_reserved_rows()
    }

    /// Buttons available for the current state.
    pub fn refresh(&self) -> Vec<Affordance> {
        if self.can_unreserve() {
            vec![Affordance::Unreserve]
        } else {
            Vec::new()
        }
    }

    /// Draft validation.
    pub fn validate(
        &self,
        inventory: &dyn InventoryService,
        reservations: &dyn ReservationService,
    ) -> Result<()> {
        self.validate_warehouses()?;
        self.validate_batch_availability(inventory, reservations)
    }

    /// Every row needs a warehouse.
    pub fn validate_warehouses(&self) -> Result<()> {
        for (idx, row) in self.items.iter().enumerate() {
            if row.warehouse.is_none() {
                return Err(CoreError::WarehouseRequired { row: idx + 1 });
            }
        }
        Ok(())
    }

    /// Requested batch quantity per warehouse must fit in current stock
    /// less what other submitted reservations already hold.
    pub fn validate_batch_availability(
        &self,
        inventory: &dyn InventoryService,
        reservations: &dyn ReservationService,
    ) -> Result<()> {
        let mut requested: BTreeMap<(String, String), f64> = BTreeMap::new();

        for (idx, row) in self.items.iter().enumerate() {
            if row.status.unwrap_or(RowStatus::Reserved) != RowStatus::Reserved {
                continue;
            }

            let Some(batch_no) = row.batch_no.clone() else {
                continue;
            };
            let Some(warehouse) = row.warehouse.clone() else {
                return Err(CoreError::WarehouseRequired { row: idx + 1 });
            };
            if row.quantity <= 0.0 {
                return Err(CoreError::InvalidQuantity {
                    row: idx + 1,
                    batch: batch_no,
                });
            }

            *requested.entry((batch_no, warehouse)).or_insert(0.0) += row.quantity;
        }

        for ((batch_no, warehouse), requested_qty) in requested {
            let current = inventory.batch_qty_in_warehouse(&batch_no, &warehouse, None)?;
            let reserved = reservations.reserved_batch_qty(&batch_no, &warehouse, Some(&self.name))?;
            let available = current - reserved;

            if requested_qty > available {
                return Err(CoreError::InsufficientBatchQty {
                    batch: batch_no,
                    warehouse,
                    requested: requested_qty,
                    available,
                    current,
                    reserved,
                });
            }
        }

        Ok(())
    }

    /// Rows without a status become Reserved, then availability is checked.
    pub fn before_submit(
        &mut self,
        inventory: &dyn InventoryService,
        reservations: &dyn ReservationService,
    ) -> Result<()> {
        for row in &mut self.items {
            if row.status.is_none() {
                row.status = Some(RowStatus::Reserved);
            }
        }
        self.validate_batch_availability(inventory, reservations)
    }

    /// Validate, submit and persist. The document is unchanged on failure.
    pub fn submit(
        &mut self,
        inventory: &dyn InventoryService,
        reservations: &dyn ReservationService,
    ) -> Result<()> {
        if self.docstatus != DocStatus::Draft {
            return Err(CoreError::InvalidOperation(format!(
                "{} is not a draft",
                self.name
            )));
        }

        let mut submitted = self.clone();
        submitted.validate(inventory, reservations)?;
        submitted.before_submit(inventory, reservations)?;
        submitted.docstatus = DocStatus::Submitted;
        reservations.persist(&submitted)?;

        tracing::info!(name = %self.name, rows = submitted.items.len(), "reserve stock submitted");
        *self = submitted;
        Ok(())
    }

    /// Save edits made to a submitted document (e.g. row status changes),
    /// re-running validation first.
    pub fn update_after_submit(
        &self,
        inventory: &dyn InventoryService,
        reservations: &dyn ReservationService,
    ) -> Result<()> {
        if self.docstatus != DocStatus::Submitted {
            return Err(CoreError::NotSubmitted(self.name.clone()));
        }
        self.validate(inventory, reservations)?;
        reservations.persist(self)
    }

    /// Unreserve button. Does nothing unless the button would be offered.
    ///
    /// Returns the number of rows changed; the document is reloaded from
    /// the service afterwards.
    pub fn unreserve(
        &mut self,
        reservations: &dyn ReservationService,
        notices: Option<&NoticeHub>,
    ) -> Result<Option<usize>> {
        if !self.can_unreserve() {
            return Ok(None);
        }

        let rows = reservations.mark_as_unreserved(&self.name)?;
        *self = reservations.fetch(&self.name)?;

        tracing::info!(name = %self.name, rows, "reserve stock unreserved");
        if let Some(hub) = notices {
            hub.publish(CoreEvent::Unreserved {
                name: self.name.clone(),
                rows,
            });
        }

        Ok(Some(rows))
    }
}

//! Allocation rows and their constraint state.

use crate::allocation::resolver::{AllowedWarehouses, ItemMaster};
use crate::types::non_empty;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a row within a session.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowId(pub u64);

impl fmt::Debug for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RowId({})", self.0)
    }
}

/// Reservation status of a row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowStatus {
    Reserved,
    Unreserved,
}

/// Which identity constraints narrow the row's warehouses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConstraintState {
    Unconstrained,
    SerialConstrained,
    BatchConstrained,
    FullyConstrained,
}

/// Stage of the per-row recompute chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecomputeStage {
    /// Item master lookup after an item change.
    Item,
    /// Allowed warehouses for the serial/batch constraint.
    Warehouses,
    /// Batch quantity in the chosen warehouse.
    Quantity,
}

/// Per-stage generation counters. A response is only applied while the
/// generation it was issued under is still current.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Generations {
    item: u64,
    warehouses: u64,
    quantity: u64,
}

impl Generations {
    pub(crate) fn bump(&mut self, stage: RecomputeStage) -> u64 {
        let slot = self.slot_mut(stage);
        *slot += 1;
        *slot
    }

    pub(crate) fn current(&self, stage: RecomputeStage) -> u64 {
        match stage {
            RecomputeStage::Item => self.item,
            RecomputeStage::Warehouses => self.warehouses,
            RecomputeStage::Quantity => self.quantity,
        }
    }

    fn slot_mut(&mut self, stage: RecomputeStage) -> &mut u64 {
        match stage {
            RecomputeStage::Item => &mut self.item,
            RecomputeStage::Warehouses => &mut self.warehouses,
            RecomputeStage::Quantity => &mut self.quantity,
        }
    }
}

/// A line requesting stock, optionally pinned to a serial or batch.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AllocationRow {
    pub id: RowId,
    pub item_code: Option<String>,
    pub item_name: String,
    pub has_serial_no: bool,
    pub has_batch_no: bool,
    pub quantity: f64,
    pub serial_no: Option<String>,
    pub batch_no: Option<String>,
    pub warehouse: Option<String>,

    /// Derived; recomputed from batch and warehouse.
    pub available_qty: f64,

    pub status: Option<RowStatus>,

    /// Derived and never persisted.
    #[serde(skip)]
    pub(crate) allowed: AllowedWarehouses,

    #[serde(skip)]
    pub(crate) generations: Generations,
}

impl AllocationRow {
    pub fn new(id: RowId) -> Self {
        Self {
            id,
            item_code: None,
            item_name: String::new(),
            has_serial_no: false,
            has_batch_no: false,
            quantity: 0.0,
            serial_no: None,
            batch_no: None,
            warehouse: None,
            available_qty: 0.0,
            status: None,
            allowed: AllowedWarehouses::Unrestricted,
            generations: Generations::default(),
        }
    }

    /// Builder used when rows come from an import or a fixture.
    pub fn with_item(mut self, item_code: &str, quantity: f64) -> Self {
        self.item_code = non_empty(Some(item_code));
        self.quantity = quantity;
        self
    }

    pub fn with_serial(mut self, serial_no: &str) -> Self {
        self.serial_no = non_empty(Some(serial_no));
        self.enforce_serial_quantity();
        self
    }

    pub fn with_batch(mut self, batch_no: &str) -> Self {
        self.batch_no = non_empty(Some(batch_no));
        self
    }

    pub fn with_warehouse(mut self, warehouse: &str) -> Self {
        self.warehouse = non_empty(Some(warehouse));
        self
    }

    pub fn with_status(mut self, status: RowStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn constraint_state(&self) -> ConstraintState {
        match (self.serial_no.is_some(), self.batch_no.is_some()) {
            (false, false) => ConstraintState::Unconstrained,
            (true, false) => ConstraintState::SerialConstrained,
            (false, true) => ConstraintState::BatchConstrained,
            (true, true) => ConstraintState::FullyConstrained,
        }
    }

    /// Quantity is locked while a serial number pins it to one.
    pub fn quantity_editable(&self) -> bool {
        self.serial_no.is_none()
    }

    pub fn allowed_warehouses(&self) -> &AllowedWarehouses {
        &self.allowed
    }

    /// Force quantity to 1 for serialized rows. Returns true if it changed.
    pub fn enforce_serial_quantity(&mut self) -> bool {
        if self.serial_no.is_some() && self.quantity != 1.0 {
            self.quantity = 1.0;
            return true;
        }
        false
    }

    pub(crate) fn apply_item_master(&mut self, master: Option<&ItemMaster>) {
        match master {
            Some(item) => {
                self.item_name = item.display_name.clone();
                self.has_serial_no = item.has_serial_no;
                self.has_batch_no = item.has_batch_no;
            }
            None => self.clear_item_master(),
        }
    }

    pub(crate) fn clear_item_master(&mut self) {
        self.item_name.clear();
        self.has_serial_no = false;
        self.has_batch_no = false;
    }
}

/// Restriction the host applies to a row's link-field pickers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LookupFilter {
    /// No restriction.
    Any,
    /// Matches nothing; the picker offers no options.
    Nothing,
    /// Active serial numbers of an item.
    ActiveSerialsOf { item_code: String },
    /// Enabled batches of an item.
    EnabledBatchesOf { item_code: String },
    /// Non-group warehouses among the given names.
    WarehousesIn(Vec<String>),
    /// Any non-group warehouse.
    NonGroupWarehouses,
    /// Items on a purchase order.
    PurchaseOrderItems { purchase_order: String },
}

impl AllocationRow {
    pub fn serial_no_filter(&self) -> LookupFilter {
        match &self.item_code {
            Some(item_code) => LookupFilter::ActiveSerialsOf {
                item_code: item_code.clone(),
            },
            None => LookupFilter::Any,
        }
    }

    pub fn batch_no_filter(&self) -> LookupFilter {
        match &self.item_code {
            Some(item_code) => LookupFilter::EnabledBatchesOf {
                item_code: item_code.clone(),
            },
            None => LookupFilter::Any,
        }
    }

    pub fn warehouse_filter(&self) -> LookupFilter {
        match &self.allowed {
            AllowedWarehouses::Restricted(set) if !set.is_empty() => {
                LookupFilter::WarehousesIn(set.iter().cloned().collect())
            }
            _ => LookupFilter::NonGroupWarehouses,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_constraint_states() {
        let row = AllocationRow::new(RowId(1)).with_item("X", 3.0);
        assert_eq!(row.constraint_state(), ConstraintState::Unconstrained);

        let row = row.with_batch("B1");
        assert_eq!(row.constraint_state(), ConstraintState::BatchConstrained);

        let row = row.with_serial("S1");
        assert_eq!(row.constraint_state(), ConstraintState::FullyConstrained);
        assert_eq!(row.quantity, 1.0);
        assert!(!row.quantity_editable());
    }

    #[test]
    fn test_blank_serial_is_unset() {
        let row = AllocationRow::new(RowId(1)).with_item("X", 4.0).with_serial("  ");
        assert_eq!(row.constraint_state(), ConstraintState::Unconstrained);
        assert_eq!(row.quantity, 4.0);
    }

    #[test]
    fn test_generations_are_independent() {
        let mut generations = Generations::default();
        assert_eq!(generations.bump(RecomputeStage::Warehouses), 1);
        assert_eq!(generations.bump(RecomputeStage::Warehouses), 2);
        assert_eq!(generations.current(RecomputeStage::Quantity), 0);
        assert_eq!(generations.current(RecomputeStage::Item), 0);
    }

    #[test]
    fn test_lookup_filters() {
        let mut row = AllocationRow::new(RowId(1));
        assert_eq!(row.serial_no_filter(), LookupFilter::Any);
        assert_eq!(row.warehouse_filter(), LookupFilter::NonGroupWarehouses);

        row.item_code = Some("X".into());
        assert_eq!(
            row.batch_no_filter(),
            LookupFilter::EnabledBatchesOf {
                item_code: "X".into()
            }
        );

        row.allowed = AllowedWarehouses::Restricted(BTreeSet::from(["W2".to_string()]));
        assert_eq!(
            row.warehouse_filter(),
            LookupFilter::WarehousesIn(vec!["W2".to_string()])
        );

        row.allowed = AllowedWarehouses::Restricted(BTreeSet::new());
        assert_eq!(row.warehouse_filter(), LookupFilter::NonGroupWarehouses);
    }
}

//! In-memory stock ledger.
//!
//! Answers the inventory and reservation queries from movements recorded
//! in process. Useful wherever the host backend is not available.

use crate::allocation::{InventoryService, ItemMaster, RowStatus};
use crate::error::{CoreError, Result};
use crate::reservation::document::{ReservationService, ReserveStock};
use crate::types::{DocName, DocStatus};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Where a serial number currently is.
#[derive(Clone, Debug)]
struct SerialRecord {
    item_code: String,
    warehouse: Option<String>,
    active: bool,
}

/// One signed batch movement.
#[derive(Clone, Debug)]
struct BatchMovement {
    item_code: String,
    batch_no: String,
    warehouse: String,
    qty: f64,
}

#[derive(Default)]
struct LedgerState {
    items: HashMap<String, ItemMaster>,
    serials: HashMap<String, SerialRecord>,
    movements: Vec<BatchMovement>,
    reservations: HashMap<DocName, ReserveStock>,
}

/// Stock and reservation ledger held in memory.
#[derive(Default)]
pub struct StockLedger {
    state: RwLock<LedgerState>,
}

impl StockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an item master record.
    pub fn add_item(&self, item: ItemMaster) {
        self.state.write().items.insert(item.item_code.clone(), item);
    }

    /// Place an active serial number in a warehouse.
    pub fn add_serial(&self, item_code: &str, serial_no: &str, warehouse: &str) {
        self.state.write().serials.insert(
            serial_no.to_string(),
            SerialRecord {
                item_code: item_code.to_string(),
                warehouse: Some(warehouse.to_string()),
                active: true,
            },
        );
    }

    /// Mark a serial number as consumed or delivered.
    pub fn deactivate_serial(&self, serial_no: &str) -> Result<()> {
        let mut state = self.state.write();
        let record = state
            .serials
            .get_mut(serial_no)
            .ok_or_else(|| CoreError::InvalidOperation(format!("unknown serial {}", serial_no)))?;
        record.active = false;
        record.warehouse = None;
        Ok(())
    }

    /// Record a batch movement. Negative quantities are issues.
    pub fn move_batch(&self, item_code: &str, batch_no: &str, warehouse: &str, qty: f64) {
        self.state.write().movements.push(BatchMovement {
            item_code: item_code.to_string(),
            batch_no: batch_no.to_string(),
            warehouse: warehouse.to_string(),
            qty,
        });
    }
}

impl InventoryService for StockLedger {
    fn available_warehouses(
        &self,
        item_code: Option<&str>,
        serial_no: Option<&str>,
        batch_no: Option<&str>,
    ) -> Result<BTreeSet<String>> {
        let state = self.state.read();
        let mut warehouses = BTreeSet::new();

        if let Some(serial_no) = serial_no {
            if let Some(record) = state.serials.get(serial_no) {
                let item_matches = item_code.map_or(true, |code| code == record.item_code);
                if record.active && item_matches {
                    warehouses.extend(record.warehouse.clone());
                }
            }
        }

        if let Some(batch_no) = batch_no {
            let mut balances: BTreeMap<&str, f64> = BTreeMap::new();
            for movement in state.movements.iter().filter(|m| {
                m.batch_no == batch_no && item_code.map_or(true, |code| code == m.item_code)
            }) {
                *balances.entry(movement.warehouse.as_str()).or_insert(0.0) += movement.qty;
            }

            warehouses.extend(
                balances
                    .into_iter()
                    .filter(|(_, qty)| *qty > 0.0)
                    .map(|(warehouse, _)| warehouse.to_string()),
            );
        }

        Ok(warehouses)
    }

    fn batch_qty_in_warehouse(
        &self,
        batch_no: &str,
        warehouse: &str,
        item_code: Option<&str>,
    ) -> Result<f64> {
        let state = self.state.read();
        Ok(state
            .movements
            .iter()
            .filter(|m| m.batch_no == batch_no && m.warehouse == warehouse)
            .filter(|m| item_code.map_or(true, |code| code == m.item_code))
            .fold(0.0, |total, m| total + m.qty))
    }

    fn item_master(&self, item_code: &str) -> Result<Option<ItemMaster>> {
        Ok(self.state.read().items.get(item_code).cloned())
    }
}

impl ReservationService for StockLedger {
    fn fetch(&self, name: &DocName) -> Result<ReserveStock> {
        self.state
            .read()
            .reservations
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::DocumentNotFound(name.clone()))
    }

    fn persist(&self, doc: &ReserveStock) -> Result<()> {
        self.state
            .write()
            .reservations
            .insert(doc.name.clone(), doc.clone());
        Ok(())
    }

    fn reserved_batch_qty(
        &self,
        batch_no: &str,
        warehouse: &str,
        exclude: Option<&DocName>,
    ) -> Result<f64> {
        let state = self.state.read();
        Ok(state
            .reservations
            .values()
            .filter(|doc| doc.docstatus == DocStatus::Submitted)
            .filter(|doc| Some(&doc.name) != exclude)
            .flat_map(|doc| doc.items.iter())
            .filter(|row| row.status == Some(RowStatus::Reserved))
            .filter(|row| {
                row.batch_no.as_deref() == Some(batch_no)
                    && row.warehouse.as_deref() == Some(warehouse)
            })
            .fold(0.0, |total, row| total + row.quantity.abs()))
    }

    fn mark_as_unreserved(&self, name: &DocName) -> Result<usize> {
        let mut state = self.state.write();
        let doc = state
            .reservations
            .get_mut(name)
            .ok_or_else(|| CoreError::DocumentNotFound(name.clone()))?;

        if doc.docstatus != DocStatus::Submitted {
            return Err(CoreError::NotSubmitted(name.clone()));
        }

        let mut changed = 0;
        for row in &mut doc.items {
            if row.status != Some(RowStatus::Unreserved) {
                row.status = Some(RowStatus::Unreserved);
                changed += 1;
            }
        }
        Ok(changed)
    }
}

//! Per-document allocation editing session.
//!
//! Field changes update a row immediately and return the collaborator
//! requests they require. Responses are fed back through `apply`, which
//! discards anything issued under a superseded generation. The second
//! stage (available quantity) is only issued from the first stage's
//! response, so the two never race for the same row.

use crate::allocation::resolver::{
    decide_warehouse, AllocationResolver, AllowedWarehouses, RecomputeOutcome, RecomputeTask,
    RecomputeTicket, WarehouseDecision,
};
use crate::allocation::row::{AllocationRow, RecomputeStage, RowId, RowStatus};
use crate::error::{CoreError, Result};
use crate::notices::{CoreEvent, NoticeHub};
use crate::types::non_empty;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Rows of one document being edited.
pub struct AllocationSession {
    rows: BTreeMap<RowId, AllocationRow>,
    next_row: u64,
    notices: Option<Arc<NoticeHub>>,
}

impl AllocationSession {
    pub fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_row: 1,
            notices: None,
        }
    }

    /// Start a session over existing rows. Derived state starts unrestricted.
    pub fn from_rows(rows: Vec<AllocationRow>) -> Self {
        let next_row = rows.iter().map(|r| r.id.0).max().unwrap_or(0) + 1;
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.enforce_serial_quantity();
                (row.id, row)
            })
            .collect();

        Self {
            rows,
            next_row,
            notices: None,
        }
    }

    /// Publish recompute results to a hub.
    pub fn with_notices(mut self, hub: Arc<NoticeHub>) -> Self {
        self.notices = Some(hub);
        self
    }

    pub fn rows(&self) -> impl Iterator<Item = &AllocationRow> {
        self.rows.values()
    }

    pub fn row(&self, id: RowId) -> Option<&AllocationRow> {
        self.rows.get(&id)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Hand the rows back, e.g. to persist them.
    pub fn into_rows(self) -> Vec<AllocationRow> {
        self.rows.into_values().collect()
    }

    pub fn add_row(&mut self) -> RowId {
        let id = RowId(self.next_row);
        self.next_row += 1;
        self.rows.insert(id, AllocationRow::new(id));
        id
    }

    pub fn remove_row(&mut self, id: RowId) -> Result<AllocationRow> {
        self.rows.remove(&id).ok_or(CoreError::RowNotFound(id.0))
    }

    /// Request derived state for every row, e.g. when a saved document is
    /// reopened.
    pub fn refresh_all(&mut self) -> Vec<RecomputeTask> {
        let ids: Vec<RowId> = self.rows.keys().copied().collect();
        let mut tasks = Vec::new();
        for id in ids {
            if let Some(row) = self.rows.get_mut(&id) {
                tasks.extend(Self::warehouse_stage(row));
            }
        }
        tasks
    }

    // --- Field events ---

    /// Item changed: serial, batch and derived fields no longer apply.
    pub fn set_item_code(&mut self, id: RowId, item_code: Option<&str>) -> Result<Vec<RecomputeTask>> {
        let row = self.row_mut(id)?;

        row.item_code = non_empty(item_code);
        row.serial_no = None;
        row.batch_no = None;
        row.available_qty = 0.0;
        row.allowed = AllowedWarehouses::Unrestricted;
        row.generations.bump(RecomputeStage::Warehouses);
        row.generations.bump(RecomputeStage::Quantity);
        let generation = row.generations.bump(RecomputeStage::Item);

        match row.item_code.clone() {
            Some(item_code) => Ok(vec![RecomputeTask::ItemMaster {
                ticket: RecomputeTicket {
                    row: id,
                    stage: RecomputeStage::Item,
                    generation,
                },
                item_code,
            }]),
            None => {
                row.clear_item_master();
                Ok(Vec::new())
            }
        }
    }

    /// Serial changed. A serial pins quantity to 1 and narrows warehouses.
    pub fn set_serial_no(&mut self, id: RowId, serial_no: Option<&str>) -> Result<Vec<RecomputeTask>> {
        let row = self.row_mut(id)?;

        row.serial_no = non_empty(serial_no);
        row.enforce_serial_quantity();

        Ok(Self::warehouse_stage(row))
    }

    /// Batch changed. Warehouses are recomputed, then available quantity.
    pub fn set_batch_no(&mut self, id: RowId, batch_no: Option<&str>) -> Result<Vec<RecomputeTask>> {
        let row = self.row_mut(id)?;

        row.batch_no = non_empty(batch_no);
        if row.batch_no.is_none() || row.warehouse.is_none() {
            row.available_qty = 0.0;
        }

        Ok(Self::warehouse_stage(row))
    }

    /// Quantity changed. Serialized rows snap back to 1.
    pub fn set_quantity(&mut self, id: RowId, quantity: f64) -> Result<()> {
        let row = self.row_mut(id)?;
        row.quantity = quantity;
        if row.enforce_serial_quantity() {
            tracing::debug!(row = id.0, requested = quantity, "quantity forced to 1 for serialized row");
        }
        Ok(())
    }

    /// Warehouse picked manually. Only available quantity is recomputed.
    ///
    /// A pick outside a non-empty allowed set is cleared.
    pub fn set_warehouse(&mut self, id: RowId, warehouse: Option<&str>) -> Result<Vec<RecomputeTask>> {
        let row = self.row_mut(id)?;
        row.warehouse = match non_empty(warehouse) {
            Some(picked) if row.allowed.excludes(&picked) => {
                tracing::debug!(row = id.0, warehouse = %picked, "warehouse not eligible, cleared");
                None
            }
            picked => picked,
        };
        Ok(Self::quantity_stage(row).into_iter().collect())
    }

    pub fn set_status(&mut self, id: RowId, status: Option<RowStatus>) -> Result<()> {
        self.row_mut(id)?.status = status;
        Ok(())
    }

    // --- Responses ---

    /// Apply a collaborator response.
    ///
    /// Stale responses are ignored. A failed response leaves the row as it
    /// was and returns the error for the caller to surface.
    pub fn apply(&mut self, outcome: RecomputeOutcome) -> Result<Vec<RecomputeTask>> {
        let ticket = outcome.ticket();

        let Some(row) = self.rows.get_mut(&ticket.row) else {
            tracing::debug!(row = ticket.row.0, "response for removed row ignored");
            return Ok(Vec::new());
        };

        if row.generations.current(ticket.stage) != ticket.generation {
            tracing::debug!(
                row = ticket.row.0,
                stage = ?ticket.stage,
                generation = ticket.generation,
                "discarding stale recompute response"
            );
            return Ok(Vec::new());
        }

        let follow_up: Vec<RecomputeTask> = match outcome {
            RecomputeOutcome::ItemMaster { result, .. } => {
                row.apply_item_master(result?.as_ref());
                Vec::new()
            }
            RecomputeOutcome::AllowedWarehouses { result, .. } => {
                let allowed = result?;
                match decide_warehouse(row.warehouse.as_deref(), &allowed) {
                    WarehouseDecision::AutoSelect(warehouse) => row.warehouse = Some(warehouse),
                    WarehouseDecision::Clear => row.warehouse = None,
                    WarehouseDecision::Keep => {}
                }
                row.allowed = allowed;
                Self::quantity_stage(row).into_iter().collect()
            }
            RecomputeOutcome::AvailableQty { result, .. } => {
                row.available_qty = result?;
                Vec::new()
            }
        };

        if follow_up.is_empty() && ticket.stage != RecomputeStage::Item {
            self.publish_recomputed(ticket.row);
        }

        Ok(follow_up)
    }

    /// Run tasks and their follow-ups to completion on the calling thread.
    pub fn run(&mut self, resolver: &AllocationResolver, tasks: Vec<RecomputeTask>) -> Result<()> {
        let mut queue: std::collections::VecDeque<RecomputeTask> = tasks.into();
        while let Some(task) = queue.pop_front() {
            let follow_up = self.apply(resolver.execute(task))?;
            queue.extend(follow_up);
        }
        Ok(())
    }

    // --- Internals ---

    fn row_mut(&mut self, id: RowId) -> Result<&mut AllocationRow> {
        self.rows.get_mut(&id).ok_or(CoreError::RowNotFound(id.0))
    }

    /// Start the warehouse stage. Without a serial or batch the row is
    /// unrestricted and only the quantity stage runs.
    fn warehouse_stage(row: &mut AllocationRow) -> Vec<RecomputeTask> {
        let generation = row.generations.bump(RecomputeStage::Warehouses);

        if row.serial_no.is_none() && row.batch_no.is_none() {
            row.allowed = AllowedWarehouses::Unrestricted;
            return Self::quantity_stage(row).into_iter().collect();
        }

        // A pending quantity answer belongs to the old constraint.
        row.generations.bump(RecomputeStage::Quantity);

        vec![RecomputeTask::AllowedWarehouses {
            ticket: RecomputeTicket {
                row: row.id,
                stage: RecomputeStage::Warehouses,
                generation,
            },
            item_code: row.item_code.clone(),
            serial_no: row.serial_no.clone(),
            batch_no: row.batch_no.clone(),
        }]
    }

    /// Start the quantity stage, or settle to 0 without asking.
    fn quantity_stage(row: &mut AllocationRow) -> Option<RecomputeTask> {
        let generation = row.generations.bump(RecomputeStage::Quantity);

        match (row.batch_no.clone(), row.warehouse.clone()) {
            (Some(batch_no), Some(warehouse)) => Some(RecomputeTask::AvailableQty {
                ticket: RecomputeTicket {
                    row: row.id,
                    stage: RecomputeStage::Quantity,
                    generation,
                },
                item_code: row.item_code.clone(),
                batch_no,
                warehouse,
            }),
            _ => {
                row.available_qty = 0.0;
                None
            }
        }
    }

    fn publish_recomputed(&self, id: RowId) {
        if let (Some(hub), Some(row)) = (&self.notices, self.rows.get(&id)) {
            hub.publish(CoreEvent::RowRecomputed {
                row: id.0,
                warehouse: row.warehouse.clone(),
                available_qty: row.available_qty,
            });
        }
    }
}

impl Default for AllocationSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::resolver::InventoryService;
    use crate::allocation::{ConstraintState, ItemMaster};
    use std::collections::BTreeSet;

    struct FixedInventory;

    impl InventoryService for FixedInventory {
        fn available_warehouses(
            &self,
            _item_code: Option<&str>,
            serial_no: Option<&str>,
            batch_no: Option<&str>,
        ) -> Result<BTreeSet<String>> {
            let mut set = BTreeSet::new();
            if serial_no == Some("S1") {
                set.insert("W1".to_string());
            }
            if batch_no == Some("B1") {
                set.insert("W1".to_string());
                set.insert("W2".to_string());
            }
            Ok(set)
        }

        fn batch_qty_in_warehouse(&self, batch_no: &str, warehouse: &str, _: Option<&str>) -> Result<f64> {
            Ok(match (batch_no, warehouse) {
                ("B1", "W1") => 5.0,
                ("B1", "W2") => 7.0,
                _ => 0.0,
            })
        }

        fn item_master(&self, item_code: &str) -> Result<Option<ItemMaster>> {
            Ok(Some(ItemMaster {
                item_code: item_code.to_string(),
                display_name: "Widget".to_string(),
                has_serial_no: true,
                has_batch_no: true,
                description: None,
            }))
        }
    }

    fn resolver() -> AllocationResolver {
        AllocationResolver::new(Arc::new(FixedInventory), 8)
    }

    #[test]
    fn test_serial_auto_selects_single_warehouse() {
        let resolver = resolver();
        let mut session = AllocationSession::new();
        let id = session.add_row();

        let tasks = session.set_item_code(id, Some("X")).unwrap();
        session.run(&resolver, tasks).unwrap();
        session.set_quantity(id, 4.0).unwrap();

        let tasks = session.set_serial_no(id, Some("S1")).unwrap();
        session.run(&resolver, tasks).unwrap();

        let row = session.row(id).unwrap();
        assert_eq!(row.item_name, "Widget");
        assert_eq!(row.quantity, 1.0);
        assert_eq!(row.warehouse.as_deref(), Some("W1"));
        assert_eq!(row.constraint_state(), ConstraintState::SerialConstrained);
        assert!(!row.quantity_editable());
    }

    #[test]
    fn test_batch_then_warehouse_updates_available_qty() {
        let resolver = resolver();
        let mut session = AllocationSession::new();
        let id = session.add_row();
        session.set_item_code(id, Some("X")).unwrap();

        let tasks = session.set_batch_no(id, Some("B1")).unwrap();
        session.run(&resolver, tasks).unwrap();
        assert!(session.row(id).unwrap().warehouse.is_none());
        assert_eq!(session.row(id).unwrap().available_qty, 0.0);

        let tasks = session.set_warehouse(id, Some("W2")).unwrap();
        session.run(&resolver, tasks).unwrap();
        assert_eq!(session.row(id).unwrap().available_qty, 7.0);
    }

    #[test]
    fn test_ineligible_manual_warehouse_is_cleared() {
        let resolver = resolver();
        let mut session = AllocationSession::new();
        let id = session.add_row();
        session.set_item_code(id, Some("X")).unwrap();
        let tasks = session.set_batch_no(id, Some("B1")).unwrap();
        session.run(&resolver, tasks).unwrap();

        let tasks = session.set_warehouse(id, Some("W9")).unwrap();
        assert!(tasks.is_empty());
        let row = session.row(id).unwrap();
        assert!(row.warehouse.is_none());
        assert_eq!(row.available_qty, 0.0);

        let tasks = session.set_warehouse(id, Some("W1")).unwrap();
        session.run(&resolver, tasks).unwrap();
        assert_eq!(session.row(id).unwrap().warehouse.as_deref(), Some("W1"));
        assert_eq!(session.row(id).unwrap().available_qty, 5.0);
    }

    #[test]
    fn test_stale_response_is_discarded() {
        let resolver = resolver();
        let mut session = AllocationSession::new();
        let id = session.add_row();
        session.set_item_code(id, Some("X")).unwrap();

        let first = session.set_serial_no(id, Some("S1")).unwrap();
        let second = session.set_serial_no(id, Some("S9")).unwrap();

        // The older answer arrives after the newer request was issued.
        let stale = resolver.execute(first[0].clone());
        assert!(session.apply(stale).unwrap().is_empty());
        assert!(session.row(id).unwrap().warehouse.is_none());

        session.run(&resolver, second).unwrap();
        assert_eq!(
            session.row(id).unwrap().allowed_warehouses(),
            &AllowedWarehouses::Restricted(BTreeSet::new())
        );
    }

    #[test]
    fn test_clearing_serial_falls_back_to_batch() {
        let resolver = resolver();
        let mut session = AllocationSession::new();
        let id = session.add_row();
        session.set_item_code(id, Some("X")).unwrap();

        let tasks = session.set_batch_no(id, Some("B1")).unwrap();
        session.run(&resolver, tasks).unwrap();
        let tasks = session.set_warehouse(id, Some("W1")).unwrap();
        session.run(&resolver, tasks).unwrap();
        let tasks = session.set_serial_no(id, Some("S1")).unwrap();
        session.run(&resolver, tasks).unwrap();

        let row = session.row(id).unwrap();
        assert_eq!(row.constraint_state(), ConstraintState::FullyConstrained);
        assert_eq!(row.warehouse.as_deref(), Some("W1"));

        let tasks = session.set_serial_no(id, None).unwrap();
        session.run(&resolver, tasks).unwrap();

        let row = session.row(id).unwrap();
        assert_eq!(row.constraint_state(), ConstraintState::BatchConstrained);
        assert!(row.quantity_editable());
        assert_eq!(row.warehouse.as_deref(), Some("W1"));
        assert_eq!(row.available_qty, 5.0);
    }

    #[test]
    fn test_item_change_resets_row() {
        let resolver = resolver();
        let mut session = AllocationSession::new();
        let id = session.add_row();
        session.set_item_code(id, Some("X")).unwrap();
        let tasks = session.set_batch_no(id, Some("B1")).unwrap();
        session.run(&resolver, tasks).unwrap();

        session.set_item_code(id, None).unwrap();

        let row = session.row(id).unwrap();
        assert_eq!(row.constraint_state(), ConstraintState::Unconstrained);
        assert_eq!(row.allowed_warehouses(), &AllowedWarehouses::Unrestricted);
        assert_eq!(row.available_qty, 0.0);
        assert!(row.item_name.is_empty());
    }

    #[test]
    fn test_unknown_row() {
        let mut session = AllocationSession::new();
        let result = session.set_quantity(RowId(42), 1.0);
        assert!(matches!(result, Err(CoreError::RowNotFound(42))));
    }
}

//! Warehouse eligibility and batch availability.

use crate::allocation::row::{RecomputeStage, RowId};
use crate::error::Result;
use crate::types::non_empty;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Item master fields the allocation forms read.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemMaster {
    pub item_code: String,
    pub display_name: String,
    pub has_serial_no: bool,
    pub has_batch_no: bool,
    pub description: Option<String>,
}

/// Stock queries answered by the host's inventory backend.
pub trait InventoryService: Send + Sync {
    /// Warehouses currently holding the serial (if active) or a positive
    /// balance of the batch.
    fn available_warehouses(
        &self,
        item_code: Option<&str>,
        serial_no: Option<&str>,
        batch_no: Option<&str>,
    ) -> Result<BTreeSet<String>>;

    /// Stock level of a batch in one warehouse.
    fn batch_qty_in_warehouse(
        &self,
        batch_no: &str,
        warehouse: &str,
        item_code: Option<&str>,
    ) -> Result<f64>;

    /// Item master record, if the item exists.
    fn item_master(&self, item_code: &str) -> Result<Option<ItemMaster>>;
}

/// Warehouses a row may draw from.
///
/// `Unrestricted` means no serial or batch narrows the choice. It is
/// distinct from `Restricted` with an empty set, which means the serial or
/// batch is not in stock anywhere.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum AllowedWarehouses {
    #[default]
    Unrestricted,
    Restricted(BTreeSet<String>),
}

impl AllowedWarehouses {
    pub fn is_restricted(&self) -> bool {
        matches!(self, AllowedWarehouses::Restricted(_))
    }

    /// The only eligible warehouse, if there is exactly one.
    pub fn single(&self) -> Option<&str> {
        match self {
            AllowedWarehouses::Restricted(set) if set.len() == 1 => {
                set.iter().next().map(String::as_str)
            }
            _ => None,
        }
    }

    /// Whether a selection conflicts with a non-empty restriction.
    pub fn excludes(&self, warehouse: &str) -> bool {
        match self {
            AllowedWarehouses::Restricted(set) => !set.is_empty() && !set.contains(warehouse),
            AllowedWarehouses::Unrestricted => false,
        }
    }
}

/// What to do with the row's warehouse after recomputing eligibility.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WarehouseDecision {
    AutoSelect(String),
    Clear,
    Keep,
}

/// Selection policy: one candidate is picked automatically, a selection
/// outside a non-empty restriction is cleared, anything else is kept.
pub fn decide_warehouse(current: Option<&str>, allowed: &AllowedWarehouses) -> WarehouseDecision {
    if let Some(only) = allowed.single() {
        return WarehouseDecision::AutoSelect(only.to_string());
    }

    match current {
        Some(warehouse) if !warehouse.is_empty() && allowed.excludes(warehouse) => {
            WarehouseDecision::Clear
        }
        _ => WarehouseDecision::Keep,
    }
}

/// Identifies the row and generation a recompute was issued for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecomputeTicket {
    pub row: RowId,
    pub stage: RecomputeStage,
    pub generation: u64,
}

/// A collaborator request issued on behalf of a row.
#[derive(Clone, Debug, PartialEq)]
pub enum RecomputeTask {
    ItemMaster {
        ticket: RecomputeTicket,
        item_code: String,
    },
    AllowedWarehouses {
        ticket: RecomputeTicket,
        item_code: Option<String>,
        serial_no: Option<String>,
        batch_no: Option<String>,
    },
    AvailableQty {
        ticket: RecomputeTicket,
        item_code: Option<String>,
        batch_no: String,
        warehouse: String,
    },
}

impl RecomputeTask {
    pub fn ticket(&self) -> RecomputeTicket {
        match self {
            RecomputeTask::ItemMaster { ticket, .. }
            | RecomputeTask::AllowedWarehouses { ticket, .. }
            | RecomputeTask::AvailableQty { ticket, .. } => *ticket,
        }
    }
}

/// A collaborator response, tagged with the ticket it answers.
#[derive(Debug)]
pub enum RecomputeOutcome {
    ItemMaster {
        ticket: RecomputeTicket,
        result: Result<Option<ItemMaster>>,
    },
    AllowedWarehouses {
        ticket: RecomputeTicket,
        result: Result<AllowedWarehouses>,
    },
    AvailableQty {
        ticket: RecomputeTicket,
        result: Result<f64>,
    },
}

impl RecomputeOutcome {
    pub fn ticket(&self) -> RecomputeTicket {
        match self {
            RecomputeOutcome::ItemMaster { ticket, .. }
            | RecomputeOutcome::AllowedWarehouses { ticket, .. }
            | RecomputeOutcome::AvailableQty { ticket, .. } => *ticket,
        }
    }
}

/// Resolves allowed warehouses and available quantities through an
/// inventory collaborator.
pub struct AllocationResolver {
    inventory: Arc<dyn InventoryService>,

    /// LRU cache for item master lookups.
    item_cache: Mutex<LruCache<String, Option<ItemMaster>>>,
}

impl AllocationResolver {
    pub fn new(inventory: Arc<dyn InventoryService>, item_cache_size: usize) -> Self {
        let capacity = NonZeroUsize::new(item_cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            inventory,
            item_cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn inventory(&self) -> &Arc<dyn InventoryService> {
        &self.inventory
    }

    /// Warehouses eligible for an item given optional serial and batch.
    ///
    /// Without either constraint the answer is `Unrestricted` and the
    /// collaborator is not asked.
    pub fn compute_allowed_warehouses(
        &self,
        item_code: Option<&str>,
        serial_no: Option<&str>,
        batch_no: Option<&str>,
    ) -> Result<AllowedWarehouses> {
        let item_code = non_empty(item_code);
        let serial_no = non_empty(serial_no);
        let batch_no = non_empty(batch_no);

        if serial_no.is_none() && batch_no.is_none() {
            return Ok(AllowedWarehouses::Unrestricted);
        }

        let set = self.inventory.available_warehouses(
            item_code.as_deref(),
            serial_no.as_deref(),
            batch_no.as_deref(),
        )?;
        Ok(AllowedWarehouses::Restricted(set))
    }

    /// Stock of a batch in a warehouse, or 0 if either is missing.
    ///
    /// Not cached; the collaborator's figure is returned as-is.
    pub fn compute_available_qty(
        &self,
        batch_no: Option<&str>,
        warehouse: Option<&str>,
        item_code: Option<&str>,
    ) -> Result<f64> {
        let (Some(batch_no), Some(warehouse)) = (non_empty(batch_no), non_empty(warehouse)) else {
            return Ok(0.0);
        };

        let item_code = non_empty(item_code);
        self.inventory
            .batch_qty_in_warehouse(&batch_no, &warehouse, item_code.as_deref())
    }

    /// Item master lookup through the cache. Only successful lookups are cached.
    pub fn item_master(&self, item_code: &str) -> Result<Option<ItemMaster>> {
        if let Some(cached) = self.item_cache.lock().get(item_code) {
            return Ok(cached.clone());
        }

        let master = self.inventory.item_master(item_code)?;
        self.item_cache
            .lock()
            .put(item_code.to_string(), master.clone());
        Ok(master)
    }

    /// Drop cached item master data.
    pub fn invalidate_item(&self, item_code: &str) {
        self.item_cache.lock().pop(item_code);
    }

    /// Run one task against the collaborator.
    pub fn execute(&self, task: RecomputeTask) -> RecomputeOutcome {
        match task {
            RecomputeTask::ItemMaster { ticket, item_code } => RecomputeOutcome::ItemMaster {
                ticket,
                result: self.item_master(&item_code),
            },
            RecomputeTask::AllowedWarehouses {
                ticket,
                item_code,
                serial_no,
                batch_no,
            } => RecomputeOutcome::AllowedWarehouses {
                ticket,
                result: self.compute_allowed_warehouses(
                    item_code.as_deref(),
                    serial_no.as_deref(),
                    batch_no.as_deref(),
                ),
            },
            RecomputeTask::AvailableQty {
                ticket,
                item_code,
                batch_no,
                warehouse,
            } => RecomputeOutcome::AvailableQty {
                ticket,
                result: self.compute_available_qty(
                    Some(&batch_no),
                    Some(&warehouse),
                    item_code.as_deref(),
                ),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingInventory {
        calls: AtomicUsize,
    }

    impl InventoryService for CountingInventory {
        fn available_warehouses(
            &self,
            _item_code: Option<&str>,
            serial_no: Option<&str>,
            _batch_no: Option<&str>,
        ) -> Result<BTreeSet<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(match serial_no {
                Some("S1") => BTreeSet::from(["W1".to_string()]),
                _ => BTreeSet::new(),
            })
        }

        fn batch_qty_in_warehouse(&self, _: &str, _: &str, _: Option<&str>) -> Result<f64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(12.5)
        }

        fn item_master(&self, item_code: &str) -> Result<Option<ItemMaster>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(ItemMaster {
                item_code: item_code.to_string(),
                display_name: format!("{} name", item_code),
                has_serial_no: true,
                has_batch_no: false,
                description: None,
            }))
        }
    }

    fn resolver() -> (Arc<CountingInventory>, AllocationResolver) {
        let inventory = Arc::new(CountingInventory::default());
        let resolver = AllocationResolver::new(inventory.clone(), 4);
        (inventory, resolver)
    }

    #[test]
    fn test_unconstrained_skips_collaborator() {
        let (inventory, resolver) = resolver();
        let allowed = resolver
            .compute_allowed_warehouses(Some("X"), None, Some(" "))
            .unwrap();
        assert_eq!(allowed, AllowedWarehouses::Unrestricted);
        assert_eq!(inventory.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_empty_restriction_is_not_unrestricted() {
        let (_, resolver) = resolver();
        let allowed = resolver
            .compute_allowed_warehouses(Some("X"), Some("S9"), None)
            .unwrap();
        assert_eq!(allowed, AllowedWarehouses::Restricted(BTreeSet::new()));
        assert!(allowed.is_restricted());
        assert!(!allowed.excludes("W1"));
    }

    #[test]
    fn test_available_qty_short_circuits() {
        let (inventory, resolver) = resolver();
        assert_eq!(resolver.compute_available_qty(None, Some("W1"), Some("X")).unwrap(), 0.0);
        assert_eq!(resolver.compute_available_qty(Some("B1"), Some(""), Some("X")).unwrap(), 0.0);
        assert_eq!(inventory.calls.load(Ordering::SeqCst), 0);

        assert_eq!(resolver.compute_available_qty(Some("B1"), Some("W1"), Some("X")).unwrap(), 12.5);
        assert_eq!(inventory.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_decide_warehouse() {
        let single = AllowedWarehouses::Restricted(BTreeSet::from(["W1".to_string()]));
        assert_eq!(
            decide_warehouse(Some("W9"), &single),
            WarehouseDecision::AutoSelect("W1".into())
        );

        let two = AllowedWarehouses::Restricted(BTreeSet::from(["W1".to_string(), "W2".to_string()]));
        assert_eq!(decide_warehouse(Some("W9"), &two), WarehouseDecision::Clear);
        assert_eq!(decide_warehouse(Some("W2"), &two), WarehouseDecision::Keep);
        assert_eq!(decide_warehouse(None, &two), WarehouseDecision::Keep);

        let none = AllowedWarehouses::Restricted(BTreeSet::new());
        assert_eq!(decide_warehouse(Some("W9"), &none), WarehouseDecision::Keep);
        assert_eq!(
            decide_warehouse(Some("W9"), &AllowedWarehouses::Unrestricted),
            WarehouseDecision::Keep
        );
    }

    #[test]
    fn test_item_master_is_cached() {
        let (inventory, resolver) = resolver();
        let first = resolver.item_master("X").unwrap().unwrap();
        let second = resolver.item_master("X").unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(inventory.calls.load(Ordering::SeqCst), 1);

        resolver.invalidate_item("X");
        resolver.item_master("X").unwrap();
        assert_eq!(inventory.calls.load(Ordering::SeqCst), 2);
    }
}

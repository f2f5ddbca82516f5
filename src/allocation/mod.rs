//! Stock allocation for reservation rows.
//!
//! A row asks for a quantity of an item, optionally pinned to a serial
//! number or batch. The resolver works out which warehouses can satisfy
//! the pin and how much of a batch sits in the chosen warehouse; the
//! session keeps each row's derived fields in step with its inputs.
//!
//! ## Row states
//!
//! - **Unconstrained**: no serial, no batch; any warehouse
//! - **SerialConstrained**: quantity fixed at 1; warehouses holding the serial
//! - **BatchConstrained**: warehouses with a positive balance of the batch
//! - **FullyConstrained**: both pins apply

mod dispatcher;
mod resolver;
mod row;
mod session;
mod strategy;

pub use dispatcher::RecomputeDispatcher;
pub use resolver::{
    decide_warehouse, AllocationResolver, AllowedWarehouses, InventoryService, ItemMaster,
    RecomputeOutcome, RecomputeTask, RecomputeTicket, WarehouseDecision,
};
pub use row::{AllocationRow, ConstraintState, LookupFilter, RecomputeStage, RowId, RowStatus};
pub use session::AllocationSession;
pub use strategy::{
    expand_serial_range, AllocationDialog, AllocationEntry, AllocationStrategy, CSV_HEADER,
};

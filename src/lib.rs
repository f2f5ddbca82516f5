//! # Revstock
//!
//! Revision chains and stock allocation policy for ERP document workflows.
//!
//! ## Core Concepts
//!
//! - **Version chains**: documents revised in place of editing, with exactly
//!   one active member per chain
//! - **Allocation rows**: warehouse, serial and batch choices kept consistent
//!   as inputs change, with stale lookups discarded
//! - **Reservations**: batch availability checks and the unreserve gate
//! - **Returns**: part lookups against a purchase order
//! - **Notices**: events broadcast to bounded subscribers
//!
//! ## Example
//!
//! ```ignore
//! use revstock::{CoreConfig, StockLedger, Workspace};
//! use std::sync::Arc;
//!
//! let ledger = Arc::new(StockLedger::new());
//! let ws = Workspace::open_or_create("./data", CoreConfig::default(), ledger)?;
//!
//! // Save a root document and revise it
//! let mut form = ws.new_form(json!({"customer": "ACME"}));
//! form.save()?;
//! let outcome = form.create_new_version();
//! println!("{}", outcome.notice.message);
//!
//! ws.sync()?;
//! ```

pub mod allocation;
pub mod config;
pub mod error;
pub mod notices;
pub mod procurement;
pub mod reservation;
pub mod types;
pub mod versions;
pub mod workspace;

// Re-exports
pub use allocation::{
    AllocationDialog, AllocationResolver, AllocationRow, AllocationSession, AllocationStrategy,
    AllowedWarehouses, InventoryService, ItemMaster, RecomputeDispatcher, RowId, RowStatus,
};
pub use config::{AllocationConfig, CoreConfig, NoticeConfig, VersioningConfig};
pub use error::{CoreError, Result};
pub use notices::{
    CoreEvent, DropReason, EventFilter, NoticeHub, SubscriptionConfig, SubscriptionHandle,
    SubscriptionId,
};
pub use procurement::{PurchaseOrderBook, PurchaseOrderService, ReturnAuthorization};
pub use reservation::{ReservationService, ReserveStock, StockLedger};
pub use types::{Affordance, DocName, DocStatus, Indicator, Notice, Timestamp};
pub use versions::{ActionOutcome, VersionChainManager, VersionService, VersionedDocument, VersionedForm};
pub use workspace::Workspace;

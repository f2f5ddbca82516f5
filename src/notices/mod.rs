//! Event fan-out from the workflow core to the host UI.
//!
//! Hooks publish `CoreEvent`s (version created, duplicate reset, row
//! recomputed, unreserved, plain notices). The host subscribes with a
//! filter and receives events over a bounded channel; subscribers that
//! fall behind are dropped rather than blocking the publisher.
//!
//! # Example
//!
//! ```ignore
//! let hub = NoticeHub::new();
//! let handle = hub.subscribe(SubscriptionConfig {
//!     filter: EventFilter::versions(),
//!     ..Default::default()
//! });
//!
//! match handle.recv() {
//!     Ok(CoreEvent::VersionCreated { name, .. }) => println!("route to {}", name),
//!     Ok(CoreEvent::Dropped { .. }) | Err(_) => {}
//!     Ok(_) => {}
//! }
//! ```

mod hub;
mod types;

pub use hub::NoticeHub;
pub use types::{
    CoreEvent, DropReason, EventFilter, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
};

//! Subscription types for workflow events.

use crate::types::{DocName, Notice};
use serde::{Deserialize, Serialize};

/// Configuration for a subscription.
#[derive(Clone, Debug)]
pub struct SubscriptionConfig {
    /// Max buffered events before dropping subscriber.
    /// Default: 1000
    pub buffer_size: usize,

    /// Filter criteria.
    pub filter: EventFilter,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1000,
            filter: EventFilter::all(),
        }
    }
}

/// Filter criteria for subscriptions.
#[derive(Clone, Debug, Default)]
pub struct EventFilter {
    /// Version chain events (duplicate reset, root finalized, version created).
    pub include_versions: bool,

    /// Row recompute results.
    pub include_allocation: bool,

    /// Reservation status changes.
    pub include_reservations: bool,

    /// Plain notices.
    pub include_notices: bool,

    /// Restrict document events to these names (None = all documents).
    pub documents: Option<Vec<DocName>>,
}

impl EventFilter {
    pub fn versions() -> Self {
        Self {
            include_versions: true,
            ..Default::default()
        }
    }

    pub fn allocation() -> Self {
        Self {
            include_allocation: true,
            ..Default::default()
        }
    }

    pub fn reservations() -> Self {
        Self {
            include_reservations: true,
            ..Default::default()
        }
    }

    pub fn notices() -> Self {
        Self {
            include_notices: true,
            ..Default::default()
        }
    }

    pub fn all() -> Self {
        Self {
            include_versions: true,
            include_allocation: true,
            include_reservations: true,
            include_notices: true,
            documents: None,
        }
    }

    /// Restrict to a set of documents.
    pub fn for_documents(mut self, names: Vec<DocName>) -> Self {
        self.documents = Some(names);
        self
    }
}

/// Events emitted to subscribers.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoreEvent {
    // --- Version Events ---
    /// A copied document had its chain fields reset.
    DuplicateReset { notice: Notice },

    /// A root document's original reference was set to its own name.
    RootFinalized { name: DocName },

    /// A new chain member became the active one.
    VersionCreated {
        name: DocName,
        source: DocName,
        original: DocName,
        revision: u32,
    },

    // --- Allocation Events ---
    /// A row's derived fields were recomputed.
    RowRecomputed {
        row: u64,
        warehouse: Option<String>,
        available_qty: f64,
    },

    // --- Reservation Events ---
    /// Rows of a reservation were moved to Unreserved.
    Unreserved { name: DocName, rows: usize },

    // --- Lifecycle Events ---
    /// Free-standing notice.
    Notice { notice: Notice },

    /// Subscription was dropped.
    Dropped { reason: DropReason },
}

impl CoreEvent {
    /// Document this event concerns, if any.
    pub fn document(&self) -> Option<&DocName> {
        match self {
            CoreEvent::RootFinalized { name }
            | CoreEvent::VersionCreated { name, .. }
            | CoreEvent::Unreserved { name, .. } => Some(name),
            _ => None,
        }
    }
}

/// Why a subscription was dropped.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Explicitly unsubscribed.
    Unsubscribed,
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Handle to manage a subscription.
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<CoreEvent>,
}

impl SubscriptionHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<CoreEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<CoreEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<CoreEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything currently buffered.
    pub fn drain(&self) -> Vec<CoreEvent> {
        self.receiver.try_iter().collect()
    }
}

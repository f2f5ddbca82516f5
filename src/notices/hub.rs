//! Notice hub for broadcasting workflow events.

use crate::config::NoticeConfig;
use crate::types::{DocName, Notice};
use crossbeam_channel::{bounded, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::types::{CoreEvent, DropReason, SubscriptionConfig, SubscriptionHandle, SubscriptionId};

/// Internal subscription state.
///
/// The channel holds one slot beyond `config.buffer_size` so the overflow
/// notice always fits.
struct Subscription {
    config: SubscriptionConfig,
    sender: Sender<CoreEvent>,
}

impl Subscription {
    /// Try to send an event. Returns false if buffer is full (subscriber will be dropped).
    fn try_send(&self, event: CoreEvent) -> bool {
        if self.sender.len() >= self.config.buffer_size.max(1) {
            return false;
        }
        self.sender.try_send(event).is_ok()
    }

    /// Check if this subscription wants an event.
    fn matches(&self, event: &CoreEvent) -> bool {
        let filter = &self.config.filter;

        let kind_wanted = match event {
            CoreEvent::DuplicateReset { .. }
            | CoreEvent::RootFinalized { .. }
            | CoreEvent::VersionCreated { .. } => filter.include_versions,
            CoreEvent::RowRecomputed { .. } => filter.include_allocation,
            CoreEvent::Unreserved { .. } => filter.include_reservations,
            CoreEvent::Notice { .. } => filter.include_notices,
            CoreEvent::Dropped { .. } => true,
        };
        if !kind_wanted {
            return false;
        }

        match (&filter.documents, event.document()) {
            (Some(names), Some(name)) => names.contains(name),
            _ => true,
        }
    }
}

/// Manages subscriptions and broadcasts events.
pub struct NoticeHub {
    /// Active subscriptions by ID.
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
    /// Buffer size used by `subscribe_default`.
    default_buffer: usize,
}

impl NoticeHub {
    /// Create a new hub.
    pub fn new() -> Self {
        Self::with_config(&NoticeConfig::default())
    }

    /// Create a hub using configured limits.
    pub fn with_config(config: &NoticeConfig) -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            default_buffer: config.buffer_size.max(1),
        }
    }

    /// Create a new subscription.
    pub fn subscribe(&self, config: SubscriptionConfig) -> SubscriptionHandle {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(config.buffer_size.max(1) + 1);

        self.subscriptions
            .write()
            .insert(id, Subscription { config, sender });

        SubscriptionHandle { id, receiver }
    }

    /// Subscribe to everything using the configured buffer size.
    pub fn subscribe_default(&self) -> SubscriptionHandle {
        self.subscribe(SubscriptionConfig {
            buffer_size: self.default_buffer,
            ..Default::default()
        })
    }

    /// Unsubscribe and clean up.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        if let Some(sub) = self.subscriptions.write().remove(&id) {
            let _ = sub.sender.try_send(CoreEvent::Dropped {
                reason: DropReason::Unsubscribed,
            });
        }
    }

    /// Get subscription count.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    // --- Publishing ---

    /// Publish a plain notice.
    pub fn notify(&self, notice: Notice) {
        self.publish(CoreEvent::Notice { notice });
    }

    /// Publish a version creation.
    pub fn version_created(&self, name: &DocName, source: &DocName, original: &DocName, revision: u32) {
        self.publish(CoreEvent::VersionCreated {
            name: name.clone(),
            source: source.clone(),
            original: original.clone(),
            revision,
        });
    }

    /// Publish an event to matching subscriptions. Drops subscribers that fail to receive.
    pub fn publish(&self, event: CoreEvent) {
        let mut to_remove = Vec::new();

        {
            let subs = self.subscriptions.read();
            for (id, sub) in subs.iter() {
                if sub.matches(&event) && !sub.try_send(event.clone()) {
                    to_remove.push(*id);
                }
            }
        }

        if !to_remove.is_empty() {
            let mut subs = self.subscriptions.write();
            for id in to_remove {
                if let Some(sub) = subs.remove(&id) {
                    tracing::warn!(subscription = id.0, "dropping slow notice subscriber");
                    let _ = sub.sender.try_send(CoreEvent::Dropped {
                        reason: DropReason::BufferOverflow,
                    });
                }
            }
        }
    }
}

impl Default for NoticeHub {
    fn default() -> Self {
        Self::new()
    }
}

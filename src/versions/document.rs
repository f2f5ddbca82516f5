//! Versioned document and the chain-field policies applied by form hooks.

use crate::types::{DocName, Notice, Timestamp};
use serde::{Deserialize, Serialize};

/// Message shown when a copy is turned into a new root.
pub const DUPLICATE_RESET_MESSAGE: &str =
    "Document duplicated as a new base document. Versioning fields reset.";

/// A document participating in a revision chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VersionedDocument {
    /// Identifier assigned by the store on first insert.
    pub name: Option<DocName>,

    /// Root of the chain. Unset until the root has been saved once.
    pub original_reference: Option<DocName>,

    /// 0 for the root, incremented per version.
    pub revision: u32,

    /// Immediate predecessor. Unset for roots.
    pub previous_reference: Option<DocName>,

    /// Whether this is the authoritative member of its chain.
    pub is_active: bool,

    /// True until the document has been inserted.
    #[serde(default)]
    pub is_new: bool,

    /// Business fields owned by the host form.
    #[serde(default)]
    pub body: serde_json::Value,

    pub created: Timestamp,
}

/// Outcome of duplicate detection on load.
#[derive(Clone, Debug, PartialEq)]
pub enum DuplicationDecision {
    /// Fresh root or regular load; nothing changed.
    NotDuplicate,
    /// Copy of a chain member; chain fields were reset.
    ResetAsRoot(Notice),
}

impl VersionedDocument {
    /// A fresh, unsaved root document.
    pub fn new_root(body: serde_json::Value) -> Self {
        Self {
            name: None,
            original_reference: None,
            revision: 0,
            previous_reference: None,
            is_active: true,
            is_new: true,
            body,
            created: Timestamp::now(),
        }
    }

    /// Copy a document the way the host's duplicate action does: every
    /// field is carried over, identity is cleared and the copy is unsaved.
    pub fn duplicate(&self) -> Self {
        Self {
            name: None,
            is_new: true,
            created: Timestamp::now(),
            ..self.clone()
        }
    }

    /// The chain key: the original reference, or the document's own name
    /// for a root that has not been finalized yet.
    pub fn chain_key(&self) -> Option<&DocName> {
        self.original_reference.as_ref().or(self.name.as_ref())
    }

    /// True for a root whose original reference still needs to be set.
    pub fn needs_root_finalization(&self) -> bool {
        self.revision == 0 && self.original_reference.is_none() && self.name.is_some()
    }

    /// Detect a copy of a chain member and turn it into a new root.
    ///
    /// Only unsaved documents are considered. A document whose original
    /// reference is unset, or equal to its own name, is left alone.
    pub fn detect_duplication(&mut self) -> DuplicationDecision {
        if !self.is_new {
            return DuplicationDecision::NotDuplicate;
        }

        let Some(original) = &self.original_reference else {
            return DuplicationDecision::NotDuplicate;
        };

        if self.name.as_ref() == Some(original) {
            return DuplicationDecision::NotDuplicate;
        }

        tracing::debug!(
            original = %original,
            revision = self.revision,
            "detected duplicated document, resetting versioning fields"
        );

        self.original_reference = None;
        self.revision = 0;
        self.previous_reference = None;
        self.is_active = true;

        DuplicationDecision::ResetAsRoot(Notice::info(DUPLICATE_RESET_MESSAGE))
    }

    /// Point a saved root at itself. Returns true if anything changed.
    ///
    /// Idempotent: once the original reference is set this is a no-op.
    pub fn finalize_root_identity(&mut self) -> bool {
        if !self.needs_root_finalization() {
            return false;
        }

        self.original_reference = self.name.clone();
        true
    }
}

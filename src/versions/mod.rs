//! Revision chains across duplicated and derived documents.
//!
//! Documents sharing an `original_reference` form a chain. Exactly one
//! member of a chain is active, and it is always the highest revision.
//! New revisions are derived from the active member; copies made with the
//! host's duplicate action start a chain of their own.

mod document;
mod hooks;
mod manager;

pub use document::{DuplicationDecision, VersionedDocument, DUPLICATE_RESET_MESSAGE};
pub use hooks::{ActionOutcome, VersionedForm};
pub use manager::{VersionChainManager, VersionService};

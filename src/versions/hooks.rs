//! Form lifecycle hooks for versioned documents.

use crate::error::Result;
use crate::notices::{CoreEvent, NoticeHub};
use crate::types::{Affordance, DocName, Notice};
use crate::versions::document::{DuplicationDecision, VersionedDocument};
use crate::versions::manager::VersionService;
use std::sync::Arc;

/// Result of a user-triggered form action.
#[derive(Clone, Debug, PartialEq)]
pub struct ActionOutcome {
    pub notice: Notice,
    /// Document the host should navigate to, if any.
    pub route: Option<DocName>,
}

/// Editing session for one versioned document.
pub struct VersionedForm<S: VersionService + ?Sized> {
    doc: VersionedDocument,
    service: Arc<S>,
    notices: Option<Arc<NoticeHub>>,
}

impl<S: VersionService + ?Sized> VersionedForm<S> {
    pub fn new(doc: VersionedDocument, service: Arc<S>) -> Self {
        Self {
            doc,
            service,
            notices: None,
        }
    }

    /// Open an existing document.
    pub fn open(name: &DocName, service: Arc<S>) -> Result<Self> {
        let doc = service.get(name)?;
        Ok(Self::new(doc, service))
    }

    /// Publish events to a hub.
    pub fn with_notices(mut self, hub: Arc<NoticeHub>) -> Self {
        self.notices = Some(hub);
        self
    }

    pub fn doc(&self) -> &VersionedDocument {
        &self.doc
    }

    pub fn doc_mut(&mut self) -> &mut VersionedDocument {
        &mut self.doc
    }

    /// Form load. Copies of chain members become new roots.
    pub fn on_load(&mut self) -> Option<Notice> {
        match self.doc.detect_duplication() {
            DuplicationDecision::NotDuplicate => None,
            DuplicationDecision::ResetAsRoot(notice) => {
                self.publish(CoreEvent::DuplicateReset {
                    notice: notice.clone(),
                });
                Some(notice)
            }
        }
    }

    /// Buttons available for the current state.
    pub fn refresh(&self) -> Vec<Affordance> {
        if self.doc.is_new {
            Vec::new()
        } else {
            vec![Affordance::CreateNewVersion]
        }
    }

    /// Persist the document, then run `after_save`.
    pub fn save(&mut self) -> Result<()> {
        self.doc = if self.doc.is_new {
            self.service.insert(self.doc.clone())?
        } else {
            self.service.save(&self.doc)?
        };
        self.after_save()?;
        Ok(())
    }

    /// Point a freshly saved root at itself and persist again.
    pub fn after_save(&mut self) -> Result<bool> {
        let mut updated = self.doc.clone();
        if !updated.finalize_root_identity() {
            return Ok(false);
        }

        self.doc = self.service.save(&updated)?;
        if let Some(name) = self.doc.name.clone() {
            tracing::debug!(name = %name, "finalized root identity");
            self.publish(CoreEvent::RootFinalized { name });
        }
        Ok(true)
    }

    /// "Create New Version" button.
    ///
    /// On success the form switches to the new document. On failure the
    /// local document is left as it was and an error notice is returned.
    pub fn create_new_version(&mut self) -> ActionOutcome {
        let Some(source) = self.doc.name.clone() else {
            return ActionOutcome {
                notice: Notice::error("Save the document before creating a new version."),
                route: None,
            };
        };

        match self.service.create_new_version(&source) {
            Ok(new_doc) => {
                let name = new_doc.name.clone().unwrap_or_else(|| source.clone());
                if let Some(original) = new_doc.original_reference.clone() {
                    self.publish(CoreEvent::VersionCreated {
                        name: name.clone(),
                        source: source.clone(),
                        original,
                        revision: new_doc.revision,
                    });
                }
                self.doc = new_doc;

                ActionOutcome {
                    notice: Notice::success(format!(
                        "New version {} created and activated. Previous versions have been deactivated.",
                        name
                    )),
                    route: Some(name),
                }
            }
            Err(e) => {
                tracing::warn!(source = %source, error = %e, "failed to create new version");
                let notice = Notice {
                    title: Some("Failed to create new version".to_string()),
                    ..e.to_notice()
                };
                self.publish(CoreEvent::Notice {
                    notice: notice.clone(),
                });
                ActionOutcome {
                    notice,
                    route: None,
                }
            }
        }
    }

    fn publish(&self, event: CoreEvent) {
        if let Some(hub) = &self.notices {
            hub.publish(event);
        }
    }
}

//! Revision chain scenarios through the form hooks.

use revstock::{
    CoreEvent, DocName, EventFilter, Indicator, NoticeHub, SubscriptionConfig, VersionChainManager,
    VersionService, VersionedDocument, VersionedForm, VersioningConfig,
};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

fn test_manager(dir: &TempDir) -> Arc<VersionChainManager> {
    Arc::new(VersionChainManager::new(
        dir.path().join("chains.bin"),
        VersioningConfig::default(),
    ))
}

fn saved_root(manager: &Arc<VersionChainManager>) -> VersionedForm<VersionChainManager> {
    let mut form = VersionedForm::new(VersionedDocument::new_root(json!({"rev": "a"})), manager.clone());
    form.save().unwrap();
    form
}

#[test]
fn test_root_then_new_version() {
    let dir = TempDir::new().unwrap();
    let manager = test_manager(&dir);

    let mut form = saved_root(&manager);
    let a = form.doc().name.clone().unwrap();
    assert_eq!(form.doc().revision, 0);
    assert_eq!(form.doc().original_reference.as_ref(), Some(&a));

    let outcome = form.create_new_version();
    assert_eq!(outcome.notice.indicator, Indicator::Success);
    let b = outcome.route.unwrap();

    let b_doc = manager.get(&b).unwrap();
    assert_eq!(b_doc.revision, 1);
    assert_eq!(b_doc.previous_reference.as_ref(), Some(&a));
    assert_eq!(b_doc.original_reference.as_ref(), Some(&a));
    assert!(b_doc.is_active);
    assert!(!manager.get(&a).unwrap().is_active);
    assert_eq!(b_doc.body, json!({"rev": "a"}));
}

#[test]
fn test_duplicate_of_version_becomes_root() {
    let dir = TempDir::new().unwrap();
    let manager = test_manager(&dir);

    let mut form = saved_root(&manager);
    let a = form.doc().name.clone().unwrap();
    let b = form.create_new_version().route.unwrap();

    let copy = manager.get(&b).unwrap().duplicate();
    assert_eq!(copy.original_reference.as_ref(), Some(&a));

    let hub = Arc::new(NoticeHub::new());
    let sub = hub.subscribe(SubscriptionConfig {
        filter: EventFilter::versions(),
        ..Default::default()
    });

    let mut c = VersionedForm::new(copy, manager.clone()).with_notices(hub.clone());
    let notice = c.on_load().unwrap();
    assert_eq!(notice.indicator, Indicator::Info);

    let doc = c.doc();
    assert_eq!(doc.original_reference, None);
    assert_eq!(doc.revision, 0);
    assert_eq!(doc.previous_reference, None);
    assert!(doc.is_active);
    assert!(matches!(sub.try_recv(), Ok(CoreEvent::DuplicateReset { .. })));

    c.save().unwrap();
    let c_name = c.doc().name.clone().unwrap();
    assert_ne!(c_name, a);
    assert_eq!(manager.chain(&c_name).len(), 1);
    assert_eq!(manager.chain(&a).len(), 2);
    assert!(matches!(sub.try_recv(), Ok(CoreEvent::RootFinalized { .. })));
}

#[test]
fn test_stale_source_reports_failure() {
    let dir = TempDir::new().unwrap();
    let manager = test_manager(&dir);

    let mut first = saved_root(&manager);
    let a = first.doc().name.clone().unwrap();
    let mut stale = VersionedForm::open(&a, manager.clone()).unwrap();

    first.create_new_version();

    let outcome = stale.create_new_version();
    assert_eq!(outcome.notice.indicator, Indicator::Error);
    assert_eq!(outcome.notice.title.as_deref(), Some("Failed to create new version"));
    assert!(!outcome.notice.message.is_empty());
    assert!(outcome.route.is_none());
    assert_eq!(stale.doc().name.as_ref(), Some(&a));
    assert_eq!(manager.chain(&a).len(), 2);
}

#[test]
fn test_affordance_needs_saved_document() {
    let dir = TempDir::new().unwrap();
    let manager = test_manager(&dir);

    let mut form = VersionedForm::new(VersionedDocument::new_root(json!({})), manager);
    assert!(form.refresh().is_empty());

    form.save().unwrap();
    assert_eq!(form.refresh().len(), 1);
}

#[test]
fn test_history_walks_back_to_root() {
    let dir = TempDir::new().unwrap();
    let manager = test_manager(&dir);

    let mut form = saved_root(&manager);
    let a = form.doc().name.clone().unwrap();
    form.create_new_version();
    let c = form.create_new_version().route.unwrap();

    let history: Vec<DocName> = manager
        .history(&c)
        .unwrap()
        .into_iter()
        .filter_map(|d| d.name)
        .collect();
    assert_eq!(history.len(), 3);
    assert_eq!(history.last(), Some(&a));
    assert_eq!(manager.active_member(&a).unwrap().name, Some(c));
}

//! In-process version store.

use crate::config::VersioningConfig;
use crate::error::{CoreError, Result};
use crate::types::{DocName, Timestamp};
use crate::versions::document::VersionedDocument;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Magic bytes for the chain index file.
const CHAIN_INDEX_MAGIC: &[u8; 4] = b"VCI\0";

/// Current chain index format version.
const CHAIN_INDEX_VERSION: u8 = 1;

/// Persistence and version creation for chained documents.
///
/// The host framework normally provides this; `VersionChainManager` is the
/// in-process implementation.
pub trait VersionService: Send + Sync {
    /// Insert an unsaved document and assign its name.
    fn insert(&self, doc: VersionedDocument) -> Result<VersionedDocument>;

    /// Persist an existing document.
    fn save(&self, doc: &VersionedDocument) -> Result<VersionedDocument>;

    /// Fetch a document by name.
    fn get(&self, name: &DocName) -> Result<VersionedDocument>;

    /// Derive the next revision from the active chain member `source`.
    fn create_new_version(&self, source: &DocName) -> Result<VersionedDocument>;
}

/// Chain index stored on disk.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct ChainIndex {
    /// All documents by name.
    documents: HashMap<DocName, VersionedDocument>,

    /// Next naming series counter.
    next_series: u64,
}

impl ChainIndex {
    fn members<'a>(&'a self, original: &'a DocName) -> impl Iterator<Item = &'a VersionedDocument> {
        self.documents
            .values()
            .filter(move |d| d.chain_key() == Some(original))
    }
}

/// Manages revision chains under a single lock.
///
/// Every mutation that touches `is_active` happens while holding the
/// write lock, so readers never observe a chain with zero or two active
/// members.
pub struct VersionChainManager {
    /// Path to the chain index file.
    path: PathBuf,

    /// Naming rules.
    config: VersioningConfig,

    /// In-memory index.
    index: RwLock<ChainIndex>,
}

impl VersionChainManager {
    /// Create an empty manager.
    pub fn new(path: impl AsRef<Path>, config: VersioningConfig) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            config,
            index: RwLock::new(ChainIndex {
                documents: HashMap::new(),
                next_series: 1,
            }),
        }
    }

    /// Load a manager from file, or start empty if the file is missing.
    pub fn load(path: impl AsRef<Path>, config: VersioningConfig) -> Result<Self> {
        let manager = Self::new(path, config);

        if manager.path.exists() {
            manager.load_from_file()?;
        }

        Ok(manager)
    }

    /// All members of a chain, ordered by revision.
    pub fn chain(&self, original: &DocName) -> Vec<VersionedDocument> {
        let index = self.index.read();
        let mut members: Vec<_> = index.members(original).cloned().collect();
        members.sort_by_key(|d| d.revision);
        members
    }

    /// The active member of a chain.
    pub fn active_member(&self, original: &DocName) -> Option<VersionedDocument> {
        self.index
            .read()
            .members(original)
            .find(|d| d.is_active)
            .cloned()
    }

    /// Walk `previous_reference` links from a document back to its root.
    pub fn history(&self, name: &DocName) -> Result<Vec<VersionedDocument>> {
        let index = self.index.read();
        let mut history = Vec::new();

        let mut current = Some(
            index
                .documents
                .get(name)
                .cloned()
                .ok_or_else(|| CoreError::DocumentNotFound(name.clone()))?,
        );

        while let Some(doc) = current {
            let prev = doc.previous_reference.clone();
            history.push(doc);
            current = prev.and_then(|p| index.documents.get(&p).cloned());
        }

        Ok(history)
    }

    /// Get document count.
    pub fn document_count(&self) -> usize {
        self.index.read().documents.len()
    }

    /// Chains whose active-member count is not exactly one, with that count.
    pub fn chains_violating_single_active(&self) -> Vec<(DocName, usize)> {
        let index = self.index.read();
        let mut counts: HashMap<&DocName, usize> = HashMap::new();

        for doc in index.documents.values() {
            if let Some(key) = doc.chain_key() {
                let entry = counts.entry(key).or_insert(0);
                if doc.is_active {
                    *entry += 1;
                }
            }
        }

        let mut violations: Vec<_> = counts
            .into_iter()
            .filter(|(_, active)| *active != 1)
            .map(|(key, active)| (key.clone(), active))
            .collect();
        violations.sort();
        violations
    }

    /// Save chain index to file.
    pub fn save_index(&self) -> Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)?;

        file.write_all(CHAIN_INDEX_MAGIC)?;
        file.write_all(&[CHAIN_INDEX_VERSION])?;

        let encoded = rmp_serde::to_vec(&*self.index.read())?;
        let checksum = crc32fast::hash(&encoded);

        file.write_all(&(encoded.len() as u64).to_le_bytes())?;
        file.write_all(&checksum.to_le_bytes())?;
        file.write_all(&encoded)?;

        file.sync_all()?;
        Ok(())
    }

    /// Load chain index from file.
    fn load_from_file(&self) -> Result<()> {
        let mut file = File::open(&self.path)?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != CHAIN_INDEX_MAGIC {
            return Err(CoreError::InvalidFormat("Invalid chain index magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != CHAIN_INDEX_VERSION {
            return Err(CoreError::InvalidFormat(format!(
                "Unsupported chain index version: {}",
                version[0]
            )));
        }

        let mut len_bytes = [0u8; 8];
        file.read_exact(&mut len_bytes)?;
        let len = u64::from_le_bytes(len_bytes) as usize;

        let mut checksum_bytes = [0u8; 4];
        file.read_exact(&mut checksum_bytes)?;
        let expected = u32::from_le_bytes(checksum_bytes);

        let mut encoded = vec![0u8; len];
        file.read_exact(&mut encoded)?;

        let got = crc32fast::hash(&encoded);
        if got != expected {
            return Err(CoreError::ChecksumMismatch { expected, got });
        }

        let index: ChainIndex = rmp_serde::from_slice(&encoded)?;
        *self.index.write() = index;

        Ok(())
    }
}

impl VersionService for VersionChainManager {
    fn insert(&self, mut doc: VersionedDocument) -> Result<VersionedDocument> {
        let mut index = self.index.write();

        let name = match doc.name.clone() {
            Some(name) => name,
            None => {
                let name = DocName(self.config.series_name(index.next_series));
                index.next_series += 1;
                name
            }
        };

        if index.documents.contains_key(&name) {
            return Err(CoreError::VersionExists(name));
        }

        // Only roots enter through insert; later revisions come from
        // create_new_version so the active flag stays consistent.
        if let Some(original) = &doc.original_reference {
            if original != &name {
                return Err(CoreError::InvalidOperation(format!(
                    "{} references chain {}; use create_new_version to extend a chain",
                    name, original
                )));
            }
        }

        doc.name = Some(name.clone());
        doc.is_new = false;
        doc.revision = 0;
        doc.previous_reference = None;
        doc.is_active = true;

        index.documents.insert(name.clone(), doc.clone());
        tracing::debug!(name = %name, "inserted root document");

        Ok(doc)
    }

    fn save(&self, doc: &VersionedDocument) -> Result<VersionedDocument> {
        let name = doc
            .name
            .clone()
            .ok_or_else(|| CoreError::InvalidOperation("cannot save an unnamed document".into()))?;

        let mut index = self.index.write();
        let stored = index
            .documents
            .get_mut(&name)
            .ok_or_else(|| CoreError::DocumentNotFound(name.clone()))?;

        stored.body = doc.body.clone();

        // Chain fields belong to the store; the one change a save may make
        // is pointing an unfinalized root at itself.
        if stored.original_reference.is_none() {
            stored.original_reference = Some(name.clone());
            stored.revision = 0;
            tracing::debug!(name = %name, "root original reference set on save");
        }

        Ok(stored.clone())
    }

    fn get(&self, name: &DocName) -> Result<VersionedDocument> {
        self.index
            .read()
            .documents
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::DocumentNotFound(name.clone()))
    }

    fn create_new_version(&self, source_name: &DocName) -> Result<VersionedDocument> {
        let mut index = self.index.write();

        let source = index
            .documents
            .get(source_name)
            .cloned()
            .ok_or_else(|| CoreError::DocumentNotFound(source_name.clone()))?;

        let original = source
            .original_reference
            .clone()
            .ok_or_else(|| CoreError::MissingOriginalReference(source_name.clone()))?;

        if !source.is_active {
            return Err(CoreError::Conflict {
                source_doc: source_name.clone(),
                reason: "source is not the active version of its chain".to_string(),
            });
        }

        let latest = index.members(&original).map(|d| d.revision).max().unwrap_or(0);
        let revision = latest + 1;
        let name = DocName(self.config.version_name(original.as_str(), revision));

        if index.documents.contains_key(&name) {
            return Err(CoreError::VersionExists(name));
        }

        let member_names: Vec<DocName> = index
            .members(&original)
            .filter_map(|d| d.name.clone())
            .collect();
        for member in member_names {
            if let Some(doc) = index.documents.get_mut(&member) {
                doc.is_active = false;
            }
        }

        let new_doc = VersionedDocument {
            name: Some(name.clone()),
            original_reference: Some(original.clone()),
            revision,
            previous_reference: Some(source_name.clone()),
            is_active: true,
            is_new: false,
            body: source.body.clone(),
            created: Timestamp::now(),
        };

        index.documents.insert(name.clone(), new_doc.clone());

        tracing::info!(
            name = %name,
            source = %source_name,
            original = %original,
            revision,
            "created new version"
        );

        Ok(new_doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn manager(dir: &TempDir) -> VersionChainManager {
        VersionChainManager::new(dir.path().join("chains.bin"), VersioningConfig::default())
    }

    fn finalized_root(manager: &VersionChainManager) -> VersionedDocument {
        let doc = manager
            .insert(VersionedDocument::new_root(json!({"qty": 10})))
            .unwrap();
        manager.save(&doc).unwrap()
    }

    #[test]
    fn test_insert_assigns_series_name() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);

        let first = manager.insert(VersionedDocument::new_root(json!({}))).unwrap();
        let second = manager.insert(VersionedDocument::new_root(json!({}))).unwrap();

        assert_eq!(first.name, Some(DocName::from("DOC-00001")));
        assert_eq!(second.name, Some(DocName::from("DOC-00002")));
        assert!(!first.is_new);
    }

    #[test]
    fn test_save_finalizes_root() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);

        let root = finalized_root(&manager);
        assert_eq!(root.original_reference, root.name);
        assert_eq!(root.revision, 0);
    }

    #[test]
    fn test_create_new_version() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        let root = finalized_root(&manager);
        let root_name = root.name.clone().unwrap();

        let v1 = manager.create_new_version(&root_name).unwrap();
        assert_eq!(v1.name, Some(DocName::from("DOC-00001-1")));
        assert_eq!(v1.revision, 1);
        assert_eq!(v1.previous_reference, Some(root_name.clone()));
        assert_eq!(v1.original_reference, Some(root_name.clone()));
        assert_eq!(v1.body, json!({"qty": 10}));
        assert!(v1.is_active);

        assert!(!manager.get(&root_name).unwrap().is_active);
        assert!(manager.chains_violating_single_active().is_empty());
    }

    #[test]
    fn test_stale_source_conflicts() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        let root = finalized_root(&manager);
        let root_name = root.name.unwrap();

        manager.create_new_version(&root_name).unwrap();
        let result = manager.create_new_version(&root_name);

        assert!(matches!(result, Err(CoreError::Conflict { .. })));
        assert_eq!(manager.chain(&root_name).len(), 2);
    }

    #[test]
    fn test_unfinalized_root_cannot_version() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        let doc = manager.insert(VersionedDocument::new_root(json!({}))).unwrap();

        let result = manager.create_new_version(doc.name.as_ref().unwrap());
        assert!(matches!(result, Err(CoreError::MissingOriginalReference(_))));
    }

    #[test]
    fn test_insert_rejects_chain_copy() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        let root = finalized_root(&manager);

        let copy = root.duplicate();
        let result = manager.insert(copy);
        assert!(matches!(result, Err(CoreError::InvalidOperation(_))));
    }

    #[test]
    fn test_history_walks_back_to_root() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        let root = finalized_root(&manager);
        let root_name = root.name.unwrap();

        let v1 = manager.create_new_version(&root_name).unwrap();
        let v2 = manager.create_new_version(v1.name.as_ref().unwrap()).unwrap();

        let history = manager.history(v2.name.as_ref().unwrap()).unwrap();
        let revisions: Vec<u32> = history.iter().map(|d| d.revision).collect();
        assert_eq!(revisions, vec![2, 1, 0]);

        let active = manager.active_member(&root_name).unwrap();
        assert_eq!(active.name, v2.name);
    }

    #[test]
    fn test_persistence() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chains.bin");

        {
            let manager = VersionChainManager::new(&path, VersioningConfig::default());
            let root = finalized_root(&manager);
            manager.create_new_version(root.name.as_ref().unwrap()).unwrap();
            manager.save_index().unwrap();
        }

        {
            let manager = VersionChainManager::load(&path, VersioningConfig::default()).unwrap();
            assert_eq!(manager.document_count(), 2);

            let chain = manager.chain(&DocName::from("DOC-00001"));
            assert_eq!(chain.len(), 2);
            assert!(!chain[0].is_active);
            assert!(chain[1].is_active);

            // Series counter survives the round trip.
            let next = manager.insert(VersionedDocument::new_root(json!({}))).unwrap();
            assert_eq!(next.name, Some(DocName::from("DOC-00002")));
        }
    }

    #[test]
    fn test_corrupt_index_detected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chains.bin");

        {
            let manager = VersionChainManager::new(&path, VersioningConfig::default());
            finalized_root(&manager);
            manager.save_index().unwrap();
        }

        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, bytes).unwrap();

        let result = VersionChainManager::load(&path, VersioningConfig::default());
        assert!(matches!(result, Err(CoreError::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_bad_magic_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chains.bin");
        std::fs::write(&path, b"NOPE\x01").unwrap();

        let result = VersionChainManager::load(&path, VersioningConfig::default());
        assert!(matches!(result, Err(CoreError::InvalidFormat(_))));
    }
}

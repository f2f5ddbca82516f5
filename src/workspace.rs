//! Workspace tying the version chains, allocation and notices together.

use crate::allocation::{
    AllocationDialog, AllocationResolver, AllocationSession, AllocationStrategy, InventoryService,
    RecomputeDispatcher,
};
use crate::config::CoreConfig;
use crate::error::Result;
use crate::notices::NoticeHub;
use crate::types::DocName;
use crate::versions::{VersionChainManager, VersionedDocument, VersionedForm};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File holding the chain index inside the workspace directory.
const CHAIN_INDEX_FILE: &str = "chains.bin";

/// Shared services for one host session.
pub struct Workspace {
    path: PathBuf,
    config: CoreConfig,
    chains: Arc<VersionChainManager>,
    notices: Arc<NoticeHub>,
    resolver: Arc<AllocationResolver>,
}

impl Workspace {
    /// Open the workspace at `path`, creating the directory if needed.
    pub fn open_or_create(
        path: impl AsRef<Path>,
        config: CoreConfig,
        inventory: Arc<dyn InventoryService>,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;

        let chains = VersionChainManager::load(path.join(CHAIN_INDEX_FILE), config.versioning.clone())?;
        let notices = NoticeHub::with_config(&config.notices);
        let resolver = AllocationResolver::new(inventory, config.allocation.item_cache_size);

        tracing::info!(
            path = %path.display(),
            documents = chains.document_count(),
            "workspace opened"
        );

        Ok(Self {
            path,
            config,
            chains: Arc::new(chains),
            notices: Arc::new(notices),
            resolver: Arc::new(resolver),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn chains(&self) -> &Arc<VersionChainManager> {
        &self.chains
    }

    pub fn notices(&self) -> &Arc<NoticeHub> {
        &self.notices
    }

    pub fn resolver(&self) -> &Arc<AllocationResolver> {
        &self.resolver
    }

    /// Form over a new, unsaved document.
    pub fn new_form(&self, body: serde_json::Value) -> VersionedForm<VersionChainManager> {
        VersionedForm::new(VersionedDocument::new_root(body), Arc::clone(&self.chains))
            .with_notices(Arc::clone(&self.notices))
    }

    /// Form over a stored document.
    pub fn open_form(&self, name: &DocName) -> Result<VersionedForm<VersionChainManager>> {
        Ok(VersionedForm::open(name, Arc::clone(&self.chains))?.with_notices(Arc::clone(&self.notices)))
    }

    /// Empty allocation session publishing to this workspace's hub.
    pub fn allocation_session(&self) -> AllocationSession {
        AllocationSession::new().with_notices(Arc::clone(&self.notices))
    }

    /// Allocation dialog using this workspace's range limit.
    pub fn allocation_dialog(&self, strategy: AllocationStrategy, item_code: impl Into<String>) -> AllocationDialog {
        AllocationDialog::new(strategy, item_code).with_range_limit(self.config.allocation.max_serial_range)
    }

    /// Background recompute worker over this workspace's resolver.
    pub fn spawn_dispatcher(&self) -> Result<RecomputeDispatcher> {
        RecomputeDispatcher::spawn(Arc::clone(&self.resolver), self.config.allocation.dispatch_buffer)
    }

    /// Write the chain index to disk.
    pub fn sync(&self) -> Result<()> {
        self.chains.save_index()
    }
}

//! Configuration for the workflow core.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Top-level configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub versioning: VersioningConfig,
    pub allocation: AllocationConfig,
    pub notices: NoticeConfig,
}

impl CoreConfig {
    /// Load configuration from a JSON file. Missing sections use defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read(path.as_ref())?;
        serde_json::from_slice(&raw).map_err(|e| CoreError::Deserialization(e.to_string()))
    }
}

/// Naming of versioned documents.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct VersioningConfig {
    /// Prefix for root document names, e.g. `DOC-00001`.
    pub naming_series_prefix: String,

    /// Zero-padded width of the series counter.
    pub series_digits: usize,

    /// Separator between the root name and the revision number.
    pub version_separator: String,
}

impl Default for VersioningConfig {
    fn default() -> Self {
        Self {
            naming_series_prefix: "DOC-".to_string(),
            series_digits: 5,
            version_separator: "-".to_string(),
        }
    }
}

impl VersioningConfig {
    /// Name for the `counter`-th root document.
    pub fn series_name(&self, counter: u64) -> String {
        format!(
            "{}{:0width$}",
            self.naming_series_prefix,
            counter,
            width = self.series_digits
        )
    }

    /// Name for a revision of a chain.
    pub fn version_name(&self, original: &str, revision: u32) -> String {
        format!("{}{}{}", original, self.version_separator, revision)
    }
}

/// Default cap on serial range expansion.
pub const DEFAULT_MAX_SERIAL_RANGE: usize = 10_000;

/// Stock allocation tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationConfig {
    /// Number of item master records kept in the lookup cache.
    pub item_cache_size: usize,

    /// Depth of the recompute dispatcher queues.
    pub dispatch_buffer: usize,

    /// Most serial numbers a single `first::last` range may expand to.
    pub max_serial_range: usize,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            item_cache_size: 256,
            dispatch_buffer: 64,
            max_serial_range: DEFAULT_MAX_SERIAL_RANGE,
        }
    }
}

/// Notice subscription limits.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NoticeConfig {
    /// Max buffered events per subscriber before it is dropped.
    pub buffer_size: usize,
}

impl Default for NoticeConfig {
    fn default() -> Self {
        Self { buffer_size: 1000 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_series_and_version_names() {
        let config = VersioningConfig::default();
        assert_eq!(config.series_name(7), "DOC-00007");
        assert_eq!(config.version_name("DOC-00007", 2), "DOC-00007-2");
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, br#"{"versioning": {"naming_series_prefix": "DRS-"}}"#).unwrap();

        let config = CoreConfig::from_json_file(&path).unwrap();
        assert_eq!(config.versioning.naming_series_prefix, "DRS-");
        assert_eq!(config.versioning.series_digits, 5);
        assert_eq!(config.allocation.item_cache_size, 256);
        assert_eq!(config.allocation.max_serial_range, DEFAULT_MAX_SERIAL_RANGE);
        assert_eq!(config.notices.buffer_size, 1000);
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, b"not json").unwrap();

        let result = CoreConfig::from_json_file(&path);
        assert!(matches!(result, Err(CoreError::Deserialization(_))));
    }
}

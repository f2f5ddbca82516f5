//! Core types shared by the workflow modules.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Identifier of a document, assigned by the host on first insert.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocName(pub String);

impl DocName {
    pub fn new(name: impl Into<String>) -> Self {
        DocName(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DocName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocName({})", self.0)
    }
}

impl fmt::Display for DocName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DocName {
    fn from(s: &str) -> Self {
        DocName(s.to_string())
    }
}

impl From<String> for DocName {
    fn from(s: String) -> Self {
        DocName(s)
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time. A clock set before the epoch reads as zero.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or_default();
        Timestamp(micros)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Lifecycle state of a host document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DocStatus {
    #[default]
    Draft,
    Submitted,
    Cancelled,
}

impl DocStatus {
    /// Map the host's numeric docstatus (0, 1, 2).
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(DocStatus::Draft),
            1 => Some(DocStatus::Submitted),
            2 => Some(DocStatus::Cancelled),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            DocStatus::Draft => 0,
            DocStatus::Submitted => 1,
            DocStatus::Cancelled => 2,
        }
    }
}

/// Colour hint for a notice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Indicator {
    Info,
    Success,
    Error,
}

/// User-visible message surfaced to the host UI.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub title: Option<String>,
    pub message: String,
    pub indicator: Indicator,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            title: None,
            message: message.into(),
            indicator: Indicator::Info,
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            title: Some("Success".to_string()),
            message: message.into(),
            indicator: Indicator::Success,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            title: Some("Error".to_string()),
            message: message.into(),
            indicator: Indicator::Error,
        }
    }
}

/// Buttons a form may offer, gated by document state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Affordance {
    CreateNewVersion,
    Unreserve,
}

/// Trim a free-text field, treating blank values as unset.
pub fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_empty_trims_blanks() {
        assert_eq!(non_empty(Some("  W1 ")), Some("W1".to_string()));
        assert_eq!(non_empty(Some("   ")), None);
        assert_eq!(non_empty(None), None);
    }

    #[test]
    fn test_docstatus_codes() {
        assert_eq!(DocStatus::from_code(1), Some(DocStatus::Submitted));
        assert_eq!(DocStatus::from_code(7), None);
        assert_eq!(DocStatus::Cancelled.code(), 2);
    }

    #[test]
    fn test_notice_constructors() {
        let notice = Notice::error("boom");
        assert_eq!(notice.indicator, Indicator::Error);
        assert_eq!(notice.title.as_deref(), Some("Error"));
        assert!(Notice::info("x").title.is_none());
    }
}

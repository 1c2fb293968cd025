#![forbid(unsafe_code)]

//! User-visible notifications.
//!
//! The control does not render anything. When something needs the user's
//! attention it emits a [`Notification`] and the host shows it (typically
//! as a toast).

use serde::Serialize;

use dynlookup_core::QueryError;

use crate::barcode::ScanError;

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Error,
    Warning,
    #[default]
    Info,
}

/// A message for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub level: NoticeLevel,
    pub title: String,
    pub message: String,
}

impl Notification {
    pub fn new(level: NoticeLevel, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, title, message)
    }

    /// Shown when the current fetch fails.
    #[must_use]
    pub fn query_failed(error: &QueryError) -> Self {
        Self::error("Error fetching records", error.to_string())
    }

    /// Shown when a scan fails for a reason other than the user closing the
    /// scanner.
    #[must_use]
    pub fn scan_failed(error: &ScanError) -> Self {
        Self::error("Scan error", error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_failure_carries_cause() {
        let n = Notification::query_failed(&QueryError::Transport("timed out".into()));
        assert_eq!(n.level, NoticeLevel::Error);
        assert_eq!(n.title, "Error fetching records");
        assert!(n.message.contains("timed out"));
    }

    #[test]
    fn serializes_lowercase_level() {
        let n = Notification::new(NoticeLevel::Warning, "t", "m");
        let v = serde_json::to_value(&n).unwrap();
        assert_eq!(v["level"], "warning");
    }
}

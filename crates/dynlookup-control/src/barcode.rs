#![forbid(unsafe_code)]

//! Barcode scan channel.
//!
//! Scanning is performed by the host (camera, wedge scanner, ...). The
//! control asks for a scan with `OutputEvent::StartScan` and receives the
//! outcome as a message. Scanned codes go through the same resolve pipeline
//! as a typed value.

use std::fmt;

/// Why a scan produced no codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// The user closed the scanner.
    UserDismissed,
    /// No scanner on this device.
    Unavailable,
    /// The scanner reported a failure.
    Failed(String),
}

impl ScanError {
    /// Whether the user should be told about this failure.
    #[must_use]
    pub const fn is_reportable(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserDismissed => f.write_str("user terminated scanning session"),
            Self::Unavailable => f.write_str("barcode scanner unavailable"),
            Self::Failed(msg) => write!(f, "error during scanning: {msg}"),
        }
    }
}

impl std::error::Error for ScanError {}

/// Join scanned codes into one lookup value.
///
/// Codes are trimmed and blank ones dropped; `None` if nothing is left.
#[must_use]
pub fn join_codes(codes: &[String]) -> Option<String> {
    let kept: Vec<&str> = codes
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .collect();
    (!kept.is_empty()).then(|| kept.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_with_newlines() {
        let codes = vec!["A-1".to_string(), "  ".to_string(), " B-2 ".to_string()];
        assert_eq!(join_codes(&codes).as_deref(), Some("A-1\nB-2"));
        assert_eq!(join_codes(&[]), None);
    }

    #[test]
    fn only_failures_are_reportable() {
        assert!(!ScanError::UserDismissed.is_reportable());
        assert!(!ScanError::Unavailable.is_reportable());
        assert!(ScanError::Failed("camera busy".into()).is_reportable());
        assert_eq!(
            ScanError::Failed("camera busy".into()).to_string(),
            "error during scanning: camera busy"
        );
    }
}

#![forbid(unsafe_code)]

//! Host-facing validation.

use std::fmt;

use serde::Serialize;

/// Why the control is not valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ValidationFailure {
    /// The initial load (or a scope change) has not settled.
    NotReady,
    /// A value is required and nothing is selected.
    RequiredFieldMissing,
}

impl ValidationFailure {
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotReady => "Lookup was not ready before proceeding.",
            Self::RequiredFieldMissing => "Field is required.",
        }
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for ValidationFailure {}

/// Result of `validate()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip)]
    pub failure: Option<ValidationFailure>,
}

impl ValidationReport {
    #[must_use]
    pub const fn valid() -> Self {
        Self {
            is_valid: true,
            error_message: None,
            failure: None,
        }
    }

    #[must_use]
    pub fn invalid(failure: ValidationFailure) -> Self {
        Self {
            is_valid: false,
            error_message: Some(failure.message().to_owned()),
            failure: Some(failure),
        }
    }

    /// Readiness is checked before the required flag.
    #[must_use]
    pub fn check(ready: bool, required: bool, has_selection: bool) -> Self {
        if !ready {
            Self::invalid(ValidationFailure::NotReady)
        } else if required && !has_selection {
            Self::invalid(ValidationFailure::RequiredFieldMissing)
        } else {
            Self::valid()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readiness_first() {
        let r = ValidationReport::check(false, true, false);
        assert_eq!(r.failure, Some(ValidationFailure::NotReady));
        assert!(!r.is_valid);
    }

    #[test]
    fn required_needs_selection() {
        assert_eq!(
            ValidationReport::check(true, true, false).failure,
            Some(ValidationFailure::RequiredFieldMissing)
        );
        assert!(ValidationReport::check(true, true, true).is_valid);
        assert!(ValidationReport::check(true, false, false).is_valid);
    }

    #[test]
    fn serializes_for_host() {
        let v = serde_json::to_value(ValidationReport::invalid(ValidationFailure::NotReady)).unwrap();
        assert_eq!(v["isValid"], false);
        assert_eq!(v["errorMessage"], "Lookup was not ready before proceeding.");
        assert!(v.get("failure").is_none());
        let v = serde_json::to_value(ValidationReport::valid()).unwrap();
        assert!(v.get("errorMessage").is_none());
    }
}

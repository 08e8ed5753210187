//! Identifier checks
//!
//! Collection names become file names under the data directory and record
//! IDs end up in remote filter expressions, so both are restricted to a
//! small character set before either store sees them.

use std::fmt;
use thiserror::Error;

/// What an identifier names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    Collection,
    RecordId,
}

impl IdentifierKind {
    pub fn as_str(self) -> &'static str {
        match self {
            IdentifierKind::Collection => "collection name",
            IdentifierKind::RecordId => "record id",
        }
    }

    fn max_len(self) -> usize {
        match self {
            IdentifierKind::Collection => MAX_COLLECTION_NAME,
            IdentifierKind::RecordId => MAX_RECORD_ID,
        }
    }
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{kind} '{value}' {reason}")]
    Rejected {
        kind: IdentifierKind,
        value: String,
        reason: &'static str,
    },

    #[error("collection name '{0}' is a reserved device name")]
    Reserved(String),
}

pub const MAX_COLLECTION_NAME: usize = 64;
pub const MAX_RECORD_ID: usize = 128;

/// Device names some filesystems refuse as file stems
const DEVICE_NAMES: &[&str] = &[
    "con", "prn", "aux", "nul", "com1", "com2", "com3", "com4", "com5", "com6", "com7", "com8",
    "com9", "lpt1", "lpt2", "lpt3", "lpt4", "lpt5", "lpt6", "lpt7", "lpt8", "lpt9",
];

/// Accepts `[A-Za-z0-9][A-Za-z0-9_-]*`, at most 64 characters, and no
/// device names
pub fn validate_collection_name(name: &str) -> Result<(), ValidationError> {
    check(IdentifierKind::Collection, name)?;

    if DEVICE_NAMES.contains(&name.to_ascii_lowercase().as_str()) {
        return Err(ValidationError::Reserved(name.to_string()));
    }
    Ok(())
}

/// Same alphabet as collection names; device names are fine here
pub fn validate_record_id(id: &str) -> Result<(), ValidationError> {
    check(IdentifierKind::RecordId, id)
}

fn check(kind: IdentifierKind, value: &str) -> Result<(), ValidationError> {
    let reject = |reason| ValidationError::Rejected {
        kind,
        value: value.to_string(),
        reason,
    };

    let Some(first) = value.chars().next() else {
        return Err(reject("is empty"));
    };
    if value.len() > kind.max_len() {
        return Err(reject("is too long"));
    }
    if !first.is_ascii_alphanumeric() {
        return Err(reject("must start with a letter or digit"));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(reject("may only contain letters, digits, '_' and '-'"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_names_and_uuids_pass() {
        for name in ["patients", "prescriptions", "operations", "staff", "labs"] {
            assert!(validate_collection_name(name).is_ok());
        }
        assert!(validate_record_id("3f2b9c1e-8d4a-4f6e-9b1a-2c3d4e5f6a7b").is_ok());
    }

    #[test]
    fn test_path_traversal_blocked() {
        assert!(validate_collection_name("..").is_err());
        assert!(validate_collection_name("../secret").is_err());
        assert!(validate_collection_name("labs/2024").is_err());
        assert!(validate_collection_name("labs.json").is_err());
        assert!(validate_record_id("../../../etc/passwd").is_err());
    }

    #[test]
    fn test_filter_syntax_blocked_in_ids() {
        assert!(validate_record_id("a,b").is_err());
        assert!(validate_record_id("a)").is_err());
        assert!(validate_record_id("x y").is_err());
    }

    #[test]
    fn test_device_names() {
        assert!(matches!(
            validate_collection_name("NUL"),
            Err(ValidationError::Reserved(_))
        ));
        assert!(validate_record_id("nul").is_ok());
    }

    #[test]
    fn test_rejection_names_the_kind() {
        let err = validate_record_id("").unwrap_err();
        assert_eq!(err.to_string(), "record id '' is empty");

        let err = validate_collection_name(&"a".repeat(65)).unwrap_err();
        assert!(err.to_string().starts_with("collection name"));
        assert!(validate_record_id(&"a".repeat(128)).is_ok());
    }
}

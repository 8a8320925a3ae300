//! Input validation for filedb
//!
//! Table names and record keys become directory and file names, so both are
//! checked before any path is built from them.

use thiserror::Error;

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid {kind} '{value}': {reason}")]
    InvalidIdentifier {
        kind: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("{kind} '{value}' is too long (max {max} characters)")]
    TooLong {
        kind: &'static str,
        value: String,
        max: usize,
    },

    #[error("{kind} cannot be empty")]
    Empty { kind: &'static str },
}

/// Maximum length for identifiers
pub const MAX_IDENTIFIER_LENGTH: usize = 255;

/// Reserved device names that cannot be used as file or directory names
const RESERVED_NAMES: &[&str] = &[
    "con", "prn", "aux", "nul",
    "com1", "com2", "com3", "com4", "com5", "com6", "com7", "com8", "com9",
    "lpt1", "lpt2", "lpt3", "lpt4", "lpt5", "lpt6", "lpt7", "lpt8", "lpt9",
];

/// Validate a table name
///
/// Rules:
/// - Must be 1-255 characters
/// - Only ASCII alphanumerics and underscore
/// - Cannot be a reserved device name (case-insensitive)
pub fn validate_table_name(name: &str) -> Result<(), ValidationError> {
    const KIND: &str = "table name";
    check_length(name, KIND)?;

    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ValidationError::InvalidIdentifier {
            kind: KIND,
            value: name.to_string(),
            reason: "contains invalid characters (only alphanumeric and underscore allowed)",
        });
    }

    check_reserved(name, KIND)
}

/// Validate a record key
///
/// Keys come from identity values, so hyphens are allowed anywhere
/// (negative chat ids are common). Path separators and dot segments are not.
pub fn validate_record_key(key: &str) -> Result<(), ValidationError> {
    const KIND: &str = "record key";
    check_length(key, KIND)?;

    if key.contains("..") || key.contains('/') || key.contains('\\') {
        return Err(ValidationError::InvalidIdentifier {
            kind: KIND,
            value: key.to_string(),
            reason: "contains path traversal characters",
        });
    }

    if !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(ValidationError::InvalidIdentifier {
            kind: KIND,
            value: key.to_string(),
            reason: "contains invalid characters (only alphanumeric, underscore, and hyphen allowed)",
        });
    }

    check_reserved(key, KIND)
}

fn check_length(value: &str, kind: &'static str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::Empty { kind });
    }
    if value.len() > MAX_IDENTIFIER_LENGTH {
        return Err(ValidationError::TooLong {
            kind,
            value: value.to_string(),
            max: MAX_IDENTIFIER_LENGTH,
        });
    }
    Ok(())
}

fn check_reserved(value: &str, kind: &'static str) -> Result<(), ValidationError> {
    if RESERVED_NAMES.contains(&value.to_lowercase().as_str()) {
        return Err(ValidationError::InvalidIdentifier {
            kind,
            value: value.to_string(),
            reason: "is a reserved name",
        });
    }
    Ok(())
}

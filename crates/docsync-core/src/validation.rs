//! # Validation Module
//!
//! The one check applied before a mutation enters the outbox: the fields
//! that identify it must not be blank.
//!
//! Content, key length and key format are the application's business. An
//! upsert with `null` content or a very long key is queued as is.

use crate::error::ValidationError;
use crate::types::Mutation;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Rejects a mutation whose `id`, `device_id`, `doc_type` or `doc_key` is
/// empty or whitespace only.
///
/// ## Example
/// ```rust
/// use docsync_core::validation::validate_mutation;
/// use docsync_core::Mutation;
///
/// let ok = Mutation::upsert("note", "n-1", serde_json::Value::Null, "dev-a");
/// assert!(validate_mutation(&ok).is_ok());
///
/// let bad = Mutation::upsert("", "n-1", serde_json::json!({"t": 1}), "dev-a");
/// assert!(validate_mutation(&bad).is_err());
/// ```
pub fn validate_mutation(mutation: &Mutation) -> ValidationResult<()> {
    require("id", &mutation.id)?;
    require("device_id", &mutation.device_id)?;
    require("doc_type", &mutation.doc_type)?;
    require("doc_key", &mutation.doc_key)
}

fn require(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::required(field));
    }
    Ok(())
}

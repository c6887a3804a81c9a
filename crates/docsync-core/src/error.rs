//! Validation failures.
//!
//! ```text
//! ValidationError ──► SyncError::InvalidMutation (docsync)
//! ```
//!
//! Raised before a mutation enters the outbox, so a mutation with no
//! identity never reaches the server.

use thiserror::Error;

/// Why a mutation was refused. `field` is the Rust field name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Empty or whitespace only.
    #[error("{field} is required")]
    Required { field: String },
}

impl ValidationError {
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_names_the_field() {
        assert_eq!(
            ValidationError::required("doc_key").to_string(),
            "doc_key is required"
        );
    }
}

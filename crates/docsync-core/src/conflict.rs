//! # Conflict Extraction
//!
//! Conflicts are not errors: the server settles them by last-writer-wins and
//! reports the verdict on an otherwise normal mutation result. This module
//! finds those results and provides the timestamp comparison both sides use.

use chrono::{DateTime, Utc};

use crate::types::{ConflictWinner, MutationResult};

/// Returns the results that carry a conflict resolution, in input order.
///
/// ## Example
/// ```rust
/// use docsync_core::{extract_conflicts, ConflictResolution, ConflictWinner, MutationResult};
///
/// let results = vec![
///     MutationResult::applied("a"),
///     MutationResult::conflict("b", ConflictResolution { winner: ConflictWinner::Existing, document: None }),
/// ];
/// let conflicts = extract_conflicts(&results);
/// assert_eq!(conflicts.len(), 1);
/// assert_eq!(conflicts[0].id, "b");
/// ```
pub fn extract_conflicts(results: &[MutationResult]) -> Vec<MutationResult> {
    results
        .iter()
        .filter(|result| result.conflict_resolution().is_some())
        .cloned()
        .collect()
}

/// Last-writer-wins: the incoming write wins only if strictly newer.
///
/// Ties keep the existing document so that replaying the same write is
/// never treated as a change.
pub fn last_writer_wins(incoming: DateTime<Utc>, existing: DateTime<Utc>) -> ConflictWinner {
    if incoming > existing {
        ConflictWinner::Incoming
    } else {
        ConflictWinner::Existing
    }
}

use thiserror::Error;

use crate::models::GroupId;
use crate::services::StoreError;

/// Errors surfaced by the matching engine
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// A candidate filled up between selection and join. Handled inside the
    /// engine by moving on to the next candidate.
    #[error("Group {group_id} is at capacity")]
    CapacityConflict { group_id: GroupId },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Persistence failure: {0}")]
    Persistence(#[from] StoreError),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out")]
    TimedOut,
}

impl MatchError {
    /// Whether the caller may retry the same request later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MatchError::Persistence(_) | MatchError::Cancelled | MatchError::TimedOut
        )
    }
}

use async_trait::async_trait;
use std::collections::HashSet;
use thiserror::Error;

use crate::core::filters::CompatibilityFilter;
use crate::models::{Group, GroupId, NewGroup, Rejection, Submission, SubmissionId};

/// Errors raised by the storage collaborators
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// Result of an optimistic join commit
#[derive(Debug, Clone, PartialEq)]
pub enum JoinOutcome {
    /// Group and submission pointer were written; carries the stored group
    Committed(Group),
    /// The group changed since it was read, or filled up; nothing was written
    Stale,
}

/// Durable record of participant submissions
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn get_submission(&self, id: &SubmissionId) -> Result<Option<Submission>, StoreError>;

    /// Insert a submission unless one already exists for its id.
    ///
    /// Returns `false` and writes nothing when the id is taken.
    async fn insert_submission(&self, submission: &Submission) -> Result<bool, StoreError>;
}

/// Durable record of groups, their membership and centroid
#[async_trait]
pub trait GroupStore: Send + Sync {
    /// Groups accepted by `filter` that still have room, oldest first
    async fn query_compatible(&self, filter: &CompatibilityFilter) -> Result<Vec<Group>, StoreError>;

    async fn get_group(&self, id: GroupId) -> Result<Option<Group>, StoreError>;

    /// Persist `joined` and point `submission_id` at it, atomically.
    ///
    /// Applies only if the stored group still carries `expected_version` and
    /// has room; otherwise nothing is written and `Stale` is returned.
    async fn commit_join(
        &self,
        joined: &Group,
        expected_version: i64,
        submission_id: &SubmissionId,
    ) -> Result<JoinOutcome, StoreError>;

    /// Insert a new group and point its founder at it, atomically
    async fn create_group(
        &self,
        draft: NewGroup,
        founder: &SubmissionId,
    ) -> Result<Group, StoreError>;
}

/// Append-only (submission, group) exclusion ledger
#[async_trait]
pub trait RejectionLedger: Send + Sync {
    async fn exists(&self, submission_id: &SubmissionId, group_id: GroupId) -> Result<bool, StoreError>;

    async fn rejected_groups(&self, submission_id: &SubmissionId) -> Result<HashSet<GroupId>, StoreError>;

    async fn rejections(&self, submission_id: &SubmissionId) -> Result<Vec<Rejection>, StoreError>;

    /// Append the record and clear the submission's group pointer in the
    /// same write. Appending an existing pair is a no-op for the ledger.
    async fn append(&self, rejection: &Rejection) -> Result<(), StoreError>;
}

/// Everything the matching engine needs from persistence
pub trait MatchStore: SubmissionStore + GroupStore + RejectionLedger {}

impl<T> MatchStore for T where T: SubmissionStore + GroupStore + RejectionLedger {}

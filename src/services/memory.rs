//! In-memory store for tests, benches and single-process deployments.
//!
//! All three collaborator traits share one `RwLock`, so the multi-entity
//! writes (`commit_join`, `create_group`, `append`) run under a single
//! write guard with no await point in between.
//!
//! ## Limitations
//!
//! - **No persistence**: all state is lost when the process exits
//! - **Single-process only**: concurrent joiners are serialized per process

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use super::store::{GroupStore, JoinOutcome, RejectionLedger, StoreError, SubmissionStore};
use crate::core::filters::{compatible_candidates, CompatibilityFilter};
use crate::models::{Group, GroupId, NewGroup, Rejection, Submission, SubmissionId};

#[derive(Debug, Default)]
struct State {
    submissions: HashMap<SubmissionId, Submission>,
    groups: BTreeMap<GroupId, Group>,
    rejections: Vec<Rejection>,
    next_group_id: i64,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

fn poison_err<T>(_: PoisonError<T>) -> StoreError {
    StoreError::LockPoisoned
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of groups currently held
    pub fn group_count(&self) -> Result<usize, StoreError> {
        Ok(self.state.read().map_err(poison_err)?.groups.len())
    }

    /// Snapshot of every group, ordered by id
    pub fn all_groups(&self) -> Result<Vec<Group>, StoreError> {
        Ok(self.state.read().map_err(poison_err)?.groups.values().cloned().collect())
    }
}

#[async_trait]
impl SubmissionStore for MemoryStore {
    async fn get_submission(&self, id: &SubmissionId) -> Result<Option<Submission>, StoreError> {
        Ok(self.state.read().map_err(poison_err)?.submissions.get(id).cloned())
    }

    async fn insert_submission(&self, submission: &Submission) -> Result<bool, StoreError> {
        let mut state = self.state.write().map_err(poison_err)?;
        if state.submissions.contains_key(&submission.id) {
            return Ok(false);
        }
        state
            .submissions
            .insert(submission.id.clone(), submission.clone());
        Ok(true)
    }
}

#[async_trait]
impl GroupStore for MemoryStore {
    async fn query_compatible(&self, filter: &CompatibilityFilter) -> Result<Vec<Group>, StoreError> {
        let state = self.state.read().map_err(poison_err)?;
        let snapshot: Vec<Group> = state.groups.values().cloned().collect();
        drop(state);

        Ok(compatible_candidates(filter, snapshot).collect())
    }

    async fn get_group(&self, id: GroupId) -> Result<Option<Group>, StoreError> {
        Ok(self.state.read().map_err(poison_err)?.groups.get(&id).cloned())
    }

    async fn commit_join(
        &self,
        joined: &Group,
        expected_version: i64,
        submission_id: &SubmissionId,
    ) -> Result<JoinOutcome, StoreError> {
        let mut state = self.state.write().map_err(poison_err)?;

        let Some(current) = state.groups.get(&joined.id) else {
            return Ok(JoinOutcome::Stale);
        };
        if current.version != expected_version || current.is_full() {
            return Ok(JoinOutcome::Stale);
        }
        if joined.members.len() > joined.capacity() {
            return Ok(JoinOutcome::Stale);
        }
        let Some(submission) = state.submissions.get_mut(submission_id) else {
            return Err(StoreError::Corrupt(format!(
                "submission {} vanished during join",
                submission_id
            )));
        };

        submission.group_id = Some(joined.id);
        let mut stored = joined.clone();
        stored.version = expected_version + 1;
        state.groups.insert(stored.id, stored.clone());

        Ok(JoinOutcome::Committed(stored))
    }

    async fn create_group(&self, draft: NewGroup, founder: &SubmissionId) -> Result<Group, StoreError> {
        let mut state = self.state.write().map_err(poison_err)?;

        if !state.submissions.contains_key(founder) {
            return Err(StoreError::Corrupt(format!(
                "founder {} does not exist",
                founder
            )));
        }

        state.next_group_id += 1;
        let group = draft.with_id(GroupId(state.next_group_id));
        state.groups.insert(group.id, group.clone());
        if let Some(submission) = state.submissions.get_mut(founder) {
            submission.group_id = Some(group.id);
        }

        Ok(group)
    }
}

#[async_trait]
impl RejectionLedger for MemoryStore {
    async fn exists(&self, submission_id: &SubmissionId, group_id: GroupId) -> Result<bool, StoreError> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state
            .rejections
            .iter()
            .any(|r| &r.submission_id == submission_id && r.group_id == group_id))
    }

    async fn rejected_groups(&self, submission_id: &SubmissionId) -> Result<HashSet<GroupId>, StoreError> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state
            .rejections
            .iter()
            .filter(|r| &r.submission_id == submission_id)
            .map(|r| r.group_id)
            .collect())
    }

    async fn rejections(&self, submission_id: &SubmissionId) -> Result<Vec<Rejection>, StoreError> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state
            .rejections
            .iter()
            .filter(|r| &r.submission_id == submission_id)
            .cloned()
            .collect())
    }

    async fn append(&self, rejection: &Rejection) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(poison_err)?;

        let duplicate = state
            .rejections
            .iter()
            .any(|r| r.submission_id == rejection.submission_id && r.group_id == rejection.group_id);
        if !duplicate {
            state.rejections.push(rejection.clone());
        }
        if let Some(submission) = state.submissions.get_mut(&rejection.submission_id) {
            submission.group_id = None;
        }

        Ok(())
    }
}

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::MatchingSettings;
use crate::core::{
    distance::haversine_distance, error::MatchError, filters::CompatibilityFilter,
};
use crate::models::{Group, NewGroup, NewSubmission, Rejection, Submission, SubmissionId, GroupId};
use crate::services::{JoinOutcome, MatchStore};

/// Result of a find-or-join call
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub group: Group,
    /// True when no existing group could take the submission
    pub created: bool,
    /// Distance from the submission to the group's centroid
    pub distance_km: f64,
}

/// Main matching orchestrator
///
/// # Find-or-join
/// 1. Load the submission and its rejection history
/// 2. Return the current group when the submission is already seated in it
/// 3. Walk compatible, non-full groups oldest first and join the first
///    one that is not rejected, using a version-checked commit
/// 4. Otherwise found a new group, or keep the existing reference
///
/// Every operation takes a cancellation token and is bounded by the
/// configured timeout. Each multi-entity write is a single store call, so
/// aborting between calls leaves no partial state.
#[derive(Clone)]
pub struct Matcher {
    store: Arc<dyn MatchStore>,
    settings: MatchingSettings,
}

impl Matcher {
    pub fn new(store: Arc<dyn MatchStore>, settings: MatchingSettings) -> Self {
        Self { store, settings }
    }

    pub fn with_default_settings(store: Arc<dyn MatchStore>) -> Self {
        Self::new(store, MatchingSettings::default())
    }

    pub fn settings(&self) -> &MatchingSettings {
        &self.settings
    }

    /// Find a group for the submission, joining an existing one when possible
    ///
    /// # Arguments
    /// * `id` - Submission to place
    /// * `cancel` - Aborts the operation when triggered
    ///
    /// # Returns
    /// The group the submission now belongs to
    pub async fn find_or_join_group(
        &self,
        id: &SubmissionId,
        cancel: &CancellationToken,
    ) -> Result<MatchOutcome, MatchError> {
        self.guarded(cancel, self.place(id)).await
    }

    /// Reject the submission's current group
    ///
    /// Returns `false` without writing anything when there is nothing to reject.
    pub async fn reject_group(
        &self,
        id: &SubmissionId,
        cancel: &CancellationToken,
    ) -> Result<bool, MatchError> {
        self.guarded(cancel, self.reject(id)).await
    }

    /// Register a new submission; fails with `Conflict` if the id is taken
    pub async fn register_submission(
        &self,
        new: NewSubmission,
        cancel: &CancellationToken,
    ) -> Result<Submission, MatchError> {
        self.guarded(cancel, async move {
            let submission = new.into_submission(Utc::now());
            if !self.store.insert_submission(&submission).await? {
                return Err(MatchError::Conflict(format!(
                    "submission already exists for {}",
                    submission.id
                )));
            }
            tracing::info!("{} created a new submission", submission.id);

            Ok(submission)
        })
        .await
    }

    pub async fn submission(
        &self,
        id: &SubmissionId,
        cancel: &CancellationToken,
    ) -> Result<Submission, MatchError> {
        self.guarded(cancel, self.load_submission(id)).await
    }

    pub async fn group_detail(
        &self,
        id: GroupId,
        cancel: &CancellationToken,
    ) -> Result<Group, MatchError> {
        self.guarded(cancel, async move {
            self.store
                .get_group(id)
                .await?
                .ok_or_else(|| MatchError::NotFound(format!("group {}", id)))
        })
        .await
    }

    /// Rejection history of a submission, oldest first
    pub async fn rejections(
        &self,
        id: &SubmissionId,
        cancel: &CancellationToken,
    ) -> Result<Vec<Rejection>, MatchError> {
        self.guarded(cancel, async move {
            self.load_submission(id).await?;
            Ok(self.store.rejections(id).await?)
        })
        .await
    }

    async fn guarded<T, F>(&self, cancel: &CancellationToken, operation: F) -> Result<T, MatchError>
    where
        F: Future<Output = Result<T, MatchError>>,
    {
        if cancel.is_cancelled() {
            return Err(MatchError::Cancelled);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::warn!("Matching operation cancelled by caller");
                Err(MatchError::Cancelled)
            }
            result = tokio::time::timeout(self.settings.operation_timeout(), operation) => {
                result.unwrap_or_else(|_| {
                    tracing::warn!(
                        "Matching operation exceeded {}s",
                        self.settings.operation_timeout_secs
                    );
                    Err(MatchError::TimedOut)
                })
            }
        }
    }

    async fn load_submission(&self, id: &SubmissionId) -> Result<Submission, MatchError> {
        self.store
            .get_submission(id)
            .await?
            .ok_or_else(|| MatchError::NotFound(format!("submission {}", id)))
    }

    async fn place(&self, id: &SubmissionId) -> Result<MatchOutcome, MatchError> {
        let submission = self.load_submission(id).await?;
        let rejected = self.store.rejected_groups(id).await?;

        // Already seated: re-entrant calls return the same group
        if let Some(current) = submission.group_id {
            if !rejected.contains(&current) {
                if let Some(group) = self.store.get_group(current).await? {
                    if group.has_member(&submission.id) {
                        tracing::debug!("{} already belongs to group {}", id, current);
                        return Ok(self.outcome(&submission, group, false));
                    }
                }
            }
        }

        let filter = CompatibilityFilter::for_submission(&submission);
        let candidates = self.store.query_compatible(&filter).await?;

        tracing::debug!(
            "Found {} candidate groups for {} ({} rejected)",
            candidates.len(),
            id,
            rejected.len()
        );

        for candidate in candidates {
            if rejected.contains(&candidate.id) || candidate.is_full() {
                continue;
            }
            if let Some(group) = self.try_join(&submission, candidate).await? {
                tracing::info!(
                    "{} joined group {} ({}/{})",
                    id,
                    group.id,
                    group.members.len(),
                    group.capacity()
                );
                return Ok(self.outcome(&submission, group, false));
            }
        }

        match submission.group_id {
            None => {
                let draft = NewGroup::founded_by(&submission, Utc::now());
                let group = self.store.create_group(draft, &submission.id).await?;
                tracing::info!("{} founded group {}", id, group.id);
                Ok(self.outcome(&submission, group, true))
            }
            Some(existing) => {
                let group = self
                    .store
                    .get_group(existing)
                    .await?
                    .ok_or_else(|| MatchError::NotFound(format!("group {}", existing)))?;
                tracing::debug!("{} keeps group {}, no better candidate", id, existing);
                Ok(self.outcome(&submission, group, false))
            }
        }
    }

    /// Join one candidate, re-reading it when another joiner got there first.
    ///
    /// Returns `None` when the candidate filled up, vanished, or kept
    /// changing for `max_join_attempts` tries.
    async fn try_join(
        &self,
        submission: &Submission,
        mut candidate: Group,
    ) -> Result<Option<Group>, MatchError> {
        let attempts = self.settings.max_join_attempts.max(1);

        for attempt in 1..=attempts {
            let joined = match candidate.admit(submission) {
                Ok(joined) => joined,
                Err(MatchError::CapacityConflict { group_id }) => {
                    tracing::debug!("Group {} filled up before {} could join", group_id, submission.id);
                    return Ok(None);
                }
                Err(e) => return Err(e),
            };

            match self
                .store
                .commit_join(&joined, candidate.version, &submission.id)
                .await?
            {
                JoinOutcome::Committed(group) => return Ok(Some(group)),
                JoinOutcome::Stale => {
                    tracing::debug!(
                        "Group {} changed during join of {} (attempt {}/{})",
                        candidate.id,
                        submission.id,
                        attempt,
                        attempts
                    );
                    match self.store.get_group(candidate.id).await? {
                        Some(fresh) => candidate = fresh,
                        None => return Ok(None),
                    }
                }
            }
        }

        tracing::warn!(
            "Giving up on group {} for {} after {} attempts",
            candidate.id,
            submission.id,
            attempts
        );
        Ok(None)
    }

    async fn reject(&self, id: &SubmissionId) -> Result<bool, MatchError> {
        let submission = self.load_submission(id).await?;

        let Some(group_id) = submission.group_id else {
            tracing::debug!("{} has no group to reject", id);
            return Ok(false);
        };

        let rejection = Rejection {
            submission_id: submission.id.clone(),
            group_id,
            rejected_at: Utc::now(),
        };
        self.store.append(&rejection).await?;

        tracing::info!("{} rejected group {}", id, group_id);
        Ok(true)
    }

    fn outcome(&self, submission: &Submission, group: Group, created: bool) -> MatchOutcome {
        let distance_km = haversine_distance(&submission.location, &group.centroid);
        MatchOutcome {
            group,
            created,
            distance_km,
        }
    }
}

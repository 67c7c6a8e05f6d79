// Concurrency tests for Tablemate

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tablemate::config::MatchingSettings;
use tablemate::core::{CompatibilityFilter, MatchError, Matcher};
use tablemate::models::{
    Group, GroupId, GroupSize, Location, NewGroup, NewSubmission, Preference, Rejection, Submission,
    SubmissionId,
};
use tablemate::services::{
    GroupStore, JoinOutcome, MemoryStore, RejectionLedger, StoreError, SubmissionStore,
};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Memory store with scripted interference on the write path
#[derive(Default)]
struct ScriptedStore {
    inner: MemoryStore,
    /// Submissions seated by a competing writer right before the next commits
    rivals: Mutex<Vec<SubmissionId>>,
    /// Commits answered with `Stale` without touching the inner store
    forced_stale: AtomicUsize,
    /// Park every commit until the caller gives up
    hold_commits: AtomicBool,
    commit_entered: Notify,
    /// Reads that miss, as if racing an insert that has not landed yet
    hide_submissions: AtomicBool,
    commits: AtomicUsize,
}

impl ScriptedStore {
    async fn seat_rival(&self, group_id: GroupId, rival: &SubmissionId) -> Result<(), StoreError> {
        let current = self.inner.get_group(group_id).await?.expect("group exists");
        let submission = self.inner.get_submission(rival).await?.expect("rival exists");
        let raced = current.admit(&submission).expect("rival fits");
        let outcome = self.inner.commit_join(&raced, current.version, rival).await?;
        assert!(matches!(outcome, JoinOutcome::Committed(_)));
        Ok(())
    }
}

#[async_trait]
impl SubmissionStore for ScriptedStore {
    async fn get_submission(&self, id: &SubmissionId) -> Result<Option<Submission>, StoreError> {
        if self.hide_submissions.load(Ordering::SeqCst) {
            return Ok(None);
        }
        self.inner.get_submission(id).await
    }

    async fn insert_submission(&self, submission: &Submission) -> Result<bool, StoreError> {
        self.inner.insert_submission(submission).await
    }
}

#[async_trait]
impl GroupStore for ScriptedStore {
    async fn query_compatible(&self, filter: &CompatibilityFilter) -> Result<Vec<Group>, StoreError> {
        self.inner.query_compatible(filter).await
    }

    async fn get_group(&self, id: GroupId) -> Result<Option<Group>, StoreError> {
        self.inner.get_group(id).await
    }

    async fn commit_join(
        &self,
        joined: &Group,
        expected_version: i64,
        submission_id: &SubmissionId,
    ) -> Result<JoinOutcome, StoreError> {
        self.commits.fetch_add(1, Ordering::SeqCst);

        if self.hold_commits.load(Ordering::SeqCst) {
            self.commit_entered.notify_one();
            std::future::pending::<()>().await;
        }

        if self
            .forced_stale
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Ok(JoinOutcome::Stale);
        }

        let rival = self.rivals.lock().unwrap().pop();
        if let Some(rival) = rival {
            self.seat_rival(joined.id, &rival).await?;
        }

        self.inner.commit_join(joined, expected_version, submission_id).await
    }

    async fn create_group(&self, draft: NewGroup, founder: &SubmissionId) -> Result<Group, StoreError> {
        self.inner.create_group(draft, founder).await
    }
}

#[async_trait]
impl RejectionLedger for ScriptedStore {
    async fn exists(&self, submission_id: &SubmissionId, group_id: GroupId) -> Result<bool, StoreError> {
        self.inner.exists(submission_id, group_id).await
    }

    async fn rejected_groups(&self, submission_id: &SubmissionId) -> Result<HashSet<GroupId>, StoreError> {
        self.inner.rejected_groups(submission_id).await
    }

    async fn rejections(&self, submission_id: &SubmissionId) -> Result<Vec<Rejection>, StoreError> {
        self.inner.rejections(submission_id).await
    }

    async fn append(&self, rejection: &Rejection) -> Result<(), StoreError> {
        self.inner.append(rejection).await
    }
}

fn small(id: &str, lat: f64) -> NewSubmission {
    NewSubmission {
        id: SubmissionId::new(id),
        category: Preference::Any,
        group_size: Preference::Exactly(GroupSize::Small),
        gender: Preference::Any,
        location: Location::new(lat, lat),
    }
}

fn setup(max_join_attempts: u32) -> (Arc<ScriptedStore>, Matcher, CancellationToken) {
    let store = Arc::new(ScriptedStore::default());
    let settings = MatchingSettings {
        max_join_attempts,
        operation_timeout_secs: 10,
    };
    let matcher = Matcher::new(store.clone(), settings);
    (store, matcher, CancellationToken::new())
}

async fn register(matcher: &Matcher, token: &CancellationToken, new: NewSubmission) -> SubmissionId {
    matcher.register_submission(new, token).await.unwrap().id
}

#[tokio::test]
async fn test_stale_join_rereads_and_retries() {
    let (store, matcher, token) = setup(3);
    let a = register(&matcher, &token, small("a", 0.0)).await;
    let c = register(&matcher, &token, small("c", 3.0)).await;
    let b = register(&matcher, &token, small("b", 6.0)).await;
    let group_id = matcher.find_or_join_group(&a, &token).await.unwrap().group.id;

    // "c" lands in the group between b's read and b's commit
    store.rivals.lock().unwrap().push(c.clone());

    let outcome = matcher.find_or_join_group(&b, &token).await.unwrap();

    assert_eq!(outcome.group.id, group_id);
    assert_eq!(outcome.group.members, vec![a, c.clone(), b.clone()]);
    assert_eq!(outcome.group.centroid, Location::new(3.0, 3.0));
    assert_eq!(outcome.group.version, 2);
    assert_eq!(store.commits.load(Ordering::SeqCst), 2);
    assert_eq!(store.get_submission(&c).await.unwrap().unwrap().group_id, Some(group_id));
    assert_eq!(store.get_submission(&b).await.unwrap().unwrap().group_id, Some(group_id));
}

#[tokio::test]
async fn test_candidate_filled_during_join_moves_to_next_oldest() {
    let (store, matcher, token) = setup(3);
    let a = register(&matcher, &token, small("a", 0.0)).await;
    let b = register(&matcher, &token, small("b", 0.0)).await;
    let older = matcher.find_or_join_group(&a, &token).await.unwrap().group.id;
    matcher.find_or_join_group(&b, &token).await.unwrap();

    // A second, newer group with room
    let d = register(&matcher, &token, small("d", 0.0)).await;
    let founder = store.get_submission(&d).await.unwrap().unwrap();
    let newer = store
        .create_group(NewGroup::founded_by(&founder, Utc::now()), &d)
        .await
        .unwrap()
        .id;

    let rival = register(&matcher, &token, small("rival", 0.0)).await;
    let s = register(&matcher, &token, small("s", 0.0)).await;
    store.rivals.lock().unwrap().push(rival.clone());

    let outcome = matcher.find_or_join_group(&s, &token).await.unwrap();

    assert_eq!(outcome.group.id, newer);
    assert!(!outcome.created);
    let filled = store.get_group(older).await.unwrap().unwrap();
    assert!(filled.is_full());
    assert!(filled.has_member(&rival));
    assert!(!filled.has_member(&s));
    assert_eq!(store.get_submission(&s).await.unwrap().unwrap().group_id, Some(newer));
}

#[tokio::test]
async fn test_join_gives_up_after_max_attempts() {
    let (store, matcher, token) = setup(3);
    let a = register(&matcher, &token, small("a", 0.0)).await;
    let contested = matcher.find_or_join_group(&a, &token).await.unwrap().group;
    let s = register(&matcher, &token, small("s", 0.0)).await;

    store.forced_stale.store(3, Ordering::SeqCst);

    let outcome = matcher.find_or_join_group(&s, &token).await.unwrap();

    assert_eq!(store.commits.load(Ordering::SeqCst), 3);
    assert!(outcome.created);
    assert_ne!(outcome.group.id, contested.id);
    assert_eq!(store.get_group(contested.id).await.unwrap(), Some(contested));
}

#[tokio::test]
async fn test_cancellation_mid_join_writes_nothing() {
    let (store, matcher, token) = setup(3);
    let a = register(&matcher, &token, small("a", 0.0)).await;
    let group = matcher.find_or_join_group(&a, &token).await.unwrap().group;
    let s = register(&matcher, &token, small("s", 0.0)).await;

    store.hold_commits.store(true, Ordering::SeqCst);

    let (result, _) = tokio::join!(matcher.find_or_join_group(&s, &token), async {
        store.commit_entered.notified().await;
        token.cancel();
    });

    assert!(matches!(result, Err(MatchError::Cancelled)));
    assert_eq!(store.commits.load(Ordering::SeqCst), 1);
    assert_eq!(store.get_group(group.id).await.unwrap(), Some(group));
    assert_eq!(store.get_submission(&s).await.unwrap().unwrap().group_id, None);
    assert_eq!(store.inner.group_count().unwrap(), 1);
}

#[tokio::test]
async fn test_duplicate_registration_cannot_overwrite_seated_submission() {
    let (store, matcher, token) = setup(3);
    let a = register(&matcher, &token, small("a", 1.0)).await;
    let group_id = matcher.find_or_join_group(&a, &token).await.unwrap().group.id;
    let before = store.get_submission(&a).await.unwrap().unwrap();

    // A concurrent registration whose existence check ran before the first insert
    store.hide_submissions.store(true, Ordering::SeqCst);
    let mut late = small("a", 50.0);
    late.group_size = Preference::Exactly(GroupSize::Large);
    let result = matcher.register_submission(late, &token).await;
    store.hide_submissions.store(false, Ordering::SeqCst);

    assert!(matches!(result, Err(MatchError::Conflict(_))));
    let after = store.get_submission(&a).await.unwrap().unwrap();
    assert_eq!(after, before);
    assert_eq!(after.group_id, Some(group_id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registrations_create_once() {
    let store = Arc::new(MemoryStore::new());
    let matcher = Arc::new(Matcher::with_default_settings(store.clone()));
    let token = CancellationToken::new();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let matcher = matcher.clone();
            let token = token.clone();
            tokio::spawn(async move { matcher.register_submission(small("same", i as f64), &token).await })
        })
        .collect();

    let mut created = 0;
    for handle in handles {
        match handle.await.expect("task panicked") {
            Ok(_) => created += 1,
            Err(MatchError::Conflict(_)) => {}
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    assert_eq!(created, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_joiners_never_overbook() {
    let store = Arc::new(MemoryStore::new());
    let matcher = Arc::new(Matcher::with_default_settings(store.clone()));
    let token = CancellationToken::new();

    let mut ids = Vec::new();
    for i in 0..30 {
        let s = matcher
            .register_submission(small(&format!("s{}", i), i as f64), &token)
            .await
            .unwrap();
        ids.push(s.id);
    }

    let handles: Vec<_> = ids
        .iter()
        .cloned()
        .map(|id| {
            let matcher = matcher.clone();
            let token = token.clone();
            tokio::spawn(async move { matcher.find_or_join_group(&id, &token).await })
        })
        .collect();

    for handle in handles {
        handle.await.expect("task panicked").expect("find failed");
    }

    let groups = store.all_groups().unwrap();
    let mut seats: HashMap<SubmissionId, usize> = HashMap::new();
    for group in &groups {
        assert!(group.members.len() <= group.capacity(), "group {} overbooked", group.id);
        for member in &group.members {
            *seats.entry(member.clone()).or_default() += 1;
        }
    }

    for id in &ids {
        assert_eq!(seats.get(id), Some(&1), "{} should sit in exactly one group", id);
        let submission = store.get_submission(id).await.unwrap().unwrap();
        let group = groups.iter().find(|g| Some(g.id) == submission.group_id).unwrap();
        assert!(group.has_member(id));
    }
}

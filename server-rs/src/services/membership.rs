use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use rand::Rng;
use uuid::Uuid;

use crate::config::RetryConfig;
use crate::error::{AppError, AppResult};
use crate::models::matches::{Match, NewMatch};
use crate::store::{RosterStore, StoreResult};

/// The membership engine owns every write to `Match.taken` and to the
/// participant set. Capacity checks happen inside the store's per-match
/// transaction; this layer adds validation, error wrapping, and a bounded
/// retry on transient storage failures.
#[derive(Clone)]
pub struct MembershipEngine {
    store: Arc<dyn RosterStore>,
    retry: RetryConfig,
}

impl MembershipEngine {
    pub fn new(store: Arc<dyn RosterStore>, retry: RetryConfig) -> Self {
        Self { store, retry }
    }

    /// Not retried: creation is not idempotent, a replay could insert twice.
    pub async fn create_match(&self, new: NewMatch) -> AppResult<Match> {
        if new.title.trim().is_empty() {
            return Err(AppError::BadRequest("Title is required".into()));
        }
        if new.capacity < 1 {
            return Err(AppError::BadRequest("Capacity must be at least 1".into()));
        }
        Ok(self.store.create_match(new).await?)
    }

    pub async fn list_matches(&self) -> AppResult<Vec<Match>> {
        self.with_retry("list_matches", || self.store.list_matches())
            .await
    }

    pub async fn get_match(&self, id: Uuid) -> AppResult<Match> {
        self.with_retry("get_match", || self.store.get_match(id))
            .await?
            .ok_or_else(|| AppError::NotFound("Match not found".into()))
    }

    pub async fn matches_joined_by(&self, user_id: Uuid) -> AppResult<Vec<Match>> {
        self.with_retry("matches_joined_by", || self.store.matches_joined_by(user_id))
            .await
    }

    /// Reserve a slot. Re-joining a match the user already belongs to is a
    /// no-op returning the unchanged match, so replays after an ambiguous
    /// network failure cannot double-book.
    pub async fn join(&self, match_id: Uuid, user_id: Uuid) -> AppResult<Match> {
        self.with_retry("join", || self.store.join(match_id, user_id))
            .await
    }

    /// Release a slot. Leaving a match the user never joined is a no-op.
    pub async fn leave(&self, match_id: Uuid, user_id: Uuid) -> AppResult<Match> {
        self.with_retry("leave", || self.store.leave(match_id, user_id))
            .await
    }

    async fn with_retry<T, F>(&self, op: &'static str, f: F) -> AppResult<T>
    where
        F: Fn() -> BoxFuture<'static, StoreResult<T>>,
    {
        let attempts = self.retry.max_attempts.max(1);
        let mut attempt: u32 = 0;
        loop {
            match f().await {
                Err(e) if e.is_retryable() && attempt + 1 < attempts => {
                    attempt += 1;
                    let delay = backoff_delay(self.retry.base_delay_ms, attempt);
                    tracing::warn!(
                        op,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "store unavailable, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e.into()),
                Ok(v) => return Ok(v),
            }
        }
    }
}

fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let exp = base_ms.saturating_mul(1u64 << attempt.min(6));
    let jitter = rand::thread_rng().gen_range(0..=base_ms.max(1));
    Duration::from_millis(exp.saturating_add(jitter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::matches::{NewMatch, Participant};
    use crate::store::memory::MemoryStore;
    use crate::store::StoreError;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Barrier;

    fn test_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay_ms: 5,
        }
    }

    fn engine_over(store: Arc<MemoryStore>) -> MembershipEngine {
        MembershipEngine::new(store, test_retry())
    }

    fn new_match(capacity: i32) -> NewMatch {
        NewMatch {
            title: "Sunday pickup".to_string(),
            location: Some("Riverside pitch".to_string()),
            starts_at: Utc::now() + ChronoDuration::days(2),
            capacity,
        }
    }

    #[tokio::test]
    async fn create_match_validates_input() {
        let engine = engine_over(Arc::new(MemoryStore::new()));

        let mut blank = new_match(4);
        blank.title = "  ".to_string();
        assert!(matches!(
            engine.create_match(blank).await,
            Err(AppError::BadRequest(_))
        ));

        assert!(matches!(
            engine.create_match(new_match(0)).await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn join_fills_slots_then_rejects() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_over(store.clone());
        let m = engine.create_match(new_match(2)).await.unwrap();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        let after_a = engine.join(m.id, a).await.unwrap();
        assert_eq!(after_a.taken, 1);

        let after_b = engine.join(m.id, b).await.unwrap();
        assert_eq!(after_b.taken, 2);

        let err = engine.join(m.id, c).await.unwrap_err();
        assert!(matches!(err, AppError::CapacityExceeded));

        let roster = store.participants(m.id).await.unwrap();
        assert_eq!(roster.len(), 2);
        assert!(roster.iter().all(|p| p.user_id != c));
    }

    #[tokio::test]
    async fn rejoin_is_a_noop() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_over(store.clone());
        let m = engine.create_match(new_match(1)).await.unwrap();
        let a = Uuid::new_v4();

        let first = engine.join(m.id, a).await.unwrap();
        assert_eq!(first.taken, 1);

        let second = engine.join(m.id, a).await.unwrap();
        assert_eq!(second.taken, 1);
        assert_eq!(store.participants(m.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn leave_without_membership_is_a_noop() {
        let engine = engine_over(Arc::new(MemoryStore::new()));
        let m = engine.create_match(new_match(2)).await.unwrap();

        let unchanged = engine.leave(m.id, Uuid::new_v4()).await.unwrap();
        assert_eq!(unchanged.taken, 0);
    }

    #[tokio::test]
    async fn join_then_leave_restores_state() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_over(store.clone());
        let m = engine.create_match(new_match(3)).await.unwrap();
        let a = Uuid::new_v4();

        engine.join(m.id, a).await.unwrap();
        let after = engine.leave(m.id, a).await.unwrap();

        assert_eq!(after.taken, 0);
        assert!(store.participants(m.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_match_is_not_found() {
        let engine = engine_over(Arc::new(MemoryStore::new()));
        assert!(matches!(
            engine.join(Uuid::new_v4(), Uuid::new_v4()).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            engine.get_match(Uuid::new_v4()).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_joins_never_overbook() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_over(store.clone());
        let m = engine.create_match(new_match(1)).await.unwrap();

        let barrier = Arc::new(Barrier::new(2));
        let mut handles = Vec::new();
        for _ in 0..2 {
            let engine = engine.clone();
            let barrier = barrier.clone();
            let match_id = m.id;
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                engine.join(match_id, Uuid::new_v4()).await
            }));
        }

        let mut wins = 0;
        let mut full = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => wins += 1,
                Err(AppError::CapacityExceeded) => full += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(full, 1);

        let final_state = engine.get_match(m.id).await.unwrap();
        assert_eq!(final_state.taken, 1);
        assert_eq!(store.participants(m.id).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn capacity_is_a_hard_ceiling_under_contention() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_over(store.clone());
        let m = engine.create_match(new_match(3)).await.unwrap();

        let barrier = Arc::new(Barrier::new(10));
        let mut handles = Vec::new();
        for _ in 0..10 {
            let engine = engine.clone();
            let barrier = barrier.clone();
            let match_id = m.id;
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                engine.join(match_id, Uuid::new_v4()).await
            }));
        }

        let mut wins = 0;
        for h in handles {
            if h.await.unwrap().is_ok() {
                wins += 1;
            }
        }
        assert_eq!(wins, 3);

        let final_state = engine.get_match(m.id).await.unwrap();
        assert_eq!(final_state.taken, 3);
        assert_eq!(store.participants(m.id).await.unwrap().len(), 3);
    }

    /// Delegates to a [`MemoryStore`] but fails the first `fail_joins` join
    /// calls with a retryable error, counting every attempt.
    struct FlakyStore {
        inner: MemoryStore,
        fail_joins: AtomicU32,
        join_calls: AtomicU32,
        terminal: bool,
    }

    impl FlakyStore {
        fn new(inner: MemoryStore, fail_joins: u32, terminal: bool) -> Self {
            Self {
                inner,
                fail_joins: AtomicU32::new(fail_joins),
                join_calls: AtomicU32::new(0),
                terminal,
            }
        }
    }

    impl RosterStore for FlakyStore {
        fn create_match(&self, new: NewMatch) -> BoxFuture<'static, StoreResult<Match>> {
            self.inner.create_match(new)
        }
        fn list_matches(&self) -> BoxFuture<'static, StoreResult<Vec<Match>>> {
            self.inner.list_matches()
        }
        fn get_match(&self, id: Uuid) -> BoxFuture<'static, StoreResult<Option<Match>>> {
            self.inner.get_match(id)
        }
        fn matches_joined_by(
            &self,
            user_id: Uuid,
        ) -> BoxFuture<'static, StoreResult<Vec<Match>>> {
            self.inner.matches_joined_by(user_id)
        }
        fn join(&self, match_id: Uuid, user_id: Uuid) -> BoxFuture<'static, StoreResult<Match>> {
            self.join_calls.fetch_add(1, Ordering::SeqCst);
            let fail = self
                .fail_joins
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if fail {
                if self.terminal {
                    return Box::pin(async { Err(StoreError::CapacityExceeded) });
                }
                return Box::pin(async { Err(StoreError::unavailable("connection reset")) });
            }
            self.inner.join(match_id, user_id)
        }
        fn leave(&self, match_id: Uuid, user_id: Uuid) -> BoxFuture<'static, StoreResult<Match>> {
            self.inner.leave(match_id, user_id)
        }
        fn participants(
            &self,
            match_id: Uuid,
        ) -> BoxFuture<'static, StoreResult<Vec<Participant>>> {
            self.inner.participants(match_id)
        }
        fn health_check(&self) -> BoxFuture<'static, StoreResult<()>> {
            self.inner.health_check()
        }
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let flaky = Arc::new(FlakyStore::new(MemoryStore::new(), 2, false));
        let engine = MembershipEngine::new(flaky.clone(), test_retry());
        let m = engine.create_match(new_match(2)).await.unwrap();

        let joined = engine.join(m.id, Uuid::new_v4()).await.unwrap();
        assert_eq!(joined.taken, 1);
        assert_eq!(flaky.join_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let flaky = Arc::new(FlakyStore::new(MemoryStore::new(), u32::MAX, false));
        let engine = MembershipEngine::new(flaky.clone(), test_retry());
        let m = engine.create_match(new_match(2)).await.unwrap();

        let err = engine.join(m.id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::TransientStore(_)));
        assert_eq!(flaky.join_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn terminal_errors_are_not_retried() {
        let flaky = Arc::new(FlakyStore::new(MemoryStore::new(), u32::MAX, true));
        let engine = MembershipEngine::new(flaky.clone(), test_retry());
        let m = engine.create_match(new_match(2)).await.unwrap();

        let err = engine.join(m.id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::CapacityExceeded));
        assert_eq!(flaky.join_calls.load(Ordering::SeqCst), 1);
    }
}

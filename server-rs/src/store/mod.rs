pub mod memory;
pub mod postgres;

use std::collections::HashMap;
use std::error::Error as StdError;

use futures::future::BoxFuture;
use thiserror::Error;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::matches::{Match, NewMatch, Participant};
use crate::models::profiles::Profile;

pub type StoreResult<T> = Result<T, StoreError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("match not found")]
    MatchNotFound,

    #[error("match is full")]
    CapacityExceeded,

    /// The backend could not be reached. Membership operations are
    /// idempotent, so callers may retry these.
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },

    #[error("storage backend error: {message}")]
    Backend {
        message: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        StoreError::Unavailable {
            message: message.into(),
            source: None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable { .. })
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::MatchNotFound => AppError::NotFound("Match not found".into()),
            StoreError::CapacityExceeded => AppError::CapacityExceeded,
            StoreError::Unavailable { message, .. } => AppError::TransientStore(message),
            StoreError::Backend { message, .. } => AppError::Internal(message),
        }
    }
}

/// Durable record of matches and their memberships.
///
/// `join` and `leave` are the capacity-checked transitions: each backend must
/// apply the decision from [`Match::admit`] / [`Match::release`] atomically,
/// serialized per match, so that `taken` always equals the number of
/// membership rows and never exceeds `capacity`.
///
/// [`Match::admit`]: crate::models::matches::Match::admit
/// [`Match::release`]: crate::models::matches::Match::release
pub trait RosterStore: Send + Sync {
    fn create_match(&self, new: NewMatch) -> BoxFuture<'static, StoreResult<Match>>;
    fn list_matches(&self) -> BoxFuture<'static, StoreResult<Vec<Match>>>;
    fn get_match(&self, id: Uuid) -> BoxFuture<'static, StoreResult<Option<Match>>>;
    fn matches_joined_by(&self, user_id: Uuid) -> BoxFuture<'static, StoreResult<Vec<Match>>>;
    fn join(&self, match_id: Uuid, user_id: Uuid) -> BoxFuture<'static, StoreResult<Match>>;
    fn leave(&self, match_id: Uuid, user_id: Uuid) -> BoxFuture<'static, StoreResult<Match>>;
    fn participants(&self, match_id: Uuid) -> BoxFuture<'static, StoreResult<Vec<Participant>>>;
    fn health_check(&self) -> BoxFuture<'static, StoreResult<()>>;
}

/// Read-mostly directory of user display names.
pub trait ProfileDirectory: Send + Sync {
    fn ensure_profile(
        &self,
        user_id: Uuid,
        display_name: String,
    ) -> BoxFuture<'static, StoreResult<Profile>>;

    /// Batched lookup. An empty input yields an empty map; ids without a
    /// profile are simply absent from the result.
    fn batch_display_names(
        &self,
        user_ids: Vec<Uuid>,
    ) -> BoxFuture<'static, StoreResult<HashMap<Uuid, String>>>;
}

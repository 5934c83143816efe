use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Profile {
    pub id: Uuid,
    #[serde(rename = "displayName")]
    pub display_name: String,
}

/// One row of the public participant list. `display_name` is `None` when the
/// user has no profile or the profile lookup failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterEntry {
    #[serde(rename = "userId")]
    pub user_id: Uuid,
    #[serde(rename = "joinedAt")]
    pub joined_at: DateTime<Utc>,
    #[serde(rename = "displayName")]
    pub display_name: Option<String>,
}

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::profiles::RosterEntry;
use crate::store::{ProfileDirectory, RosterStore};

/// Read-only projection of a match's roster, annotated with display names.
/// Runs outside the membership transaction; it may serve slightly stale data
/// and never takes the locks that `join`/`leave` do.
#[derive(Clone)]
pub struct RosterProjector {
    store: Arc<dyn RosterStore>,
    profiles: Arc<dyn ProfileDirectory>,
}

impl RosterProjector {
    pub fn new(store: Arc<dyn RosterStore>, profiles: Arc<dyn ProfileDirectory>) -> Self {
        Self { store, profiles }
    }

    pub async fn list_participants(&self, match_id: Uuid) -> AppResult<Vec<RosterEntry>> {
        let rows = self
            .store
            .participants(match_id)
            .await
            .map_err(AppError::from)?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let mut ids: Vec<Uuid> = rows.iter().map(|p| p.user_id).collect();
        ids.sort_unstable();
        ids.dedup();

        // One batched lookup; a failure degrades the listing to bare ids
        // instead of failing it.
        let names = match self.profiles.batch_display_names(ids).await {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!(%match_id, error = %e, "profile lookup failed, serving roster without names");
                HashMap::new()
            }
        };

        Ok(rows
            .into_iter()
            .map(|p| RosterEntry {
                display_name: names.get(&p.user_id).cloned(),
                user_id: p.user_id,
                joined_at: p.joined_at,
            })
            .collect())
    }
}

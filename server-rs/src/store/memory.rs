use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use futures::future::BoxFuture;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::models::matches::{order_roster, Admission, Match, NewMatch, Participant, Release};
use crate::models::profiles::Profile;
use crate::store::{ProfileDirectory, RosterStore, StoreError, StoreResult};

struct MatchEntry {
    info: Match,
    members: Vec<Participant>,
}

/// In-process roster backend. Each match lives behind its own mutex, so
/// joins and leaves for one match serialize while different matches proceed
/// in parallel. Backs the test suite and the `STORAGE_BACKEND=memory` mode.
#[derive(Clone, Default)]
pub struct MemoryStore {
    matches: Arc<RwLock<HashMap<Uuid, Arc<Mutex<MatchEntry>>>>>,
    profiles: Arc<RwLock<HashMap<Uuid, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn entry(&self, match_id: Uuid) -> StoreResult<Arc<Mutex<MatchEntry>>> {
        self.matches
            .read()
            .await
            .get(&match_id)
            .cloned()
            .ok_or(StoreError::MatchNotFound)
    }
}

impl RosterStore for MemoryStore {
    fn create_match(&self, new: NewMatch) -> BoxFuture<'static, StoreResult<Match>> {
        let store = self.clone();
        Box::pin(async move {
            let info = Match {
                id: Uuid::new_v4(),
                title: new.title,
                location: new.location,
                starts_at: new.starts_at,
                capacity: new.capacity,
                taken: 0,
                created_at: Utc::now(),
            };
            store.matches.write().await.insert(
                info.id,
                Arc::new(Mutex::new(MatchEntry {
                    info: info.clone(),
                    members: Vec::new(),
                })),
            );
            Ok(info)
        })
    }

    fn list_matches(&self) -> BoxFuture<'static, StoreResult<Vec<Match>>> {
        let store = self.clone();
        Box::pin(async move {
            let entries: Vec<Arc<Mutex<MatchEntry>>> =
                store.matches.read().await.values().cloned().collect();
            let mut out = Vec::with_capacity(entries.len());
            for e in entries {
                out.push(e.lock().await.info.clone());
            }
            out.sort_by(|a, b| a.starts_at.cmp(&b.starts_at).then_with(|| a.id.cmp(&b.id)));
            Ok(out)
        })
    }

    fn get_match(&self, id: Uuid) -> BoxFuture<'static, StoreResult<Option<Match>>> {
        let store = self.clone();
        Box::pin(async move {
            match store.entry(id).await {
                Ok(e) => Ok(Some(e.lock().await.info.clone())),
                Err(StoreError::MatchNotFound) => Ok(None),
                Err(other) => Err(other),
            }
        })
    }

    fn matches_joined_by(&self, user_id: Uuid) -> BoxFuture<'static, StoreResult<Vec<Match>>> {
        let store = self.clone();
        Box::pin(async move {
            let entries: Vec<Arc<Mutex<MatchEntry>>> =
                store.matches.read().await.values().cloned().collect();
            let mut out = Vec::new();
            for e in entries {
                let entry = e.lock().await;
                if entry.members.iter().any(|p| p.user_id == user_id) {
                    out.push(entry.info.clone());
                }
            }
            out.sort_by(|a, b| a.starts_at.cmp(&b.starts_at).then_with(|| a.id.cmp(&b.id)));
            Ok(out)
        })
    }

    fn join(&self, match_id: Uuid, user_id: Uuid) -> BoxFuture<'static, StoreResult<Match>> {
        let store = self.clone();
        Box::pin(async move {
            let entry = store.entry(match_id).await?;
            let mut e = entry.lock().await;

            let already = e.members.iter().any(|p| p.user_id == user_id);
            match e.info.admit(already) {
                Admission::AlreadyMember => Ok(e.info.clone()),
                Admission::Full => Err(StoreError::CapacityExceeded),
                Admission::Admitted => {
                    e.members.push(Participant {
                        match_id,
                        user_id,
                        joined_at: Utc::now(),
                    });
                    e.info.taken = e.members.len() as i32;
                    Ok(e.info.clone())
                }
            }
        })
    }

    fn leave(&self, match_id: Uuid, user_id: Uuid) -> BoxFuture<'static, StoreResult<Match>> {
        let store = self.clone();
        Box::pin(async move {
            let entry = store.entry(match_id).await?;
            let mut e = entry.lock().await;

            let is_member = e.members.iter().any(|p| p.user_id == user_id);
            match e.info.release(is_member) {
                Release::NotMember => Ok(e.info.clone()),
                Release::Released => {
                    e.members.retain(|p| p.user_id != user_id);
                    e.info.taken = e.members.len() as i32;
                    Ok(e.info.clone())
                }
            }
        })
    }

    fn participants(&self, match_id: Uuid) -> BoxFuture<'static, StoreResult<Vec<Participant>>> {
        let store = self.clone();
        Box::pin(async move {
            match store.entry(match_id).await {
                Ok(entry) => {
                    let mut rows = entry.lock().await.members.clone();
                    order_roster(&mut rows);
                    Ok(rows)
                }
                // No roster rows for an unknown match; existence is the
                // engine's concern.
                Err(StoreError::MatchNotFound) => Ok(Vec::new()),
                Err(other) => Err(other),
            }
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StoreResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

impl ProfileDirectory for MemoryStore {
    fn ensure_profile(
        &self,
        user_id: Uuid,
        display_name: String,
    ) -> BoxFuture<'static, StoreResult<Profile>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .profiles
                .write()
                .await
                .insert(user_id, display_name.clone());
            Ok(Profile {
                id: user_id,
                display_name,
            })
        })
    }

    fn batch_display_names(
        &self,
        user_ids: Vec<Uuid>,
    ) -> BoxFuture<'static, StoreResult<HashMap<Uuid, String>>> {
        let store = self.clone();
        Box::pin(async move {
            let profiles = store.profiles.read().await;
            Ok(user_ids
                .into_iter()
                .filter_map(|id| profiles.get(&id).map(|name| (id, name.clone())))
                .collect())
        })
    }
}

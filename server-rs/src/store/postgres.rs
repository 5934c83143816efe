use std::collections::HashMap;

use futures::future::BoxFuture;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::matches::{Admission, Match, NewMatch, Participant, Release};
use crate::models::profiles::Profile;
use crate::store::{ProfileDirectory, RosterStore, StoreError, StoreResult};

const MATCH_COLUMNS: &str = "id, title, location, starts_at, capacity, taken, created_at";

/// Postgres-backed roster. The capacity check and the counter update run in
/// one transaction under a `FOR UPDATE` row lock on the match, which is what
/// the hosted `join_match`/`leave_match` procedures used to do server-side.
#[derive(Clone)]
pub struct PgRosterStore {
    pool: PgPool,
}

impl PgRosterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_sqlx(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            StoreError::Unavailable {
                message: e.to_string(),
                source: Some(Box::new(e)),
            }
        }
        other => StoreError::Backend {
            message: other.to_string(),
            source: Some(Box::new(other)),
        },
    }
}

impl RosterStore for PgRosterStore {
    fn create_match(&self, new: NewMatch) -> BoxFuture<'static, StoreResult<Match>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let created: Match = sqlx::query_as(&format!(
                r#"INSERT INTO matches (id, title, location, starts_at, capacity, taken, created_at)
                VALUES ($1, $2, $3, $4, $5, 0, NOW())
                RETURNING {MATCH_COLUMNS}"#
            ))
            .bind(Uuid::new_v4())
            .bind(&new.title)
            .bind(&new.location)
            .bind(new.starts_at)
            .bind(new.capacity)
            .fetch_one(&pool)
            .await
            .map_err(map_sqlx)?;
            Ok(created)
        })
    }

    fn list_matches(&self) -> BoxFuture<'static, StoreResult<Vec<Match>>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            sqlx::query_as(&format!(
                "SELECT {MATCH_COLUMNS} FROM matches ORDER BY starts_at ASC, id ASC"
            ))
            .fetch_all(&pool)
            .await
            .map_err(map_sqlx)
        })
    }

    fn get_match(&self, id: Uuid) -> BoxFuture<'static, StoreResult<Option<Match>>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            sqlx::query_as(&format!("SELECT {MATCH_COLUMNS} FROM matches WHERE id = $1"))
                .bind(id)
                .fetch_optional(&pool)
                .await
                .map_err(map_sqlx)
        })
    }

    fn matches_joined_by(&self, user_id: Uuid) -> BoxFuture<'static, StoreResult<Vec<Match>>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            sqlx::query_as(
                r#"SELECT m.id, m.title, m.location, m.starts_at, m.capacity, m.taken, m.created_at
                FROM matches m
                JOIN participants p ON p.match_id = m.id
                WHERE p.user_id = $1
                ORDER BY m.starts_at ASC, m.id ASC"#,
            )
            .bind(user_id)
            .fetch_all(&pool)
            .await
            .map_err(map_sqlx)
        })
    }

    fn join(&self, match_id: Uuid, user_id: Uuid) -> BoxFuture<'static, StoreResult<Match>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let mut tx = pool.begin().await.map_err(map_sqlx)?;

            let m: Match = sqlx::query_as(&format!(
                "SELECT {MATCH_COLUMNS} FROM matches WHERE id = $1 FOR UPDATE"
            ))
            .bind(match_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx)?
            .ok_or(StoreError::MatchNotFound)?;

            let already: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM participants WHERE match_id = $1 AND user_id = $2)",
            )
            .bind(match_id)
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx)?;

            match m.admit(already) {
                Admission::AlreadyMember => {
                    tx.rollback().await.map_err(map_sqlx)?;
                    Ok(m)
                }
                Admission::Full => {
                    tx.rollback().await.map_err(map_sqlx)?;
                    Err(StoreError::CapacityExceeded)
                }
                Admission::Admitted => {
                    sqlx::query(
                        "INSERT INTO participants (match_id, user_id, joined_at) VALUES ($1, $2, NOW())",
                    )
                    .bind(match_id)
                    .bind(user_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(map_sqlx)?;

                    let updated: Match = sqlx::query_as(&format!(
                        "UPDATE matches SET taken = taken + 1 WHERE id = $1 RETURNING {MATCH_COLUMNS}"
                    ))
                    .bind(match_id)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(map_sqlx)?;

                    tx.commit().await.map_err(map_sqlx)?;
                    Ok(updated)
                }
            }
        })
    }

    fn leave(&self, match_id: Uuid, user_id: Uuid) -> BoxFuture<'static, StoreResult<Match>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let mut tx = pool.begin().await.map_err(map_sqlx)?;

            let m: Match = sqlx::query_as(&format!(
                "SELECT {MATCH_COLUMNS} FROM matches WHERE id = $1 FOR UPDATE"
            ))
            .bind(match_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx)?
            .ok_or(StoreError::MatchNotFound)?;

            let is_member: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM participants WHERE match_id = $1 AND user_id = $2)",
            )
            .bind(match_id)
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx)?;

            match m.release(is_member) {
                Release::NotMember => {
                    tx.rollback().await.map_err(map_sqlx)?;
                    Ok(m)
                }
                Release::Released => {
                    sqlx::query("DELETE FROM participants WHERE match_id = $1 AND user_id = $2")
                        .bind(match_id)
                        .bind(user_id)
                        .execute(&mut *tx)
                        .await
                        .map_err(map_sqlx)?;

                    let updated: Match = sqlx::query_as(&format!(
                        "UPDATE matches SET taken = GREATEST(taken - 1, 0) WHERE id = $1 RETURNING {MATCH_COLUMNS}"
                    ))
                    .bind(match_id)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(map_sqlx)?;

                    tx.commit().await.map_err(map_sqlx)?;
                    Ok(updated)
                }
            }
        })
    }

    fn participants(&self, match_id: Uuid) -> BoxFuture<'static, StoreResult<Vec<Participant>>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            sqlx::query_as(
                r#"SELECT match_id, user_id, joined_at
                FROM participants
                WHERE match_id = $1
                ORDER BY joined_at ASC, user_id ASC"#,
            )
            .bind(match_id)
            .fetch_all(&pool)
            .await
            .map_err(map_sqlx)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StoreResult<()>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            sqlx::query_scalar::<_, i32>("SELECT 1")
                .fetch_one(&pool)
                .await
                .map_err(map_sqlx)?;
            Ok(())
        })
    }
}

#[derive(Clone)]
pub struct PgProfileDirectory {
    pool: PgPool,
}

impl PgProfileDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl ProfileDirectory for PgProfileDirectory {
    fn ensure_profile(
        &self,
        user_id: Uuid,
        display_name: String,
    ) -> BoxFuture<'static, StoreResult<Profile>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            sqlx::query_as(
                r#"INSERT INTO profiles (id, display_name) VALUES ($1, $2)
                ON CONFLICT (id) DO UPDATE SET display_name = EXCLUDED.display_name
                RETURNING id, display_name"#,
            )
            .bind(user_id)
            .bind(&display_name)
            .fetch_one(&pool)
            .await
            .map_err(map_sqlx)
        })
    }

    fn batch_display_names(
        &self,
        user_ids: Vec<Uuid>,
    ) -> BoxFuture<'static, StoreResult<HashMap<Uuid, String>>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            if user_ids.is_empty() {
                return Ok(HashMap::new());
            }
            let rows: Vec<(Uuid, String)> =
                sqlx::query_as("SELECT id, display_name FROM profiles WHERE id = ANY($1)")
                    .bind(&user_ids)
                    .fetch_all(&pool)
                    .await
                    .map_err(map_sqlx)?;
            Ok(rows.into_iter().collect())
        })
    }
}

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::models::matches::{CreateMatchRequest, Match};
use crate::models::profiles::RosterEntry;
use crate::AppState;

const MATCH_LIST_KEY: &str = "matches:upcoming";

fn roster_key(match_id: Uuid) -> String {
    format!("roster:{match_id}")
}

async fn invalidate_match_caches(state: &AppState, match_id: Uuid) {
    state.cache.del(MATCH_LIST_KEY).await;
    state.cache.del(&roster_key(match_id)).await;
}

pub async fn list_matches(
    State(state): State<AppState>,
    user: Option<axum::Extension<AuthUser>>,
) -> AppResult<Json<Value>> {
    let matches = match state.cache.get_json::<Vec<Match>>(MATCH_LIST_KEY).await {
        Some(cached) => cached,
        None => {
            let matches = state.engine.list_matches().await?;
            state
                .cache
                .set_json(
                    MATCH_LIST_KEY,
                    &matches,
                    state.config.roster.cache_seconds as u64,
                )
                .await;
            matches
        }
    };

    // Signed-in viewers also get the ids of matches they already belong to,
    // so the list can mark them as joined.
    if let Some(user) = user {
        let joined_ids: Vec<Uuid> = state
            .engine
            .matches_joined_by(user.id)
            .await?
            .iter()
            .map(|m| m.id)
            .collect();
        return Ok(Json(
            json!({ "matches": matches, "joinedMatchIds": joined_ids }),
        ));
    }

    Ok(Json(json!({ "matches": matches })))
}

pub async fn create_match(
    State(state): State<AppState>,
    Json(body): Json<CreateMatchRequest>,
) -> AppResult<Json<Value>> {
    let m = state.engine.create_match(body.into()).await?;
    state.cache.del(MATCH_LIST_KEY).await;

    Ok(Json(json!({ "match": m })))
}

pub async fn get_match(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let m = state.engine.get_match(id).await?;
    Ok(Json(json!({ "match": m })))
}

pub async fn join_match(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let m = state.engine.join(id, user.id).await?;
    invalidate_match_caches(&state, id).await;

    Ok(Json(json!({ "match": m })))
}

pub async fn leave_match(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let m = state.engine.leave(id, user.id).await?;
    invalidate_match_caches(&state, id).await;

    Ok(Json(json!({ "match": m })))
}

pub async fn list_participants(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let key = roster_key(id);
    if let Some(cached) = state.cache.get_json::<Vec<RosterEntry>>(&key).await {
        return Ok(Json(json!({ "participants": cached })));
    }

    let roster = state.roster.list_participants(id).await?;
    state
        .cache
        .set_json(&key, &roster, state.config.roster.cache_seconds as u64)
        .await;

    Ok(Json(json!({ "participants": roster })))
}

pub async fn joined_matches(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
) -> AppResult<Json<Value>> {
    let matches = state.engine.matches_joined_by(user.id).await?;
    Ok(Json(json!({ "matches": matches })))
}

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::AppState;

/// Upserts the caller's profile with a display name derived from the
/// verified identity, so roster entries label themselves after first login.
pub async fn ensure_profile(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
) -> AppResult<Json<Value>> {
    let profile = state
        .profiles
        .ensure_profile(user.id, user.display_name())
        .await
        .map_err(AppError::from)?;

    Ok(Json(json!({ "profile": profile })))
}

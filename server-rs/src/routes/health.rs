use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::AppState;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let store_ok = state.store.health_check().await.is_ok();
    let redis_ok = state.cache.health_check().await;

    let status = if store_ok && redis_ok {
        "healthy"
    } else {
        "degraded"
    };
    Json(json!({
        "status": status,
        "store": store_ok,
        "redis": redis_ok,
        "timestamp": chrono::Utc::now(),
    }))
}

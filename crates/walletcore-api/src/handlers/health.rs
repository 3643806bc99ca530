//! Health endpoints

use axum::Json;
use serde_json::{json, Value};

/// Liveness probe.
pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Readiness probe. The wrapper holds no connections of its own; once the
/// process serves requests it is ready.
pub async fn readiness_check() -> Json<Value> {
    Json(json!({ "status": "ready" }))
}

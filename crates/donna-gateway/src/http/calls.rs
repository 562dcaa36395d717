use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use donna_core::types::SeniorId;

use crate::app::AppState;

#[derive(Deserialize)]
pub struct ManualCallRequest {
    pub senior_id: String,
}

/// POST /calls — caregiver-triggered immediate check-in call. Context is
/// pre-built and stashed under the phone number before the dial, mirroring
/// the scheduler's prefetch.
pub async fn manual_call(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ManualCallRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let profile = state
        .seniors
        .get(&SeniorId::from(req.senior_id.clone()))
        .map_err(|e| {
            warn!(senior = %req.senior_id, error = %e, "manual call: unknown senior");
            (
                StatusCode::NOT_FOUND,
                Json(json!({"error": "senior not found"})),
            )
        })?;

    let call_id = state.engine.manual_call(&profile).await.map_err(|e| {
        warn!(senior = %req.senior_id, error = %e, "manual call failed");
        (
            StatusCode::BAD_GATEWAY,
            Json(json!({"error": "call could not be placed"})),
        )
    })?;

    info!(senior = %req.senior_id, call_id = %call_id, "manual call placed");
    Ok(Json(json!({"ok": true, "call_id": call_id.as_str()})))
}

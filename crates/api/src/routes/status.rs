use std::sync::Arc;

use axum::Json;
use axum::extract::State;

use projections::SystemStatus;

use crate::AppState;
use crate::error::ApiError;

/// Read-only snapshot of the event store position and every projection's
/// name and position, for liveness and lag monitoring.
pub async fn get(State(state): State<Arc<AppState>>) -> Result<Json<SystemStatus>, ApiError> {
    let status = SystemStatus::build(state.store.as_ref(), &state.projections).await?;
    Ok(Json(status))
}

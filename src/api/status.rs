use axum::{extract::State, Json};

use crate::api::{unavailable, ApiError, AppState, ErrorResponse};
use crate::models::StatusResponse;

/// Agency, snapshot timestamps and table sizes
#[utoipa::path(
    get,
    path = "/api/status",
    responses(
        (status = 200, description = "Cache status", body = StatusResponse),
        (status = 503, description = "Schedule unavailable", body = ErrorResponse)
    ),
    tag = "status"
)]
pub async fn get_status(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    state.transit.status().await.map(Json).map_err(unavailable)
}

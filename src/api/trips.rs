use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::api::{not_found, unavailable, ApiError, AppState, ErrorResponse};
use crate::models::{LiveTripsResponse, TripDetail};

const DEFAULT_LIVE_LIMIT: usize = 50;
const MAX_LIVE_LIMIT: usize = 500;

/// Full schedule of a trip with live estimates and progress
#[utoipa::path(
    get,
    path = "/api/trips/{trip_id}",
    params(("trip_id" = String, Path, description = "Static GTFS trip id")),
    responses(
        (status = 200, description = "Trip detail", body = TripDetail),
        (status = 404, description = "Trip not found", body = ErrorResponse),
        (status = 503, description = "Schedule unavailable", body = ErrorResponse)
    ),
    tag = "trips"
)]
pub async fn get_trip(
    State(state): State<AppState>,
    Path(trip_id): Path<String>,
) -> Result<Json<TripDetail>, ApiError> {
    state
        .transit
        .trip_detail(&trip_id)
        .await
        .map_err(unavailable)?
        .map(Json)
        .ok_or_else(|| not_found("Trip", &trip_id))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct LiveTripsQuery {
    /// Route id or short name
    pub route: Option<String>,
    /// Maximum number of trips (default 50, max 500)
    pub limit: Option<usize>,
}

/// Trips running today that the live feed is reporting on
#[utoipa::path(
    get,
    path = "/api/trips/live",
    params(LiveTripsQuery),
    responses(
        (status = 200, description = "Live trips with progress", body = LiveTripsResponse),
        (status = 503, description = "Schedule unavailable", body = ErrorResponse)
    ),
    tag = "trips"
)]
pub async fn list_live_trips(
    State(state): State<AppState>,
    Query(query): Query<LiveTripsQuery>,
) -> Result<Json<LiveTripsResponse>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIVE_LIMIT).min(MAX_LIVE_LIMIT);
    let response = state
        .transit
        .live_trips(query.route.as_deref(), limit)
        .await
        .map_err(unavailable)?;
    Ok(Json(response))
}

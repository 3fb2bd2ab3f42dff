use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::api::{not_found, unavailable, ApiError, AppState, ErrorResponse};
use crate::models::{StopDepartures, StopSearchResponse};

const DEFAULT_SEARCH_LIMIT: usize = 10;
const DEFAULT_DEPARTURE_LIMIT: usize = 10;
const MAX_LIMIT: usize = 100;

#[derive(Debug, Deserialize, IntoParams)]
pub struct StopSearchQuery {
    /// Case-insensitive text matched against stop name, id and code
    #[serde(default)]
    pub q: String,
    /// Maximum number of stops (default 10, max 100)
    pub limit: Option<usize>,
}

/// Search stops by name, id or code
#[utoipa::path(
    get,
    path = "/api/stops",
    params(StopSearchQuery),
    responses(
        (status = 200, description = "Matching stops with their next departures", body = StopSearchResponse),
        (status = 503, description = "Schedule unavailable", body = ErrorResponse)
    ),
    tag = "stops"
)]
pub async fn search_stops(
    State(state): State<AppState>,
    Query(query): Query<StopSearchQuery>,
) -> Result<Json<StopSearchResponse>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_SEARCH_LIMIT).min(MAX_LIMIT);
    let stops = state
        .transit
        .search_stops(&query.q, limit)
        .await
        .map_err(unavailable)?;
    Ok(Json(StopSearchResponse { stops }))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct DepartureQuery {
    /// Only routes whose short name contains this text
    pub route: Option<String>,
    /// Maximum number of departures (default 10, max 100)
    pub limit: Option<usize>,
}

/// Upcoming departures from a stop or from all platforms of a station
#[utoipa::path(
    get,
    path = "/api/stops/{stop_id}/departures",
    params(
        ("stop_id" = String, Path, description = "GTFS stop or parent station id"),
        DepartureQuery
    ),
    responses(
        (status = 200, description = "Departures, earliest first", body = StopDepartures),
        (status = 404, description = "Stop not found", body = ErrorResponse),
        (status = 503, description = "Schedule unavailable", body = ErrorResponse)
    ),
    tag = "stops"
)]
pub async fn get_stop_departures(
    State(state): State<AppState>,
    Path(stop_id): Path<String>,
    Query(query): Query<DepartureQuery>,
) -> Result<Json<StopDepartures>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_DEPARTURE_LIMIT).min(MAX_LIMIT);
    state
        .transit
        .upcoming_departures(&stop_id, query.route.as_deref(), limit)
        .await
        .map_err(unavailable)?
        .map(Json)
        .ok_or_else(|| not_found("Stop", &stop_id))
}

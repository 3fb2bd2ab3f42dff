use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::api::{not_found, unavailable, ApiError, AppState, ErrorResponse};
use crate::models::{RouteListResponse, RouteShape};

/// List all routes with today's activity, sorted by short name
#[utoipa::path(
    get,
    path = "/api/routes",
    responses(
        (status = 200, description = "List of routes", body = RouteListResponse),
        (status = 503, description = "Schedule unavailable", body = ErrorResponse)
    ),
    tag = "routes"
)]
pub async fn list_routes(State(state): State<AppState>) -> Result<Json<RouteListResponse>, ApiError> {
    let routes = state.transit.list_routes().await.map_err(unavailable)?;
    Ok(Json(RouteListResponse { routes }))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ShapeQuery {
    /// Stop or station id for the start marker
    pub start: Option<String>,
    /// Stop or station id for the end marker
    pub end: Option<String>,
}

/// Get the shape of a route as a [lon, lat] polyline with end markers
#[utoipa::path(
    get,
    path = "/api/routes/{route_id}/shape",
    params(
        ("route_id" = String, Path, description = "GTFS route id"),
        ShapeQuery
    ),
    responses(
        (status = 200, description = "Route shape", body = RouteShape),
        (status = 404, description = "Route not found", body = ErrorResponse),
        (status = 503, description = "Schedule unavailable", body = ErrorResponse)
    ),
    tag = "routes"
)]
pub async fn get_route_shape(
    State(state): State<AppState>,
    Path(route_id): Path<String>,
    Query(query): Query<ShapeQuery>,
) -> Result<Json<RouteShape>, ApiError> {
    state
        .transit
        .route_shape(&route_id, query.start.as_deref(), query.end.as_deref())
        .await
        .map_err(unavailable)?
        .map(Json)
        .ok_or_else(|| not_found("Route", &route_id))
}

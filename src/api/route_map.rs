use axum::Json;
use tracing::debug;

use crate::api::{bad_request, ApiError, ErrorResponse};
use crate::models::{RouteMap, RouteMapPayload};

/// Resolve a bare polyline or a route shape into a canonical route map
#[utoipa::path(
    post,
    path = "/api/route-map",
    request_body = RouteMapPayload,
    responses(
        (status = 200, description = "Canonical route map", body = RouteMap),
        (status = 400, description = "Coordinates out of range", body = ErrorResponse),
        (status = 422, description = "Payload matches neither shape")
    ),
    tag = "maps"
)]
pub async fn resolve_route_map(
    Json(payload): Json<RouteMapPayload>,
) -> Result<Json<RouteMap>, ApiError> {
    let map = RouteMap::from(payload);
    let invalid = map.invalid_points();
    if invalid > 0 {
        return Err(bad_request(format!(
            "{} point(s) outside [lon, lat] range",
            invalid
        )));
    }
    debug!(points = map.coordinates.len(), markers = map.markers.len(), "Resolved route map");
    Ok(Json(map))
}

pub mod error;
pub mod route_map;
pub mod routes;
pub mod status;
pub mod stops;
pub mod trips;

pub use error::{bad_request, not_found, unavailable, ApiError, ErrorResponse};

use axum::Router;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::services::TransitService;

#[derive(Clone)]
pub struct AppState {
    pub transit: TransitService,
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Transit Live API",
        description = "Static GTFS schedule reconciled with GTFS-Realtime trip updates"
    ),
    tags(
        (name = "routes", description = "Routes and their shapes"),
        (name = "stops", description = "Stop search and departures"),
        (name = "trips", description = "Trip detail and live trips"),
        (name = "maps", description = "Route map payloads"),
        (name = "status", description = "Snapshot status")
    )
)]
pub struct ApiDoc;

/// All API routes with their OpenAPI description.
pub fn router(state: AppState) -> (Router, utoipa::openapi::OpenApi) {
    OpenApiRouter::with_openapi(ApiDoc::openapi())
        .routes(routes!(routes::list_routes))
        .routes(routes!(routes::get_route_shape))
        .routes(routes!(stops::search_stops))
        .routes(routes!(stops::get_stop_departures))
        .routes(routes!(trips::list_live_trips))
        .routes(routes!(trips::get_trip))
        .routes(routes!(route_map::resolve_route_map))
        .routes(routes!(status::get_status))
        .with_state(state)
        .split_for_parts()
}

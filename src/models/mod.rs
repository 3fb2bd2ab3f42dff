//! Response shapes produced by the query façade.

pub mod route_map;

pub use route_map::{RouteMap, RouteMapPayload};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::services::estimates::DelayStatus;
use crate::services::progress::TripProgress;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RouteSummary {
    pub route_id: String,
    pub short_name: String,
    pub long_name: String,
    pub route_type: String,
    /// Hex without `#`
    pub color: String,
    pub text_color: String,
    /// Whether any trip of the route runs on today's service day
    pub is_active_today: bool,
    /// Distinct stops served by any trip of the route
    pub stop_count: usize,
    pub trip_count: usize,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RouteListResponse {
    pub routes: Vec<RouteSummary>,
}

/// A scheduled departure, with its live estimate when one exists.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Departure {
    pub trip_id: String,
    pub route_id: String,
    pub route_short_name: String,
    pub route_color: String,
    pub route_text_color: String,
    pub headsign: Option<String>,
    /// Platform the departure leaves from
    pub stop_id: String,
    pub platform_code: Option<String>,
    /// `HH:MM:SS` as in the timetable
    pub scheduled_departure: String,
    pub estimated_departure: String,
    pub delay_seconds: Option<i32>,
    pub delay_text: Option<String>,
    pub delay_status: DelayStatus,
    pub is_realtime: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StopDepartures {
    pub stop_id: String,
    pub stop_name: String,
    pub departures: Vec<Departure>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StopSearchResult {
    pub stop_id: String,
    pub name: String,
    pub code: Option<String>,
    pub parent_station: Option<String>,
    /// [lon, lat]
    pub coordinates: Option<[f64; 2]>,
    pub upcoming_departures: Vec<Departure>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StopSearchResponse {
    pub stops: Vec<StopSearchResult>,
}

/// One stop of a trip with its schedule and live estimate.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TripStop {
    pub stop_id: String,
    pub stop_name: String,
    pub stop_sequence: Option<u32>,
    pub scheduled_arrival: String,
    pub scheduled_departure: String,
    pub estimated_arrival: String,
    pub estimated_departure: String,
    pub delay_seconds: Option<i32>,
    pub delay_text: Option<String>,
    pub delay_status: DelayStatus,
    pub is_realtime: bool,
    pub has_passed: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TripDetail {
    pub trip_id: String,
    pub route_id: String,
    pub route_short_name: String,
    pub route_color: String,
    pub headsign: Option<String>,
    pub direction_id: Option<String>,
    pub is_active_today: bool,
    /// A live update matched and carries per-stop predictions
    pub has_realtime_data: bool,
    pub delay_seconds: Option<i32>,
    pub delay_status: DelayStatus,
    pub progress: Option<TripProgress>,
    pub stops: Vec<TripStop>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LiveTrip {
    pub trip_id: String,
    pub route_id: String,
    /// Route id as reported by the live feed, which may differ from the schedule's
    pub live_route_id: Option<String>,
    pub route_short_name: String,
    pub route_color: String,
    pub headsign: Option<String>,
    pub delay_seconds: Option<i32>,
    pub delay_status: DelayStatus,
    pub progress: Option<TripProgress>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LiveTripsResponse {
    pub trips: Vec<LiveTrip>,
    /// When the live snapshot was fetched, epoch millis
    pub fetched_at: i64,
}

/// A named point drawn on a route map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StationMarker {
    pub stop_id: String,
    pub name: String,
    /// [lon, lat]
    pub coordinates: [f64; 2],
}

/// Polyline of a route with optional end markers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RouteShape {
    pub route_id: String,
    pub color: String,
    /// [lon, lat] pairs in shape order
    pub coordinates: Vec<[f64; 2]>,
    #[serde(default)]
    pub start_marker: Option<StationMarker>,
    #[serde(default)]
    pub end_marker: Option<StationMarker>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StatusResponse {
    pub agency_name: Option<String>,
    pub agency_url: Option<String>,
    /// RFC 3339
    pub schedule_loaded_at: String,
    pub routes: usize,
    pub stops: usize,
    pub trips: usize,
    /// RFC 3339
    pub live_fetched_at: String,
    pub live_feed_timestamp: Option<String>,
    pub live_trip_updates: usize,
}

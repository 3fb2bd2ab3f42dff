use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{RouteShape, StationMarker};

const DEFAULT_LINE_COLOR: &str = "666666";

/// Either payload a route map can be drawn from.
///
/// Map clients send a bare polyline or a full route shape. The variant is
/// resolved here and never travels further than [`RouteMap`].
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum RouteMapPayload {
    /// `[[lon, lat], ...]`
    Polyline(Vec<[f64; 2]>),
    Shape(RouteShape),
}

/// Canonical route map.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct RouteMap {
    pub color: String,
    pub coordinates: Vec<[f64; 2]>,
    pub markers: Vec<StationMarker>,
}

impl From<RouteMapPayload> for RouteMap {
    fn from(payload: RouteMapPayload) -> Self {
        match payload {
            RouteMapPayload::Polyline(coordinates) => RouteMap {
                color: DEFAULT_LINE_COLOR.to_string(),
                coordinates,
                markers: Vec::new(),
            },
            RouteMapPayload::Shape(shape) => RouteMap {
                color: shape.color,
                coordinates: shape.coordinates,
                markers: shape.start_marker.into_iter().chain(shape.end_marker).collect(),
            },
        }
    }
}

impl RouteMap {
    /// Points outside WGS84 ranges.
    pub fn invalid_points(&self) -> usize {
        self.coordinates
            .iter()
            .chain(self.markers.iter().map(|m| &m.coordinates))
            .filter(|[lon, lat]| !(-180.0..=180.0).contains(lon) || !(-90.0..=90.0).contains(lat))
            .count()
    }
}

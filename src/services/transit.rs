//! Read operations over one consistent pair of snapshots.
//!
//! Every operation takes the static and live snapshots once at the start,
//! so a refresh landing mid-request cannot mix two schedules in one answer.

use std::collections::HashSet;
use std::sync::Arc;

use chrono_tz::Tz;
use tracing::debug;

use crate::cache::FeedCache;
use crate::clock::ServiceNow;
use crate::gtfs::schedule::{Route, Stop, StopTime, Trip};
use crate::gtfs::{GtfsError, GtfsSchedule, LiveFeed, TripUpdate};
use crate::models::{
    Departure, LiveTrip, LiveTripsResponse, RouteShape, RouteSummary, StationMarker,
    StopDepartures, StopSearchResult, StatusResponse, TripDetail, TripStop,
};
use crate::services::estimates::{classify_delay, estimate_stop_time, format_delay, has_passed};
use crate::services::progress::calculate_progress;
use crate::services::reconcile::{match_stop_update, match_trip};

/// Departures materialized per stop search hit.
const SEARCH_DEPARTURES: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// The static schedule could not be loaded; there is nothing to answer from.
    #[error("{operation}: schedule unavailable: {source}")]
    ScheduleUnavailable {
        operation: &'static str,
        #[source]
        source: GtfsError,
    },
}

/// Query façade over the feed cache.
#[derive(Clone)]
pub struct TransitService {
    cache: Arc<FeedCache>,
    tz: Tz,
}

impl TransitService {
    pub fn new(cache: Arc<FeedCache>, tz: Tz) -> Self {
        Self { cache, tz }
    }

    fn now(&self) -> ServiceNow {
        ServiceNow::from_clock(self.cache.clock(), self.tz)
    }

    async fn schedule(&self, operation: &'static str) -> Result<Arc<GtfsSchedule>, QueryError> {
        self.cache
            .schedule()
            .await
            .map_err(|source| QueryError::ScheduleUnavailable { operation, source })
    }

    async fn snapshots(
        &self,
        operation: &'static str,
    ) -> Result<(Arc<GtfsSchedule>, Arc<LiveFeed>), QueryError> {
        self.cache
            .snapshots()
            .await
            .map_err(|source| QueryError::ScheduleUnavailable { operation, source })
    }

    /// All routes with today's activity and their stop and trip counts,
    /// sorted by short name.
    pub async fn list_routes(&self) -> Result<Vec<RouteSummary>, QueryError> {
        let schedule = self.schedule("list_routes").await?;
        let now = self.now();
        let active = schedule.active_service_ids(now.date);

        let mut routes: Vec<RouteSummary> = schedule
            .routes
            .iter()
            .map(|route| {
                let mut stops: HashSet<&str> = HashSet::new();
                let mut trip_count = 0;
                let mut is_active_today = false;
                for trip in schedule.trips_for_route(&route.route_id) {
                    trip_count += 1;
                    is_active_today |= active.contains(&trip.service_id);
                    stops.extend(
                        schedule
                            .stop_times_for_trip(&trip.trip_id)
                            .iter()
                            .map(|st| st.stop_id.as_str()),
                    );
                }

                RouteSummary {
                    route_id: route.route_id.clone(),
                    short_name: route.route_short_name.clone(),
                    long_name: route.route_long_name.clone(),
                    route_type: route.route_type.clone(),
                    color: route.color().to_string(),
                    text_color: route.text_color().to_string(),
                    is_active_today,
                    stop_count: stops.len(),
                    trip_count,
                }
            })
            .collect();

        routes.sort_by(|a, b| a.short_name.cmp(&b.short_name));
        Ok(routes)
    }

    /// Stops whose name, id or code contains `query` (case-insensitive),
    /// each with its next few departures.
    pub async fn search_stops(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<StopSearchResult>, QueryError> {
        let (schedule, live) = self.snapshots("search_stops").await?;
        let now = self.now();
        let needle = query.trim().to_lowercase();

        let results: Vec<StopSearchResult> = schedule
            .stops
            .iter()
            .filter(|stop| stop_matches(stop, &needle))
            .take(limit)
            .map(|stop| StopSearchResult {
                stop_id: stop.stop_id.clone(),
                name: stop.stop_name.clone(),
                code: stop.stop_code.clone(),
                parent_station: stop.parent_station.clone(),
                coordinates: stop.coordinates(),
                upcoming_departures: self.departures_from(
                    &schedule,
                    &live,
                    &now,
                    &stop.stop_id,
                    None,
                    SEARCH_DEPARTURES,
                ),
            })
            .collect();

        debug!(query = %query, results = results.len(), "Searched stops");
        Ok(results)
    }

    /// Departures from a stop (or from the platforms of a station) that have
    /// not left yet, earliest first. `None` when the stop is unknown.
    pub async fn upcoming_departures(
        &self,
        stop_id: &str,
        route_filter: Option<&str>,
        limit: usize,
    ) -> Result<Option<StopDepartures>, QueryError> {
        let (schedule, live) = self.snapshots("upcoming_departures").await?;
        let Some(stop) = schedule.stop(stop_id) else {
            return Ok(None);
        };
        let now = self.now();

        let departures =
            self.departures_from(&schedule, &live, &now, stop_id, route_filter, limit);
        Ok(Some(StopDepartures {
            stop_id: stop.stop_id.clone(),
            stop_name: schedule.stop_name(stop_id).to_string(),
            departures,
        }))
    }

    /// Departures at `stop_id` and its child platforms. Ties on departure
    /// time keep platform order, then trip feed order.
    fn departures_from(
        &self,
        schedule: &GtfsSchedule,
        live: &LiveFeed,
        now: &ServiceNow,
        stop_id: &str,
        route_filter: Option<&str>,
        limit: usize,
    ) -> Vec<Departure> {
        let mut served = vec![stop_id];
        served.extend(schedule.children_of(stop_id).map(|s| s.stop_id.as_str()));

        let active = schedule.active_service_ids(now.date);
        let route_filter = route_filter.map(str::to_lowercase);

        let mut upcoming: Vec<(&Trip, &StopTime)> = served
            .iter()
            .flat_map(|id| schedule.stop_times_at(id))
            .filter(|(trip, _)| active.contains(&trip.service_id))
            .filter(|(_, st)| st.departure_time.as_str() >= now.time.as_str())
            .filter(|(trip, _)| match &route_filter {
                Some(filter) => schedule
                    .route(&trip.route_id)
                    .is_some_and(|r| r.route_short_name.to_lowercase().contains(filter)),
                None => true,
            })
            .collect();

        upcoming.sort_by(|a, b| a.1.departure_time.cmp(&b.1.departure_time));
        upcoming.truncate(limit);

        upcoming
            .into_iter()
            .map(|(trip, st)| self.departure(schedule, live, trip, st))
            .collect()
    }

    fn departure(
        &self,
        schedule: &GtfsSchedule,
        live: &LiveFeed,
        trip: &Trip,
        stop_time: &StopTime,
    ) -> Departure {
        let route = schedule.route(&trip.route_id);
        let event = match_trip(&trip.trip_id, live)
            .and_then(|u| match_stop_update(u, &stop_time.stop_id, stop_time.stop_sequence))
            .and_then(|stu| stu.departure.as_ref());
        let estimate = estimate_stop_time(&stop_time.departure_time, event, self.tz);

        Departure {
            trip_id: trip.trip_id.clone(),
            route_id: trip.route_id.clone(),
            route_short_name: short_name(route, &trip.route_id),
            route_color: route.map_or(DEFAULT_COLOR, Route::color).to_string(),
            route_text_color: route.map_or(DEFAULT_TEXT_COLOR, Route::text_color).to_string(),
            headsign: trip.trip_headsign.clone(),
            stop_id: stop_time.stop_id.clone(),
            platform_code: schedule
                .stop(&stop_time.stop_id)
                .and_then(|s| s.platform_code.clone()),
            scheduled_departure: stop_time.departure_time.clone(),
            delay_text: estimate.delay_text(),
            delay_status: estimate.status(),
            delay_seconds: estimate.delay_seconds,
            is_realtime: estimate.is_realtime,
            estimated_departure: estimate.time,
        }
    }

    /// Full schedule of a trip with live estimates and progress.
    /// `None` when the trip is unknown.
    pub async fn trip_detail(&self, trip_id: &str) -> Result<Option<TripDetail>, QueryError> {
        let (schedule, live) = self.snapshots("trip_detail").await?;
        let Some(trip) = schedule.trip(trip_id) else {
            return Ok(None);
        };
        let now = self.now();
        let route = schedule.route(&trip.route_id);
        let stop_times = schedule.stop_times_for_trip(&trip.trip_id);
        let update = match_trip(&trip.trip_id, &live);

        let stops = stop_times
            .iter()
            .map(|st| self.trip_stop(&schedule, update, st, &now))
            .collect();
        let progress = calculate_progress(&schedule, stop_times, update, now.epoch_secs());
        let delay_seconds = update.and_then(trip_delay);

        Ok(Some(TripDetail {
            trip_id: trip.trip_id.clone(),
            route_id: trip.route_id.clone(),
            route_short_name: short_name(route, &trip.route_id),
            route_color: route.map_or(DEFAULT_COLOR, Route::color).to_string(),
            headsign: trip.trip_headsign.clone(),
            direction_id: trip.direction_id.clone(),
            is_active_today: schedule
                .active_service_ids(now.date)
                .contains(&trip.service_id),
            has_realtime_data: has_realtime_data(update),
            delay_seconds,
            delay_status: classify_delay(delay_seconds),
            progress,
            stops,
        }))
    }

    fn trip_stop(
        &self,
        schedule: &GtfsSchedule,
        update: Option<&TripUpdate>,
        stop_time: &StopTime,
        now: &ServiceNow,
    ) -> TripStop {
        let stu = update
            .and_then(|u| match_stop_update(u, &stop_time.stop_id, stop_time.stop_sequence));
        let arrival = estimate_stop_time(
            &stop_time.arrival_time,
            stu.and_then(|s| s.arrival.as_ref()),
            self.tz,
        );
        let departure = estimate_stop_time(
            &stop_time.departure_time,
            stu.and_then(|s| s.departure.as_ref()),
            self.tz,
        );
        let delay_seconds = departure.delay_seconds.or(arrival.delay_seconds);

        TripStop {
            stop_id: stop_time.stop_id.clone(),
            stop_name: schedule.stop_name(&stop_time.stop_id).to_string(),
            stop_sequence: stop_time.stop_sequence,
            scheduled_arrival: stop_time.arrival_time.clone(),
            scheduled_departure: stop_time.departure_time.clone(),
            is_realtime: arrival.is_realtime || departure.is_realtime,
            estimated_arrival: arrival.time,
            estimated_departure: departure.time,
            delay_seconds,
            delay_text: delay_seconds.map(format_delay),
            delay_status: classify_delay(delay_seconds),
            has_passed: has_passed(stop_time, now),
        }
    }

    /// Trips running today that have live per-stop data.
    ///
    /// `route_filter` matches a route id or short name exactly. Progress is
    /// absent when the trip has no static stop times to walk.
    pub async fn live_trips(
        &self,
        route_filter: Option<&str>,
        limit: usize,
    ) -> Result<LiveTripsResponse, QueryError> {
        let (schedule, live) = self.snapshots("live_trips").await?;
        let now = self.now();
        let active = schedule.active_service_ids(now.date);

        let mut trips = Vec::new();
        for trip in schedule.trips.iter() {
            if trips.len() >= limit {
                break;
            }
            if !active.contains(&trip.service_id) {
                continue;
            }
            let route = schedule.route(&trip.route_id);
            if let Some(filter) = route_filter {
                let matches = trip.route_id == filter
                    || route.is_some_and(|r| r.route_short_name == filter);
                if !matches {
                    continue;
                }
            }
            let Some(update) = match_trip(&trip.trip_id, &live) else {
                continue;
            };
            if !has_realtime_data(Some(update)) {
                continue;
            }
            let stop_times = schedule.stop_times_for_trip(&trip.trip_id);
            let progress =
                calculate_progress(&schedule, stop_times, Some(update), now.epoch_secs());

            let delay_seconds = trip_delay(update);
            trips.push(LiveTrip {
                trip_id: trip.trip_id.clone(),
                route_id: trip.route_id.clone(),
                live_route_id: update.route_id.clone(),
                route_short_name: short_name(route, &trip.route_id),
                route_color: route.map_or(DEFAULT_COLOR, Route::color).to_string(),
                headsign: trip.trip_headsign.clone(),
                delay_seconds,
                delay_status: classify_delay(delay_seconds),
                progress,
            });
        }

        debug!(
            live_updates = live.trip_updates.len(),
            trips = trips.len(),
            "Listed live trips"
        );
        Ok(LiveTripsResponse {
            trips,
            fetched_at: live.fetched_at_millis(),
        })
    }

    /// Polyline of a route plus start and end markers.
    ///
    /// The shape is the one referenced by the first of the route's trips that
    /// has a shape id. Markers default to the first and last stop of that
    /// trip. `None` when the route is unknown; a route without a shape gets
    /// an empty polyline.
    pub async fn route_shape(
        &self,
        route_id: &str,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<Option<RouteShape>, QueryError> {
        let schedule = self.schedule("route_shape").await?;
        let Some(route) = schedule.route(route_id) else {
            return Ok(None);
        };

        let shape_trip = schedule
            .trips_for_route(route_id)
            .find(|t| t.shape_id.is_some());

        let coordinates: Vec<[f64; 2]> = shape_trip
            .and_then(|t| t.shape_id.as_deref())
            .map(|shape_id| {
                schedule
                    .shape_points(shape_id)
                    .iter()
                    .filter_map(|p| Some([p.shape_pt_lon?, p.shape_pt_lat?]))
                    .collect()
            })
            .unwrap_or_default();

        let trip_stops = shape_trip
            .map(|t| schedule.stop_times_for_trip(&t.trip_id))
            .unwrap_or_default();
        let start = start.or_else(|| trip_stops.first().map(|st| st.stop_id.as_str()));
        let end = end.or_else(|| trip_stops.last().map(|st| st.stop_id.as_str()));

        Ok(Some(RouteShape {
            route_id: route.route_id.clone(),
            color: route.color().to_string(),
            coordinates,
            start_marker: start.and_then(|id| resolve_marker(&schedule, id)),
            end_marker: end.and_then(|id| resolve_marker(&schedule, id)),
        }))
    }

    /// Snapshot ages and sizes.
    pub async fn status(&self) -> Result<StatusResponse, QueryError> {
        let (schedule, live) = self.snapshots("status").await?;
        let agency = schedule.agency();

        Ok(StatusResponse {
            agency_name: agency.map(|a| a.agency_name.clone()),
            agency_url: agency.map(|a| a.agency_url.clone()),
            schedule_loaded_at: schedule.loaded_at.to_rfc3339(),
            routes: schedule.routes.len(),
            stops: schedule.stops.len(),
            trips: schedule.trips.len(),
            live_fetched_at: live.fetched_at.to_rfc3339(),
            live_feed_timestamp: live.feed_timestamp.map(|t| t.to_rfc3339()),
            live_trip_updates: live.trip_updates.len(),
        })
    }
}

const DEFAULT_COLOR: &str = "666666";
const DEFAULT_TEXT_COLOR: &str = "FFFFFF";

fn short_name(route: Option<&Route>, route_id: &str) -> String {
    route
        .map(|r| r.route_short_name.as_str())
        .filter(|name| !name.is_empty())
        .unwrap_or(route_id)
        .to_string()
}

fn stop_matches(stop: &Stop, needle: &str) -> bool {
    stop.stop_name.to_lowercase().contains(needle)
        || stop.stop_id.to_lowercase().contains(needle)
        || stop
            .stop_code
            .as_deref()
            .is_some_and(|code| code.to_lowercase().contains(needle))
}

fn has_realtime_data(update: Option<&TripUpdate>) -> bool {
    update.is_some_and(|u| !u.stop_time_updates.is_empty())
}

/// Trip-level delay, or the first per-stop delay the feed gives.
fn trip_delay(update: &TripUpdate) -> Option<i32> {
    update.delay.or_else(|| {
        update.stop_time_updates.iter().find_map(|stu| {
            stu.arrival
                .as_ref()
                .and_then(|e| e.delay)
                .or_else(|| stu.departure.as_ref().and_then(|e| e.delay))
        })
    })
}

/// Resolve a stop id to a drawable marker.
///
/// Tried in order: the stop itself, the first of its child platforms with
/// coordinates, its parent station.
fn resolve_marker(schedule: &GtfsSchedule, stop_id: &str) -> Option<StationMarker> {
    let direct = schedule.stop(stop_id);

    let located = direct
        .filter(|s| s.coordinates().is_some())
        .or_else(|| {
            schedule
                .children_of(stop_id)
                .find(|s| s.coordinates().is_some())
        })
        .or_else(|| {
            direct
                .and_then(|s| s.parent_station.as_deref())
                .and_then(|parent| schedule.stop(parent))
                .filter(|s| s.coordinates().is_some())
        })?;

    Some(StationMarker {
        stop_id: located.stop_id.clone(),
        name: schedule.stop_name(&located.stop_id).to_string(),
        coordinates: located.coordinates()?,
    })
}

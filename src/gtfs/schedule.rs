//! Static schedule snapshot.
//!
//! Rows are kept as delivered by the feed (times and dates stay text).
//! A [`GtfsSchedule`] is never mutated after construction; a refresh builds
//! a new one and swaps it in.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use serde::Deserialize;

const DEFAULT_ROUTE_COLOR: &str = "666666";
const DEFAULT_ROUTE_TEXT_COLOR: &str = "FFFFFF";

/// A GTFS agency (from agency.txt).
#[derive(Debug, Clone, Deserialize)]
pub struct Agency {
    pub agency_name: String,
    pub agency_url: String,
}

/// A GTFS route (from routes.txt).
#[derive(Debug, Clone, Deserialize)]
pub struct Route {
    pub route_id: String,
    #[serde(default)]
    pub route_short_name: String,
    #[serde(default)]
    pub route_long_name: String,
    #[serde(default)]
    pub route_type: String,
    #[serde(default)]
    pub route_color: Option<String>,
    #[serde(default)]
    pub route_text_color: Option<String>,
}

impl Route {
    /// Hex color without the leading `#`, gray when the feed leaves it out.
    pub fn color(&self) -> &str {
        self.route_color.as_deref().unwrap_or(DEFAULT_ROUTE_COLOR)
    }

    pub fn text_color(&self) -> &str {
        self.route_text_color
            .as_deref()
            .unwrap_or(DEFAULT_ROUTE_TEXT_COLOR)
    }
}

/// A GTFS stop (from stops.txt).
///
/// Stations and platforms share this table: a platform points at its
/// station through `parent_station`. There is no deeper nesting.
#[derive(Debug, Clone, Deserialize)]
pub struct Stop {
    pub stop_id: String,
    #[serde(default)]
    pub stop_name: String,
    #[serde(default)]
    pub stop_code: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub stop_lat: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub stop_lon: Option<f64>,
    #[serde(default)]
    pub parent_station: Option<String>,
    #[serde(default)]
    pub platform_code: Option<String>,
}

impl Stop {
    /// Coordinates in [lon, lat] order (GeoJSON).
    pub fn coordinates(&self) -> Option<[f64; 2]> {
        Some([self.stop_lon?, self.stop_lat?])
    }
}

/// A GTFS trip (from trips.txt).
#[derive(Debug, Clone, Deserialize)]
pub struct Trip {
    pub route_id: String,
    pub service_id: String,
    pub trip_id: String,
    #[serde(default)]
    pub trip_headsign: Option<String>,
    #[serde(default)]
    pub direction_id: Option<String>,
    #[serde(default)]
    pub shape_id: Option<String>,
}

/// A GTFS stop time (from stop_times.txt).
///
/// Times are `HH:MM:SS` text and may run past `24:00:00` for service after
/// midnight. They are compared as text, never as wall-clock values.
#[derive(Debug, Clone, Deserialize)]
pub struct StopTime {
    pub trip_id: String,
    #[serde(default)]
    pub arrival_time: String,
    #[serde(default)]
    pub departure_time: String,
    pub stop_id: String,
    /// Absent when the feed value does not parse.
    #[serde(deserialize_with = "csv::invalid_option")]
    pub stop_sequence: Option<u32>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub shape_dist_traveled: Option<f64>,
}

/// A weekly service pattern (from calendar.txt).
#[derive(Debug, Clone, Deserialize)]
pub struct Calendar {
    pub service_id: String,
    pub monday: String,
    pub tuesday: String,
    pub wednesday: String,
    pub thursday: String,
    pub friday: String,
    pub saturday: String,
    pub sunday: String,
    pub start_date: String,
    pub end_date: String,
}

impl Calendar {
    /// Whether the weekly pattern covers `date`.
    pub fn runs_on(&self, date: NaiveDate) -> bool {
        let key = date_key(date);
        if key < self.start_date || key > self.end_date {
            return false;
        }
        let flag = match date.weekday() {
            Weekday::Mon => &self.monday,
            Weekday::Tue => &self.tuesday,
            Weekday::Wed => &self.wednesday,
            Weekday::Thu => &self.thursday,
            Weekday::Fri => &self.friday,
            Weekday::Sat => &self.saturday,
            Weekday::Sun => &self.sunday,
        };
        flag == "1"
    }
}

/// A single-day exception (from calendar_dates.txt).
#[derive(Debug, Clone, Deserialize)]
pub struct CalendarDate {
    pub service_id: String,
    pub date: String,
    /// "1" = service added, "2" = service removed
    pub exception_type: String,
}

/// One vertex of a shape polyline (from shapes.txt).
#[derive(Debug, Clone, Deserialize)]
pub struct ShapePoint {
    pub shape_id: String,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub shape_pt_lat: Option<f64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub shape_pt_lon: Option<f64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub shape_pt_sequence: Option<u32>,
}

/// Flat tables as produced by a static loader.
#[derive(Debug, Default)]
pub struct ScheduleTables {
    pub agencies: Vec<Agency>,
    pub routes: Vec<Route>,
    pub stops: Vec<Stop>,
    pub trips: Vec<Trip>,
    pub stop_times: Vec<StopTime>,
    pub calendars: Vec<Calendar>,
    pub calendar_dates: Vec<CalendarDate>,
    pub shapes: Vec<ShapePoint>,
}

/// Immutable static schedule snapshot.
///
/// Tables keep source order (so "first" means first in the feed) and are
/// indexed by id. When an id repeats, the first row wins.
pub struct GtfsSchedule {
    pub agencies: Vec<Agency>,
    pub routes: Vec<Route>,
    pub stops: Vec<Stop>,
    pub trips: Vec<Trip>,
    pub calendars: Vec<Calendar>,
    pub calendar_dates: Vec<CalendarDate>,
    /// trip_id -> stop times ordered by stop_sequence
    stop_times: HashMap<String, Vec<StopTime>>,
    /// shape_id -> points ordered by shape_pt_sequence
    shapes: HashMap<String, Vec<ShapePoint>>,
    /// stop_id -> (trip index, position in that trip's stop times), trips in feed order
    stop_visits: HashMap<String, Vec<(usize, usize)>>,
    /// parent_station -> child stop indexes in feed order
    children: HashMap<String, Vec<usize>>,
    route_index: HashMap<String, usize>,
    stop_index: HashMap<String, usize>,
    trip_index: HashMap<String, usize>,
    pub loaded_at: DateTime<Utc>,
    /// Active service ids, computed once for the first date asked about.
    active_services: OnceLock<(NaiveDate, Arc<HashSet<String>>)>,
}

impl GtfsSchedule {
    pub fn new(tables: ScheduleTables, loaded_at: DateTime<Utc>) -> Self {
        let ScheduleTables {
            agencies,
            routes,
            stops,
            trips,
            stop_times,
            calendars,
            calendar_dates,
            shapes,
        } = tables;

        let route_index = index_by(&routes, |r| &r.route_id);
        let stop_index = index_by(&stops, |s| &s.stop_id);
        let trip_index = index_by(&trips, |t| &t.trip_id);

        let mut by_trip: HashMap<String, Vec<StopTime>> = HashMap::new();
        for st in stop_times {
            by_trip.entry(st.trip_id.clone()).or_default().push(st);
        }
        // Stable sort: rows without a usable sequence keep feed order at the end
        for sts in by_trip.values_mut() {
            sts.sort_by_key(|st| (st.stop_sequence.is_none(), st.stop_sequence));
        }

        let mut stop_visits: HashMap<String, Vec<(usize, usize)>> = HashMap::new();
        for (trip_idx, trip) in trips.iter().enumerate() {
            // A repeated trip id keeps its first row, as in trip_index
            if trip_index.get(&trip.trip_id) != Some(&trip_idx) {
                continue;
            }
            for (position, st) in by_trip.get(&trip.trip_id).into_iter().flatten().enumerate() {
                stop_visits
                    .entry(st.stop_id.clone())
                    .or_default()
                    .push((trip_idx, position));
            }
        }

        let mut children: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, stop) in stops.iter().enumerate() {
            if let Some(parent) = &stop.parent_station {
                children.entry(parent.clone()).or_default().push(i);
            }
        }

        let mut by_shape: HashMap<String, Vec<ShapePoint>> = HashMap::new();
        for pt in shapes {
            by_shape.entry(pt.shape_id.clone()).or_default().push(pt);
        }
        for pts in by_shape.values_mut() {
            pts.sort_by_key(|p| (p.shape_pt_sequence.is_none(), p.shape_pt_sequence));
        }

        Self {
            agencies,
            routes,
            stops,
            trips,
            calendars,
            calendar_dates,
            stop_times: by_trip,
            shapes: by_shape,
            stop_visits,
            children,
            route_index,
            stop_index,
            trip_index,
            loaded_at,
            active_services: OnceLock::new(),
        }
    }

    /// The feed's agency. Only the first one is used when several exist.
    pub fn agency(&self) -> Option<&Agency> {
        self.agencies.first()
    }

    pub fn route(&self, route_id: &str) -> Option<&Route> {
        self.route_index.get(route_id).map(|&i| &self.routes[i])
    }

    pub fn stop(&self, stop_id: &str) -> Option<&Stop> {
        self.stop_index.get(stop_id).map(|&i| &self.stops[i])
    }

    pub fn trip(&self, trip_id: &str) -> Option<&Trip> {
        self.trip_index.get(trip_id).map(|&i| &self.trips[i])
    }

    /// Stop times of a trip, ordered by stop_sequence.
    pub fn stop_times_for_trip(&self, trip_id: &str) -> &[StopTime] {
        self.stop_times
            .get(trip_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Points of a shape, ordered by shape_pt_sequence.
    pub fn shape_points(&self, shape_id: &str) -> &[ShapePoint] {
        self.shapes
            .get(shape_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Display name of a stop, falling back to its id.
    pub fn stop_name<'a>(&'a self, stop_id: &'a str) -> &'a str {
        match self.stop(stop_id) {
            Some(stop) if !stop.stop_name.is_empty() => &stop.stop_name,
            _ => stop_id,
        }
    }

    /// Platforms whose parent station is `station_id`, in feed order.
    pub fn children_of(&self, station_id: &str) -> impl Iterator<Item = &Stop> + '_ {
        self.children
            .get(station_id)
            .into_iter()
            .flatten()
            .map(|&i| &self.stops[i])
    }

    /// Stop times served at `stop_id` with their trips, trips in feed order.
    pub fn stop_times_at(&self, stop_id: &str) -> impl Iterator<Item = (&Trip, &StopTime)> + '_ {
        self.stop_visits
            .get(stop_id)
            .into_iter()
            .flatten()
            .filter_map(|&(trip_idx, position)| {
                let trip = &self.trips[trip_idx];
                let stop_time = self.stop_times.get(&trip.trip_id)?.get(position)?;
                Some((trip, stop_time))
            })
    }

    /// Trips of a route in feed order.
    pub fn trips_for_route<'a>(&'a self, route_id: &'a str) -> impl Iterator<Item = &'a Trip> + 'a {
        self.trips.iter().filter(move |t| t.route_id == route_id)
    }

    /// Check if a service runs on the given date.
    ///
    /// calendar_dates exceptions override the weekly calendar.
    pub fn is_service_active(&self, service_id: &str, date: NaiveDate) -> bool {
        let key = date_key(date);
        if let Some(exception) = self
            .calendar_dates
            .iter()
            .find(|cd| cd.service_id == service_id && cd.date == key)
        {
            return exception.exception_type == "1";
        }

        self.calendars
            .iter()
            .find(|c| c.service_id == service_id)
            .is_some_and(|c| c.runs_on(date))
    }

    /// All service ids running on `date`.
    ///
    /// The first date requested is memoized for the life of this snapshot;
    /// other dates are computed on demand.
    pub fn active_service_ids(&self, date: NaiveDate) -> Arc<HashSet<String>> {
        if let Some((memo_date, ids)) = self.active_services.get() {
            if *memo_date == date {
                return ids.clone();
            }
            return Arc::new(self.compute_active_services(date));
        }

        let ids = Arc::new(self.compute_active_services(date));
        let (memo_date, memo) = self.active_services.get_or_init(|| (date, ids.clone()));
        if *memo_date == date {
            memo.clone()
        } else {
            ids
        }
    }

    fn compute_active_services(&self, date: NaiveDate) -> HashSet<String> {
        let mut service_ids: HashSet<&str> = self
            .calendars
            .iter()
            .map(|c| c.service_id.as_str())
            .collect();
        service_ids.extend(self.calendar_dates.iter().map(|cd| cd.service_id.as_str()));

        service_ids
            .into_iter()
            .filter(|id| self.is_service_active(id, date))
            .map(str::to_string)
            .collect()
    }
}

fn index_by<T>(rows: &[T], key: impl Fn(&T) -> &String) -> HashMap<String, usize> {
    let mut index = HashMap::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        index.entry(key(row).clone()).or_insert(i);
    }
    index
}

/// Format a date as GTFS `YYYYMMDD` text.
pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Parse GTFS time string "HH:MM:SS" to seconds since midnight.
/// Hours may exceed 23 for trips running past midnight.
pub fn parse_gtfs_time(time_str: &str) -> Option<i64> {
    let mut parts = time_str.trim().split(':');
    let hours: i64 = parts.next()?.parse().ok()?;
    let minutes: i64 = parts.next()?.parse().ok()?;
    let seconds: i64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || minutes >= 60 || seconds >= 60 || hours < 0 {
        return None;
    }
    Some(hours * 3600 + minutes * 60 + seconds)
}

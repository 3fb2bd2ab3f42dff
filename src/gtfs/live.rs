//! Live feed snapshot.
//!
//! Decoded GTFS-Realtime trip updates reduced to the fields the engine
//! reads. Trip ids here are short: each is a suffix of a static trip id.

use chrono::{DateTime, Utc};

/// Predicted arrival or departure at one stop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StopTimeEvent {
    /// Absolute prediction, POSIX seconds.
    pub time: Option<i64>,
    /// Offset from the schedule in seconds (positive = late).
    pub delay: Option<i32>,
}

impl StopTimeEvent {
    /// Whether the event carries anything usable.
    pub fn is_populated(&self) -> bool {
        self.time.is_some() || self.delay.is_some()
    }
}

/// Realtime update for one stop of a trip.
///
/// Feeds populate `stop_id`, `stop_sequence`, or both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StopTimeUpdate {
    pub stop_id: Option<String>,
    pub stop_sequence: Option<u32>,
    pub arrival: Option<StopTimeEvent>,
    pub departure: Option<StopTimeEvent>,
}

/// Realtime update for one trip.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TripUpdate {
    /// Short trip id as carried by the feed.
    pub trip_id: String,
    pub route_id: Option<String>,
    /// Trip-level delay in seconds.
    pub delay: Option<i32>,
    pub stop_time_updates: Vec<StopTimeUpdate>,
}

/// Immutable live feed snapshot.
#[derive(Debug, Clone)]
pub struct LiveFeed {
    pub trip_updates: Vec<TripUpdate>,
    /// When this snapshot was fetched (or degraded to empty).
    pub fetched_at: DateTime<Utc>,
    /// Feed header timestamp of the newest feed, if any.
    pub feed_timestamp: Option<DateTime<Utc>>,
}

impl LiveFeed {
    /// The snapshot served when no feed could be fetched.
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            trip_updates: Vec::new(),
            fetched_at: now,
            feed_timestamp: None,
        }
    }

    pub fn fetched_at_millis(&self) -> i64 {
        self.fetched_at.timestamp_millis()
    }
}

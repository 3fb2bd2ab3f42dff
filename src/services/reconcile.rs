//! Pairing live updates with static schedule rows.
//!
//! The live feed never carries full static trip ids, only a trailing part of
//! them. Matching is therefore by suffix, and the first live update in feed
//! order wins. Feeds are not checked for duplicate trips.

use crate::gtfs::{LiveFeed, StopTimeUpdate, TripUpdate};

/// Find the live update for a static trip.
///
/// Returns the first update whose (non-empty) trip id is a suffix of
/// `static_trip_id`. Equal ids count as a suffix.
pub fn match_trip<'a>(static_trip_id: &str, live: &'a LiveFeed) -> Option<&'a TripUpdate> {
    live.trip_updates
        .iter()
        .find(|update| !update.trip_id.is_empty() && static_trip_id.ends_with(&update.trip_id))
}

/// Find the live update for one stop of a trip.
///
/// Stop id and stop sequence are alternative keys: whichever matches first
/// in the update list wins. An absent key on either side never matches.
pub fn match_stop_update<'a>(
    trip_update: &'a TripUpdate,
    stop_id: &str,
    stop_sequence: Option<u32>,
) -> Option<&'a StopTimeUpdate> {
    trip_update.stop_time_updates.iter().find(|stu| {
        stu.stop_id.as_deref() == Some(stop_id)
            || (stop_sequence.is_some() && stu.stop_sequence == stop_sequence)
    })
}

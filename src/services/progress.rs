//! Where a trip is along its stops.

use serde::Serialize;
use utoipa::ToSchema;

use crate::gtfs::{GtfsSchedule, StopTime, StopTimeEvent, TripUpdate};
use crate::services::reconcile::match_stop_update;

/// Position of a live trip between two of its stops.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct TripProgress {
    pub current_stop_index: usize,
    pub next_stop_index: usize,
    pub current_stop: String,
    pub next_stop: String,
    /// 0..=100, by distance travelled when the feed has it, else by stop count
    pub progress_percent: u8,
}

/// Compute how far along its stops a trip is.
///
/// `stop_times` must be ordered by stop sequence. Returns `None` when there
/// is no live update or it carries no per-stop updates.
///
/// Stops are walked in order. A stop whose live departure is in the past
/// moves the current stop to the one after it; a stop whose live arrival is
/// in the past becomes the current stop and ends the walk.
pub fn calculate_progress(
    schedule: &GtfsSchedule,
    stop_times: &[StopTime],
    trip_update: Option<&TripUpdate>,
    now_epoch: i64,
) -> Option<TripProgress> {
    let trip_update = trip_update.filter(|u| !u.stop_time_updates.is_empty())?;
    let last = stop_times.len().checked_sub(1)?;

    let in_past = |event: Option<&StopTimeEvent>| {
        event
            .and_then(|e| e.time)
            .is_some_and(|time| time < now_epoch)
    };

    let mut current = 0;
    for (i, stop_time) in stop_times.iter().enumerate() {
        let Some(stu) = match_stop_update(trip_update, &stop_time.stop_id, stop_time.stop_sequence)
        else {
            continue;
        };
        if in_past(stu.departure.as_ref()) {
            current = (i + 1).min(last);
        }
        if in_past(stu.arrival.as_ref()) {
            current = i;
            break;
        }
    }
    let next = (current + 1).min(last);

    let percent = distance_percent(stop_times, current, last)
        .unwrap_or_else(|| index_percent(current, stop_times.len()));

    Some(TripProgress {
        current_stop_index: current,
        next_stop_index: next,
        current_stop: schedule.stop_name(&stop_times[current].stop_id).to_string(),
        next_stop: schedule.stop_name(&stop_times[next].stop_id).to_string(),
        progress_percent: percent.clamp(0.0, 100.0).round() as u8,
    })
}

fn distance_percent(stop_times: &[StopTime], current: usize, last: usize) -> Option<f64> {
    let start = stop_times[0].shape_dist_traveled?;
    let end = stop_times[last].shape_dist_traveled?;
    let here = stop_times[current].shape_dist_traveled?;
    if end == start {
        return None;
    }
    Some((here - start) / (end - start) * 100.0)
}

fn index_percent(current: usize, stop_count: usize) -> f64 {
    if stop_count <= 1 {
        return 0.0;
    }
    current as f64 / (stop_count - 1) as f64 * 100.0
}

//! Per-stop estimates and delay presentation.

use chrono_tz::Tz;
use serde::Serialize;
use utoipa::ToSchema;

use crate::clock::{format_day_seconds_hm, format_epoch_hm, ServiceNow};
use crate::gtfs::schedule::parse_gtfs_time;
use crate::gtfs::{StopTime, StopTimeEvent};

/// How a trip or stop is running against the schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DelayStatus {
    /// No realtime information.
    Scheduled,
    OnTime,
    Late,
    Early,
}

/// Estimated time at one stop.
#[derive(Debug, Clone, PartialEq)]
pub struct StopTimeEstimate {
    /// `HH:MM` when realtime, otherwise the scheduled `HH:MM:SS` as delivered.
    pub time: String,
    pub delay_seconds: Option<i32>,
    pub is_realtime: bool,
}

impl StopTimeEstimate {
    fn scheduled(scheduled: &str) -> Self {
        Self {
            time: scheduled.to_string(),
            delay_seconds: None,
            is_realtime: false,
        }
    }

    pub fn delay_text(&self) -> Option<String> {
        self.delay_seconds.map(format_delay)
    }

    pub fn status(&self) -> DelayStatus {
        classify_delay(self.delay_seconds)
    }
}

/// Estimate the time at a stop from its scheduled time and matched live event.
///
/// An absolute predicted time wins over a delay offset. Without either, the
/// scheduled time is returned unchanged.
pub fn estimate_stop_time(scheduled: &str, event: Option<&StopTimeEvent>, tz: Tz) -> StopTimeEstimate {
    let Some(event) = event.filter(|e| e.is_populated()) else {
        return StopTimeEstimate::scheduled(scheduled);
    };

    if let Some(time) = event.time.and_then(|t| format_epoch_hm(t, tz)) {
        return StopTimeEstimate {
            time,
            delay_seconds: event.delay,
            is_realtime: true,
        };
    }

    match (event.delay, parse_gtfs_time(scheduled)) {
        (Some(delay), Some(seconds)) => StopTimeEstimate {
            time: format_day_seconds_hm(seconds + i64::from(delay)),
            delay_seconds: Some(delay),
            is_realtime: true,
        },
        // Unreadable schedule text: nothing to offset from
        _ => StopTimeEstimate::scheduled(scheduled),
    }
}

/// Map a delay to its status. `None` means there is no realtime data.
pub fn classify_delay(delay_seconds: Option<i32>) -> DelayStatus {
    match delay_seconds {
        None => DelayStatus::Scheduled,
        Some(0) => DelayStatus::OnTime,
        Some(d) if d > 0 => DelayStatus::Late,
        Some(_) => DelayStatus::Early,
    }
}

/// Human form of a delay, e.g. "2m 5s late".
pub fn format_delay(delay_seconds: i32) -> String {
    if delay_seconds == 0 {
        return "On time".to_string();
    }
    let magnitude = delay_seconds.unsigned_abs();
    let direction = if delay_seconds > 0 { "late" } else { "early" };
    format!("{}m {}s {}", magnitude / 60, magnitude % 60, direction)
}

/// Whether the scheduled departure is already behind the service clock.
///
/// Text comparison of `HH:MM:SS`. Across midnight this is wrong in both
/// directions: once the clock wraps to "00:..", neither a "23:50:00"
/// departure nor a post-midnight "24:10:00" one ever reads as passed.
pub fn has_passed(stop_time: &StopTime, now: &ServiceNow) -> bool {
    stop_time.departure_time.as_str() < now.time.as_str()
}

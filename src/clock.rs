//! Clock and service-timezone provider.
//!
//! The engine never reads host-local time. Every "now" goes through a
//! [`Clock`] and is projected into the service timezone with [`ServiceNow`].

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock of the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// "Now" as seen in the service timezone.
#[derive(Debug, Clone)]
pub struct ServiceNow {
    pub instant: DateTime<Utc>,
    /// Service-local calendar date.
    pub date: NaiveDate,
    /// Service-local wall clock as `HH:MM:SS`, comparable with GTFS times as text.
    pub time: String,
}

impl ServiceNow {
    pub fn at(instant: DateTime<Utc>, tz: Tz) -> Self {
        let local = instant.with_timezone(&tz);
        Self {
            instant,
            date: local.date_naive(),
            time: local.format("%H:%M:%S").to_string(),
        }
    }

    pub fn from_clock(clock: &dyn Clock, tz: Tz) -> Self {
        Self::at(clock.now(), tz)
    }

    pub fn epoch_secs(&self) -> i64 {
        self.instant.timestamp()
    }
}

/// Render POSIX seconds as service-local `HH:MM`.
pub fn format_epoch_hm(epoch_secs: i64, tz: Tz) -> Option<String> {
    let instant = DateTime::from_timestamp(epoch_secs, 0)?;
    Some(instant.with_timezone(&tz).format("%H:%M").to_string())
}

/// Render seconds since service-day midnight as `HH:MM` wall clock.
///
/// Values past 24h wrap onto the next day's clock face.
pub fn format_day_seconds_hm(seconds: i64) -> String {
    let seconds = seconds.rem_euclid(86_400);
    format!("{:02}:{:02}", seconds / 3600, (seconds % 3600) / 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::America::New_York;

    #[test]
    fn test_service_now_uses_eastern_date_and_time() {
        // 01:31 UTC on the 21st is still the evening of the 20th in New York (EDT)
        let instant = Utc.with_ymd_and_hms(2026, 10, 21, 1, 31, 0).unwrap();
        let now = ServiceNow::at(instant, New_York);
        assert_eq!(now.date, NaiveDate::from_ymd_opt(2026, 10, 20).unwrap());
        assert_eq!(now.time, "21:31:00");
    }

    #[test]
    fn test_service_now_winter_offset() {
        let instant = Utc.with_ymd_and_hms(2026, 1, 15, 13, 5, 9).unwrap();
        let now = ServiceNow::at(instant, New_York);
        assert_eq!(now.time, "08:05:09");
    }

    #[test]
    fn test_format_epoch_hm() {
        let epoch = New_York
            .with_ymd_and_hms(2026, 10, 20, 21, 33, 40)
            .unwrap()
            .timestamp();
        assert_eq!(format_epoch_hm(epoch, New_York).as_deref(), Some("21:33"));
    }

    #[test]
    fn test_format_day_seconds_wraps_past_midnight() {
        assert_eq!(format_day_seconds_hm(30_600), "08:30");
        assert_eq!(format_day_seconds_hm(91_800), "01:30");
        assert_eq!(format_day_seconds_hm(-60), "23:59");
    }
}

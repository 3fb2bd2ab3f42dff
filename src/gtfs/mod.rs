pub mod error;
pub mod live;
pub mod schedule;

pub use error::GtfsError;
pub use live::{LiveFeed, StopTimeEvent, StopTimeUpdate, TripUpdate};
pub use schedule::{GtfsSchedule, ScheduleTables, StopTime};

pub mod realtime_feed;
pub mod static_feed;

pub use realtime_feed::GtfsRealtimeProvider;
pub use static_feed::{GtfsStaticProvider, ScheduleLocation};

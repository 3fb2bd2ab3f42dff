//! Shared fixtures for unit tests.
//!
//! The schedule is a trimmed slice of the NYCT subway feed, parsed through
//! the real CSV loader. "Now" is Tuesday 2026-10-20 21:31:00 Eastern.

use std::collections::BTreeMap;
use std::io::Read;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::America::New_York;
use futures::future::BoxFuture;

use crate::cache::{CachePolicy, FeedCache, LiveLoader, ScheduleLoader};
use crate::clock::Clock;
use crate::gtfs::schedule::ScheduleTables;
use crate::gtfs::{GtfsError, GtfsSchedule, LiveFeed, StopTimeEvent, StopTimeUpdate, TripUpdate};
use crate::providers::static_feed::{read_tables, TableSource};
use crate::services::TransitService;

pub const SAMPLE_TABLES: &[(&str, &str)] = &[
    (
        "agency.txt",
        "agency_id,agency_name,agency_url,agency_timezone
MTA NYCT,MTA New York City Transit,http://www.mta.info,America/New_York
MTA MNR,Metro-North Railroad,http://www.mta.info/mnr,America/New_York
",
    ),
    (
        "routes.txt",
        "route_id,agency_id,route_short_name,route_long_name,route_type,route_color,route_text_color
A,MTA NYCT,A,8 Avenue Express,1,0039A6,FFFFFF
1,MTA NYCT,1,Broadway - 7 Avenue Local,1,EE352E,
GS,MTA NYCT,S,42 St Shuttle,1,,
Z,MTA NYCT,Z,Nassau St Express,1,996633,FFFFFF
",
    ),
    (
        "stops.txt",
        "stop_id,stop_code,stop_name,stop_lat,stop_lon,location_type,parent_station,platform_code
101,,Van Cortlandt Park-242 St,40.889248,-73.898583,1,,
101N,,Van Cortlandt Park-242 St,40.889248,-73.898583,0,101,N
101S,,Van Cortlandt Park-242 St,40.889248,-73.898583,0,101,S
103,,238 St,40.884667,-73.90087,1,,
103N,,238 St,40.884667,-73.90087,0,103,N
104,,231 St,40.878856,-73.904834,1,,
104N,,231 St,,,0,104,N
A02,,Inwood-207 St,40.868072,-73.919899,1,,
A02S,,Inwood-207 St,40.868072,-73.919899,0,A02,S
A03,,Dyckman St,,,1,,
A03S,,Dyckman St,40.865491,-73.927271,0,A03,S
901,G901,Grand Central-42 St,40.752769,-73.979189,0,,
902,G902,Times Sq-42 St,not-a-number,-73.986229,0,,
",
    ),
    (
        "trips.txt",
        "route_id,service_id,trip_id,trip_headsign,direction_id,shape_id
1,Weekday,ASP25GEN-1038-Weekday-00_128750_1..N03R,Van Cortlandt Park-242 St,0,1..N03R
1,Weekday,ASP25GEN-1038-Weekday-00_129900_1..N03R,Van Cortlandt Park-242 St,0,1..N03R
1,Sunday,ASP25GEN-1038-Sunday-00_128750_1..N03R,Van Cortlandt Park-242 St,0,
A,Weekday,BSP25GEN-A001-Weekday-00_130000_A..S,Far Rockaway-Mott Av,1,A..S
GS,Weekday,S20250101-Weekday-00_131000_GS.S01R,Grand Central-42 St,0,
",
    ),
    (
        "stop_times.txt",
        "trip_id,arrival_time,departure_time,stop_id,stop_sequence,shape_dist_traveled
ASP25GEN-1038-Weekday-00_128750_1..N03R,21:32:00,21:32:00,101N,5,2.0
ASP25GEN-1038-Weekday-00_128750_1..N03R,21:28:30,21:28:30,104N,1,0
ASP25GEN-1038-Weekday-00_128750_1..N03R,21:30:00,21:30:00,103N,3,1.2
ASP25GEN-1038-Weekday-00_129900_1..N03R,21:40:00,21:40:00,104N,1,
ASP25GEN-1038-Weekday-00_129900_1..N03R,21:41:30,21:41:30,103N,2,
ASP25GEN-1038-Weekday-00_129900_1..N03R,21:43:30,21:43:30,101N,x,
ASP25GEN-1038-Sunday-00_128750_1..N03R,21:28:30,21:28:30,104N,1,
ASP25GEN-1038-Sunday-00_128750_1..N03R,21:30:00,21:30:00,103N,2,
ASP25GEN-1038-Sunday-00_128750_1..N03R,21:32:00,21:32:00,101N,3,
BSP25GEN-A001-Weekday-00_130000_A..S,21:35:00,21:35:00,A02S,1,
BSP25GEN-A001-Weekday-00_130000_A..S,21:37:00,21:37:00,A03S,2,
S20250101-Weekday-00_131000_GS.S01R,22:00:00,22:00:00,901,1,
S20250101-Weekday-00_131000_GS.S01R,22:02:00,22:02:00,902,2,
",
    ),
    (
        "calendar.txt",
        "service_id,monday,tuesday,wednesday,thursday,friday,saturday,sunday,start_date,end_date
Weekday,1,1,1,1,1,0,0,20250101,20261231
Sunday,0,0,0,0,0,0,1,20250101,20261231
",
    ),
    (
        "calendar_dates.txt",
        "service_id,date,exception_type
Weekday,20261026,2
Holiday,20261126,1
",
    ),
    (
        "shapes.txt",
        "shape_id,shape_pt_lat,shape_pt_lon,shape_pt_sequence
1..N03R,40.884667,-73.90087,1
1..N03R,40.878856,-73.904834,0
1..N03R,bad,-73.9,2
1..N03R,40.889248,-73.898583,3
A..S,40.868072,-73.919899,0
A..S,40.865491,-73.927271,1
",
    ),
];

/// GTFS tables held in memory, keyed by file name.
#[derive(Debug, Clone, Default)]
pub struct MemoryTables {
    tables: BTreeMap<String, String>,
}

impl MemoryTables {
    pub fn sample() -> Self {
        Self {
            tables: SAMPLE_TABLES
                .iter()
                .map(|(name, content)| (name.to_string(), content.to_string()))
                .collect(),
        }
    }

    pub fn without(mut self, name: &str) -> Self {
        self.tables.remove(name);
        self
    }

    pub fn with(mut self, name: &str, content: &str) -> Self {
        self.tables.insert(name.to_string(), content.to_string());
        self
    }

    /// Add rows to the end of an existing table.
    pub fn append(mut self, name: &str, rows: &str) -> Self {
        self.tables.entry(name.to_string()).or_default().push_str(rows);
        self
    }
}

impl TableSource for MemoryTables {
    fn open(&mut self, name: &str) -> Result<Option<Box<dyn Read + '_>>, GtfsError> {
        Ok(self
            .tables
            .get(name)
            .map(|content| Box::new(content.as_bytes()) as Box<dyn Read + '_>))
    }
}

/// 2026-10-20 21:31:00 in New York.
pub fn test_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 21, 1, 31, 0).unwrap()
}

/// POSIX seconds of an Eastern wall-clock time on the test day.
pub fn eastern(hour: u32, minute: u32, second: u32) -> i64 {
    New_York
        .with_ymd_and_hms(2026, 10, 20, hour, minute, second)
        .unwrap()
        .timestamp()
}

pub fn sample_tables() -> ScheduleTables {
    read_tables(&mut MemoryTables::sample()).unwrap()
}

pub fn sample_schedule() -> GtfsSchedule {
    GtfsSchedule::new(sample_tables(), test_now())
}

fn stop_update(
    stop_id: Option<&str>,
    stop_sequence: Option<u32>,
    arrival: Option<StopTimeEvent>,
    departure: Option<StopTimeEvent>,
) -> StopTimeUpdate {
    StopTimeUpdate {
        stop_id: stop_id.map(str::to_string),
        stop_sequence,
        arrival,
        departure,
    }
}

fn event(time: Option<i64>, delay: Option<i32>) -> StopTimeEvent {
    StopTimeEvent { time, delay }
}

/// Live updates in feed order.
///
/// - `128750_1..N03R`: matched by stop id, arrived at 103N, 100s late.
/// - `129900_1..N03R`: matched by stop sequence, left the first stop.
/// - `999999_7..S`: matches no static trip.
/// - `130000_A..S`: no per-stop updates.
pub fn sample_trip_updates() -> Vec<TripUpdate> {
    vec![
        TripUpdate {
            trip_id: "128750_1..N03R".to_string(),
            route_id: Some("1".to_string()),
            delay: Some(100),
            stop_time_updates: vec![
                stop_update(
                    Some("103N"),
                    None,
                    Some(event(Some(eastern(21, 30, 40)), Some(40))),
                    Some(event(Some(eastern(21, 31, 40)), Some(100))),
                ),
                stop_update(
                    Some("101N"),
                    None,
                    Some(event(Some(eastern(21, 33, 40)), Some(100))),
                    Some(event(None, Some(100))),
                ),
            ],
        },
        TripUpdate {
            trip_id: "129900_1..N03R".to_string(),
            route_id: Some("1".to_string()),
            delay: Some(-390),
            stop_time_updates: vec![
                stop_update(None, Some(1), None, Some(event(Some(eastern(21, 30, 0)), Some(-600)))),
                stop_update(
                    None,
                    Some(2),
                    Some(event(Some(eastern(21, 35, 0)), Some(-390))),
                    Some(event(Some(eastern(21, 35, 30)), Some(-360))),
                ),
            ],
        },
        TripUpdate {
            trip_id: "999999_7..S".to_string(),
            route_id: Some("7".to_string()),
            delay: None,
            stop_time_updates: vec![stop_update(Some("701S"), None, None, None)],
        },
        TripUpdate {
            trip_id: "130000_A..S".to_string(),
            route_id: Some("A".to_string()),
            delay: Some(0),
            stop_time_updates: Vec::new(),
        },
    ]
}

pub fn sample_live_feed(fetched_at: DateTime<Utc>) -> LiveFeed {
    LiveFeed {
        trip_updates: sample_trip_updates(),
        fetched_at,
        feed_timestamp: Some(fetched_at),
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(now.timestamp_millis()),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        self.millis.fetch_add(by.num_milliseconds(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst)).unwrap()
    }
}

/// Serves a schedule (the sample one unless told otherwise) and counts how
/// often it was asked to.
pub struct CountingScheduleLoader {
    clock: Arc<dyn Clock>,
    tables: MemoryTables,
    loads: AtomicUsize,
}

impl CountingScheduleLoader {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_tables(clock, MemoryTables::sample())
    }

    pub fn with_tables(clock: Arc<dyn Clock>, tables: MemoryTables) -> Self {
        Self {
            clock,
            tables,
            loads: AtomicUsize::new(0),
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl ScheduleLoader for CountingScheduleLoader {
    fn load(&self) -> BoxFuture<'_, Result<GtfsSchedule, GtfsError>> {
        Box::pin(async move {
            self.loads.fetch_add(1, Ordering::SeqCst);
            // Give concurrent callers a chance to pile up on the refresh gate
            tokio::time::sleep(Duration::from_millis(10)).await;
            let tables = read_tables(&mut self.tables.clone())?;
            Ok(GtfsSchedule::new(tables, self.clock.now()))
        })
    }
}

/// Serves the sample live feed and counts how often it was asked to.
pub struct CountingLiveLoader {
    clock: Arc<dyn Clock>,
    loads: AtomicUsize,
}

impl CountingLiveLoader {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            loads: AtomicUsize::new(0),
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl LiveLoader for CountingLiveLoader {
    fn load(&self) -> BoxFuture<'_, LiveFeed> {
        Box::pin(async move {
            self.loads.fetch_add(1, Ordering::SeqCst);
            sample_live_feed(self.clock.now())
        })
    }
}

/// Stands in for a live source that is down.
pub struct EmptyLiveLoader {
    clock: Arc<dyn Clock>,
}

impl EmptyLiveLoader {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl LiveLoader for EmptyLiveLoader {
    fn load(&self) -> BoxFuture<'_, LiveFeed> {
        Box::pin(async move { LiveFeed::empty(self.clock.now()) })
    }
}

/// A static source whose feed is broken.
pub struct FailingScheduleLoader;

impl ScheduleLoader for FailingScheduleLoader {
    fn load(&self) -> BoxFuture<'_, Result<GtfsSchedule, GtfsError>> {
        Box::pin(async { Err(GtfsError::MissingTable("stop_times.txt")) })
    }
}

/// A query façade over the sample data at the test instant.
pub fn sample_service() -> TransitService {
    let clock = Arc::new(ManualClock::new(test_now()));
    service_with(Arc::new(CountingLiveLoader::new(clock.clone())), clock)
}

/// A query façade over the sample schedule with a custom live source.
pub fn service_with(live_loader: Arc<dyn LiveLoader>, clock: Arc<ManualClock>) -> TransitService {
    let cache = FeedCache::new(
        Arc::new(CountingScheduleLoader::new(clock.clone())),
        live_loader,
        clock,
        CachePolicy::default(),
    );
    TransitService::new(Arc::new(cache), New_York)
}

/// A query façade over custom tables and the sample live feed.
pub fn service_from_tables(tables: MemoryTables) -> TransitService {
    let clock = Arc::new(ManualClock::new(test_now()));
    let cache = FeedCache::new(
        Arc::new(CountingScheduleLoader::with_tables(clock.clone(), tables)),
        Arc::new(CountingLiveLoader::new(clock.clone())),
        clock,
        CachePolicy::default(),
    );
    TransitService::new(Arc::new(cache), New_York)
}

/// A query façade whose static source always fails.
pub fn broken_service() -> TransitService {
    let clock = Arc::new(ManualClock::new(test_now()));
    let cache = FeedCache::new(
        Arc::new(FailingScheduleLoader),
        Arc::new(EmptyLiveLoader::new(clock.clone())),
        clock,
        CachePolicy::default(),
    );
    TransitService::new(Arc::new(cache), New_York)
}

//! Static GTFS schedule loader.
//!
//! Reads a GTFS feed from a local zip, an extracted directory, or a remote
//! URL and builds a [`GtfsSchedule`]. Any malformed input is a hard error:
//! without a schedule there is nothing to serve.

use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use zip::result::ZipError;
use zip::ZipArchive;

use crate::cache::ScheduleLoader;
use crate::clock::Clock;
use crate::gtfs::{GtfsError, GtfsSchedule, ScheduleTables};

/// Maximum allowed download size for a GTFS zip (500 MB)
const MAX_DOWNLOAD_SIZE: u64 = 500 * 1024 * 1024;
/// Maximum allowed total decompressed size for a GTFS zip (2 GB)
const MAX_DECOMPRESSED_SIZE: u64 = 2 * 1024 * 1024 * 1024;

/// Where the static feed lives.
#[derive(Debug, Clone)]
pub enum ScheduleLocation {
    /// A `.zip` file or a directory of extracted `.txt` tables.
    Path(PathBuf),
    Url(String),
}

#[derive(Clone)]
pub struct GtfsStaticProvider {
    location: ScheduleLocation,
    client: reqwest::Client,
    clock: Arc<dyn Clock>,
}

impl GtfsStaticProvider {
    pub fn new(location: ScheduleLocation, clock: Arc<dyn Clock>) -> Result<Self, GtfsError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            location,
            client,
            clock,
        })
    }

    /// Load and index the full schedule.
    pub async fn load_schedule(&self) -> Result<GtfsSchedule, GtfsError> {
        let started = Instant::now();

        let tables = match &self.location {
            ScheduleLocation::Path(path) => {
                let path = path.clone();
                info!(path = %path.display(), "Loading GTFS schedule from disk");
                tokio::task::spawn_blocking(move || read_path(&path)).await??
            }
            ScheduleLocation::Url(url) => {
                info!(url = %url, "Downloading GTFS schedule");
                let bytes = self.download(url).await?;
                tokio::task::spawn_blocking(move || {
                    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
                    read_zip(&mut archive)
                })
                .await??
            }
        };

        let schedule = GtfsSchedule::new(tables, self.clock.now());
        info!(
            routes = schedule.routes.len(),
            stops = schedule.stops.len(),
            trips = schedule.trips.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Loaded GTFS schedule"
        );
        Ok(schedule)
    }

    async fn download(&self, url: &str) -> Result<bytes::Bytes, GtfsError> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(GtfsError::NetworkMessage(format!(
                "GTFS download HTTP {}",
                response.status()
            )));
        }

        if let Some(length) = response.content_length() {
            if length > MAX_DOWNLOAD_SIZE {
                return Err(GtfsError::NetworkMessage(format!(
                    "GTFS download too large: {} bytes (max {} bytes)",
                    length, MAX_DOWNLOAD_SIZE
                )));
            }
        }

        let bytes = response.bytes().await?;
        if bytes.len() as u64 > MAX_DOWNLOAD_SIZE {
            return Err(GtfsError::NetworkMessage(format!(
                "GTFS download too large: {} bytes (max {} bytes)",
                bytes.len(),
                MAX_DOWNLOAD_SIZE
            )));
        }
        debug!(bytes = bytes.len(), "Downloaded GTFS zip");
        Ok(bytes)
    }
}

impl ScheduleLoader for GtfsStaticProvider {
    fn load(&self) -> BoxFuture<'_, Result<GtfsSchedule, GtfsError>> {
        Box::pin(self.load_schedule())
    }
}

/// A container of GTFS `.txt` tables.
pub(crate) trait TableSource {
    /// Open a table by file name, `None` when the feed does not include it.
    fn open(&mut self, name: &str) -> Result<Option<Box<dyn Read + '_>>, GtfsError>;
}

impl<R: Read + Seek> TableSource for ZipArchive<R> {
    fn open(&mut self, name: &str) -> Result<Option<Box<dyn Read + '_>>, GtfsError> {
        match self.by_name(name) {
            Ok(file) => Ok(Some(Box::new(file))),
            Err(ZipError::FileNotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Extracted feed on disk.
struct DirectorySource(PathBuf);

impl TableSource for DirectorySource {
    fn open(&mut self, name: &str) -> Result<Option<Box<dyn Read + '_>>, GtfsError> {
        match File::open(self.0.join(name)) {
            Ok(file) => Ok(Some(Box::new(file))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Blocking: read a zip file or directory.
fn read_path(path: &Path) -> Result<ScheduleTables, GtfsError> {
    if path.is_dir() {
        return read_tables(&mut DirectorySource(path.to_path_buf()));
    }
    let mut archive = ZipArchive::new(File::open(path)?)?;
    read_zip(&mut archive)
}

/// Blocking: read all tables out of a zip after checking its expanded size.
pub(crate) fn read_zip<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<ScheduleTables, GtfsError> {
    let mut total_uncompressed: u64 = 0;
    for i in 0..archive.len() {
        total_uncompressed += archive.by_index(i)?.size();
    }
    if total_uncompressed > MAX_DECOMPRESSED_SIZE {
        return Err(GtfsError::ParseError(format!(
            "GTFS zip decompressed size {} bytes exceeds limit {} bytes",
            total_uncompressed, MAX_DECOMPRESSED_SIZE
        )));
    }
    debug!(
        decompressed_mb = total_uncompressed / (1024 * 1024),
        "Verified GTFS zip size within limits"
    );
    read_tables(archive)
}

/// Parse every table the engine uses.
pub(crate) fn read_tables(source: &mut dyn TableSource) -> Result<ScheduleTables, GtfsError> {
    let tables = ScheduleTables {
        agencies: required(source, "agency.txt")?,
        routes: required(source, "routes.txt")?,
        stops: required(source, "stops.txt")?,
        trips: required(source, "trips.txt")?,
        stop_times: required(source, "stop_times.txt")?,
        calendars: optional(source, "calendar.txt")?,
        calendar_dates: optional(source, "calendar_dates.txt")?,
        shapes: optional(source, "shapes.txt")?,
    };

    let stops_without_coords = tables
        .stops
        .iter()
        .filter(|s| s.coordinates().is_none())
        .count();
    let stop_times_without_sequence = tables
        .stop_times
        .iter()
        .filter(|st| st.stop_sequence.is_none())
        .count();
    let malformed_shape_points = tables
        .shapes
        .iter()
        .filter(|p| p.shape_pt_lat.is_none() || p.shape_pt_lon.is_none())
        .count();
    if stops_without_coords + stop_times_without_sequence + malformed_shape_points > 0 {
        warn!(
            stops_without_coords,
            stop_times_without_sequence,
            malformed_shape_points,
            "GTFS feed has unparseable numeric fields, treating them as absent"
        );
    }

    Ok(tables)
}

fn required<T: DeserializeOwned>(
    source: &mut dyn TableSource,
    name: &'static str,
) -> Result<Vec<T>, GtfsError> {
    let reader = source.open(name)?.ok_or(GtfsError::MissingTable(name))?;
    parse_table(reader, name)
}

fn optional<T: DeserializeOwned>(
    source: &mut dyn TableSource,
    name: &'static str,
) -> Result<Vec<T>, GtfsError> {
    match source.open(name)? {
        Some(reader) => parse_table(reader, name),
        None => {
            info!(table = name, "Optional GTFS table not present");
            Ok(Vec::new())
        }
    }
}

fn parse_table<T: DeserializeOwned>(reader: impl Read, name: &str) -> Result<Vec<T>, GtfsError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let mut rows = Vec::new();
    for record in rdr.deserialize() {
        rows.push(record?);
    }
    info!(table = name, rows = rows.len(), "Parsed GTFS table");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryTables, SAMPLE_TABLES};
    use std::io::Write;

    #[test]
    fn test_reads_all_sample_tables() {
        let tables = read_tables(&mut MemoryTables::sample()).unwrap();
        assert_eq!(tables.agencies.len(), 2);
        assert_eq!(tables.routes.len(), 4);
        assert_eq!(tables.trips.len(), 5);
        assert_eq!(tables.calendar_dates.len(), 2);
        assert!(!tables.shapes.is_empty());
    }

    #[test]
    fn test_missing_required_table_is_an_error() {
        let mut source = MemoryTables::sample().without("stop_times.txt");
        let err = read_tables(&mut source).unwrap_err();
        assert!(matches!(err, GtfsError::MissingTable("stop_times.txt")));
    }

    #[test]
    fn test_missing_required_column_is_an_error() {
        let mut source = MemoryTables::sample().with(
            "trips.txt",
            "route_id,trip_id\n1,only_trip\n",
        );
        let err = read_tables(&mut source).unwrap_err();
        assert!(matches!(err, GtfsError::Csv(_)));
    }

    #[test]
    fn test_optional_tables_may_be_absent() {
        let mut source = MemoryTables::sample()
            .without("calendar_dates.txt")
            .without("shapes.txt");
        let tables = read_tables(&mut source).unwrap();
        assert!(tables.calendar_dates.is_empty());
        assert!(tables.shapes.is_empty());
        assert_eq!(tables.calendars.len(), 2);
    }

    #[test]
    fn test_malformed_numbers_become_absent() {
        let tables = read_tables(&mut MemoryTables::sample()).unwrap();
        let bad_sequence = tables
            .stop_times
            .iter()
            .find(|st| st.trip_id.ends_with("129900_1..N03R") && st.stop_id == "101N")
            .unwrap();
        assert_eq!(bad_sequence.stop_sequence, None);

        let bad_stop = tables.stops.iter().find(|s| s.stop_id == "902").unwrap();
        assert_eq!(bad_stop.stop_lat, None);
        assert_eq!(bad_stop.stop_lon, Some(-73.986229));
    }

    #[test]
    fn test_empty_optional_columns_are_none() {
        let tables = read_tables(&mut MemoryTables::sample()).unwrap();
        let shuttle = tables.routes.iter().find(|r| r.route_id == "GS").unwrap();
        assert_eq!(shuttle.route_color, None);
        let shuttle_trip = tables.trips.iter().find(|t| t.route_id == "GS").unwrap();
        assert_eq!(shuttle_trip.shape_id, None);
    }

    fn write_sample_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("transit-live-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        for (table, content) in SAMPLE_TABLES {
            std::fs::write(dir.join(table), content).unwrap();
        }
        dir
    }

    #[test]
    fn test_reads_extracted_directory() {
        let dir = write_sample_dir("dir");
        std::fs::remove_file(dir.join("shapes.txt")).unwrap();

        let result = read_path(&dir);
        std::fs::remove_dir_all(&dir).unwrap();

        let tables = result.unwrap();
        assert_eq!(tables.routes.len(), 4);
        assert_eq!(tables.stops.len(), 13);
        assert_eq!(tables.stop_times.len(), 13);
        assert_eq!(tables.calendar_dates.len(), 2);
        assert!(tables.shapes.is_empty());
    }

    #[test]
    fn test_directory_missing_required_table() {
        let dir = write_sample_dir("dir-missing");
        std::fs::remove_file(dir.join("trips.txt")).unwrap();

        let result = read_path(&dir);
        std::fs::remove_dir_all(&dir).unwrap();

        assert!(matches!(result, Err(GtfsError::MissingTable("trips.txt"))));
    }

    #[tokio::test]
    async fn test_provider_loads_directory() {
        let dir = write_sample_dir("provider");
        let now = crate::testing::test_now();
        let provider = GtfsStaticProvider::new(
            ScheduleLocation::Path(dir.clone()),
            Arc::new(crate::testing::ManualClock::new(now)),
        )
        .unwrap();

        let result = provider.load_schedule().await;
        std::fs::remove_dir_all(&dir).unwrap();

        let schedule = result.unwrap();
        assert_eq!(schedule.trips.len(), 5);
        assert_eq!(schedule.loaded_at, now);
    }

    #[test]
    fn test_reads_tables_from_zip() {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in SAMPLE_TABLES {
            writer
                .start_file(*name, zip::write::FileOptions::default())
                .unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        let cursor = writer.finish().unwrap();

        let mut archive = ZipArchive::new(Cursor::new(cursor.into_inner())).unwrap();
        let tables = read_zip(&mut archive).unwrap();
        assert_eq!(tables.routes.len(), 4);
        assert_eq!(tables.stop_times.len(), 13);
    }
}

//! GTFS-Realtime trip update loader.
//!
//! Live data is best effort: every failure (network, HTTP status, decode)
//! is logged here and the loader degrades to whatever feeds succeeded, or to
//! an empty snapshot stamped with the current time.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::DateTime;
use futures::future::{join_all, BoxFuture};
use prost::Message;
use tracing::{debug, info, warn};

use crate::cache::LiveLoader;
use crate::clock::Clock;
use crate::gtfs::{GtfsError, LiveFeed, StopTimeEvent, StopTimeUpdate, TripUpdate};

/// Maximum allowed protobuf response size (50 MB)
const MAX_PROTOBUF_SIZE: usize = 50 * 1024 * 1024;

#[derive(Clone)]
pub struct GtfsRealtimeProvider {
    client: reqwest::Client,
    feed_urls: Vec<String>,
    api_key: Option<String>,
    timeout: Duration,
    clock: Arc<dyn Clock>,
}

/// One decoded feed.
struct DecodedFeed {
    trip_updates: Vec<TripUpdate>,
    timestamp: Option<u64>,
}

impl GtfsRealtimeProvider {
    pub fn new(
        feed_urls: Vec<String>,
        api_key: Option<String>,
        timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, GtfsError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            feed_urls,
            api_key,
            timeout,
            clock,
        })
    }

    /// Fetch every configured feed and merge the trip updates in feed order.
    ///
    /// Never fails; see the module docs.
    pub async fn load_feed(&self) -> LiveFeed {
        let started = Instant::now();
        let results = join_all(self.feed_urls.iter().map(|url| self.fetch_feed(url))).await;

        let mut trip_updates = Vec::new();
        let mut feed_timestamp: Option<u64> = None;
        let mut failed = 0usize;

        for (url, result) in self.feed_urls.iter().zip(results) {
            match result {
                Ok(feed) => {
                    debug!(url = %url, trip_updates = feed.trip_updates.len(), "Fetched realtime feed");
                    trip_updates.extend(feed.trip_updates);
                    feed_timestamp = feed_timestamp.max(feed.timestamp);
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Failed to fetch realtime feed, skipping");
                    failed += 1;
                }
            }
        }

        info!(
            feeds = self.feed_urls.len(),
            failed,
            trip_updates = trip_updates.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Loaded realtime trip updates"
        );

        LiveFeed {
            trip_updates,
            fetched_at: self.clock.now(),
            feed_timestamp: feed_timestamp
                .and_then(|ts| i64::try_from(ts).ok())
                .and_then(|ts| DateTime::from_timestamp(ts, 0)),
        }
    }

    async fn fetch_feed(&self, url: &str) -> Result<DecodedFeed, GtfsError> {
        let mut request = self.client.get(url).timeout(self.timeout);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            return Err(GtfsError::NetworkMessage(format!(
                "GTFS-RT HTTP {}",
                response.status()
            )));
        }

        let bytes = response.bytes().await?;
        if bytes.len() > MAX_PROTOBUF_SIZE {
            return Err(GtfsError::NetworkMessage(format!(
                "GTFS-RT response too large: {} bytes (max {} bytes)",
                bytes.len(),
                MAX_PROTOBUF_SIZE
            )));
        }

        decode_feed(&bytes)
    }
}

impl LiveLoader for GtfsRealtimeProvider {
    fn load(&self) -> BoxFuture<'_, LiveFeed> {
        Box::pin(self.load_feed())
    }
}

/// Decode a protobuf `FeedMessage` into trip updates.
///
/// Entities without a trip update or without a trip id are dropped.
fn decode_feed(bytes: &[u8]) -> Result<DecodedFeed, GtfsError> {
    let message = gtfs_rt::FeedMessage::decode(bytes)?;
    let timestamp = message.header.timestamp;

    let trip_updates = message
        .entity
        .into_iter()
        .filter_map(|entity| entity.trip_update)
        .filter_map(convert_trip_update)
        .collect();

    Ok(DecodedFeed {
        trip_updates,
        timestamp,
    })
}

fn convert_trip_update(update: gtfs_rt::TripUpdate) -> Option<TripUpdate> {
    let trip_id = update.trip.trip_id.filter(|id| !id.is_empty())?;

    Some(TripUpdate {
        trip_id,
        route_id: update.trip.route_id,
        delay: update.delay,
        stop_time_updates: update
            .stop_time_update
            .into_iter()
            .map(|stu| StopTimeUpdate {
                stop_id: stu.stop_id,
                stop_sequence: stu.stop_sequence,
                arrival: stu.arrival.map(convert_event),
                departure: stu.departure.map(convert_event),
            })
            .collect(),
    })
}

fn convert_event(event: gtfs_rt::trip_update::StopTimeEvent) -> StopTimeEvent {
    StopTimeEvent {
        time: event.time,
        delay: event.delay,
    }
}

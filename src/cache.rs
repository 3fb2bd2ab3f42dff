use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::clock::Clock;
use crate::gtfs::{GtfsError, GtfsSchedule, LiveFeed};

/// Produces a fresh static schedule. Failures propagate.
pub trait ScheduleLoader: Send + Sync {
    fn load(&self) -> BoxFuture<'_, Result<GtfsSchedule, GtfsError>>;
}

/// Produces a fresh live feed. Must absorb its own failures and return an
/// empty feed instead.
pub trait LiveLoader: Send + Sync {
    fn load(&self) -> BoxFuture<'_, LiveFeed>;
}

/// Time-to-live for each store.
#[derive(Debug, Clone, Copy)]
pub struct CachePolicy {
    pub schedule_ttl: Duration,
    pub live_ttl: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            schedule_ttl: Duration::from_secs(5 * 60),
            live_ttl: Duration::from_secs(30),
        }
    }
}

struct Cached<T> {
    value: Arc<T>,
    loaded_at: DateTime<Utc>,
}

/// One independently refreshed snapshot.
///
/// Readers clone the `Arc` out under a short read lock, so a refresh never
/// disturbs a snapshot someone is still holding. `refresh` serializes
/// reloads so callers arriving during a reload wait for it instead of
/// starting their own.
struct Slot<T> {
    name: &'static str,
    ttl: chrono::Duration,
    current: RwLock<Option<Cached<T>>>,
    refresh: Mutex<()>,
}

impl<T> Slot<T> {
    fn new(name: &'static str, ttl: Duration) -> Self {
        Self {
            name,
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
            current: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    async fn fresh(&self, now: DateTime<Utc>) -> Option<Arc<T>> {
        let current = self.current.read().await;
        current
            .as_ref()
            .filter(|cached| now - cached.loaded_at < self.ttl)
            .map(|cached| cached.value.clone())
    }

    async fn store(&self, value: T, loaded_at: DateTime<Utc>) -> Arc<T> {
        let value = Arc::new(value);
        *self.current.write().await = Some(Cached {
            value: value.clone(),
            loaded_at,
        });
        value
    }
}

/// Holds the static schedule and the live feed, each with its own TTL.
///
/// Constructed once per process and shared behind an `Arc`. The two stores
/// never lock each other.
pub struct FeedCache {
    schedule_loader: Arc<dyn ScheduleLoader>,
    live_loader: Arc<dyn LiveLoader>,
    clock: Arc<dyn Clock>,
    schedule: Slot<GtfsSchedule>,
    live: Slot<LiveFeed>,
}

impl FeedCache {
    pub fn new(
        schedule_loader: Arc<dyn ScheduleLoader>,
        live_loader: Arc<dyn LiveLoader>,
        clock: Arc<dyn Clock>,
        policy: CachePolicy,
    ) -> Self {
        Self {
            schedule_loader,
            live_loader,
            clock,
            schedule: Slot::new("schedule", policy.schedule_ttl),
            live: Slot::new("live", policy.live_ttl),
        }
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Current static schedule, reloading it when the TTL has passed.
    pub async fn schedule(&self) -> Result<Arc<GtfsSchedule>, GtfsError> {
        if let Some(schedule) = self.schedule.fresh(self.clock.now()).await {
            return Ok(schedule);
        }

        let _guard = self.schedule.refresh.lock().await;
        // Another caller may have finished the reload while we waited
        if let Some(schedule) = self.schedule.fresh(self.clock.now()).await {
            return Ok(schedule);
        }

        let started = Instant::now();
        let schedule = self.schedule_loader.load().await?;
        let loaded_at = self.clock.now();
        info!(
            store = self.schedule.name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Refreshed cache"
        );
        Ok(self.schedule.store(schedule, loaded_at).await)
    }

    /// Current live feed, reloading it when the TTL has passed.
    pub async fn live(&self) -> Arc<LiveFeed> {
        if let Some(feed) = self.live.fresh(self.clock.now()).await {
            return feed;
        }

        let _guard = self.live.refresh.lock().await;
        if let Some(feed) = self.live.fresh(self.clock.now()).await {
            return feed;
        }

        let started = Instant::now();
        let feed = self.live_loader.load().await;
        let loaded_at = self.clock.now();
        debug!(
            store = self.live.name,
            trip_updates = feed.trip_updates.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Refreshed cache"
        );
        self.live.store(feed, loaded_at).await
    }

    /// Both snapshots for one request.
    ///
    /// The live feed is fetched concurrently with the schedule, so a slow
    /// feed never holds up the static store.
    pub async fn snapshots(&self) -> Result<(Arc<GtfsSchedule>, Arc<LiveFeed>), GtfsError> {
        let (schedule, live) = tokio::join!(self.schedule(), self.live());
        Ok((schedule?, live))
    }
}

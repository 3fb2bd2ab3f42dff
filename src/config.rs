use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;

use crate::cache::CachePolicy;
use crate::providers::ScheduleLocation;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Address the HTTP server binds to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// IANA timezone of the service day
    #[serde(default = "default_timezone")]
    pub timezone: String,
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    /// Allowed CORS origins. Required unless cors_permissive is true.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Explicitly allow all origins (development only). Defaults to false.
    #[serde(default)]
    pub cors_permissive: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    pub source: ScheduleSource,
    #[serde(default = "default_schedule_ttl")]
    pub ttl_secs: u64,
}

/// Where to read the static GTFS feed from. Exactly one must be set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleSource {
    /// A .zip file or a directory of extracted tables
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    /// GTFS-Realtime feed URLs, merged in this order
    #[serde(default)]
    pub feeds: Vec<String>,
    /// Sent as the `x-api-key` header
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_live_ttl")]
    pub ttl_secs: u64,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            feeds: Vec::new(),
            api_key: None,
            ttl_secs: default_live_ttl(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_timezone() -> String {
    "America/New_York".to_string()
}

fn default_schedule_ttl() -> u64 {
    5 * 60
}

fn default_live_ttl() -> u64 {
    30
}

fn default_timeout() -> u64 {
    10
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.tz()?;
        config.schedule_location()?;
        Ok(config)
    }

    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("unknown timezone {:?}", self.timezone)))
    }

    pub fn schedule_location(&self) -> Result<ScheduleLocation, ConfigError> {
        match &self.schedule.source {
            ScheduleSource {
                path: Some(path),
                url: None,
            } => Ok(ScheduleLocation::Path(path.clone())),
            ScheduleSource {
                path: None,
                url: Some(url),
            } => Ok(ScheduleLocation::Url(url.clone())),
            _ => Err(ConfigError::Invalid(
                "schedule.source needs exactly one of path or url".to_string(),
            )),
        }
    }

    pub fn cache_policy(&self) -> CachePolicy {
        CachePolicy {
            schedule_ttl: Duration::from_secs(self.schedule.ttl_secs),
            live_ttl: Duration::from_secs(self.realtime.ttl_secs),
        }
    }

    pub fn live_timeout(&self) -> Duration {
        Duration::from_secs(self.realtime.timeout_secs)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to parse config: {0}")]
    ParseError(String),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

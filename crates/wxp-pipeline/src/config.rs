//! Configuration management
//!
//! All deployment settings are read once at startup and handed to each
//! component at construction. Nothing below the binary reads the environment.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::db::DbConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::load::warehouse::MAX_CHUNK_SIZE;
use crate::storage::config::StorageConfig;

// ============================================================================
// Pipeline Configuration Constants
// ============================================================================

/// Default weather API endpoint.
pub const DEFAULT_WEATHER_API_URL: &str = "https://api.open-meteo.com/v1/forecast";

/// Default query latitude.
pub const DEFAULT_LATITUDE: f64 = 12.97;

/// Default query longitude.
pub const DEFAULT_LONGITUDE: f64 = 77.59;

/// Default timeout for a single weather API call, in seconds.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

/// Default source tag stamped on raw captures.
pub const DEFAULT_SOURCE_SYSTEM: &str = "open-meteo";

/// Default bucket for raw captures.
pub const DEFAULT_RAW_BUCKET: &str = "weather-data-raw";

/// Default bucket for silver partitions.
pub const DEFAULT_SILVER_BUCKET: &str = "weather-data-processed";

/// Default number of rows per warehouse insert statement.
pub const DEFAULT_LOAD_CHUNK_SIZE: usize = 1000;

/// Weather API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    pub api_url: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timeout: Duration,
    pub source_system: String,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_WEATHER_API_URL.to_string(),
            latitude: DEFAULT_LATITUDE,
            longitude: DEFAULT_LONGITUDE,
            timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            source_system: DEFAULT_SOURCE_SYSTEM.to_string(),
        }
    }
}

/// Warehouse load settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    pub chunk_size: usize,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_LOAD_CHUNK_SIZE,
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub weather: WeatherConfig,
    pub storage: StorageConfig,
    pub raw_bucket: String,
    pub silver_bucket: String,
    pub database: DbConfig,
    pub load: LoadConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            weather: WeatherConfig::default(),
            storage: StorageConfig::default(),
            raw_bucket: DEFAULT_RAW_BUCKET.to_string(),
            silver_bucket: DEFAULT_SILVER_BUCKET.to_string(),
            database: DbConfig::default(),
            load: LoadConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from `.env` and the process environment
    pub fn load() -> PipelineResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source.
    ///
    /// Unset variables fall back to the `DEFAULT_*` constants; set but
    /// unparseable values are an error rather than a silent default.
    pub fn from_lookup<F>(lookup: F) -> PipelineResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let config = Config {
            weather: WeatherConfig {
                api_url: lookup("WEATHER_API_URL").unwrap_or(defaults.weather.api_url),
                latitude: parse_var(&lookup, "WEATHER_LATITUDE", defaults.weather.latitude)?,
                longitude: parse_var(&lookup, "WEATHER_LONGITUDE", defaults.weather.longitude)?,
                timeout: Duration::from_secs(parse_var(
                    &lookup,
                    "WEATHER_FETCH_TIMEOUT_SECS",
                    DEFAULT_FETCH_TIMEOUT_SECS,
                )?),
                source_system: lookup("WEATHER_SOURCE_SYSTEM")
                    .unwrap_or(defaults.weather.source_system),
            },
            storage: StorageConfig::from_lookup(&lookup)?,
            raw_bucket: lookup("RAW_BUCKET").unwrap_or(defaults.raw_bucket),
            silver_bucket: lookup("SILVER_BUCKET").unwrap_or(defaults.silver_bucket),
            database: DbConfig::from_lookup(&lookup)?,
            load: LoadConfig {
                chunk_size: parse_var(&lookup, "LOAD_CHUNK_SIZE", defaults.load.chunk_size)?,
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> PipelineResult<()> {
        if self.weather.api_url.is_empty() {
            return Err(PipelineError::config("WEATHER_API_URL cannot be empty"));
        }

        if !(-90.0..=90.0).contains(&self.weather.latitude) {
            return Err(PipelineError::config(format!(
                "latitude {} is outside [-90, 90]",
                self.weather.latitude
            )));
        }

        if !(-180.0..=180.0).contains(&self.weather.longitude) {
            return Err(PipelineError::config(format!(
                "longitude {} is outside [-180, 180]",
                self.weather.longitude
            )));
        }

        if self.weather.timeout.is_zero() {
            return Err(PipelineError::config("fetch timeout must be greater than 0"));
        }

        if self.raw_bucket.is_empty() || self.silver_bucket.is_empty() {
            return Err(PipelineError::config("RAW_BUCKET and SILVER_BUCKET cannot be empty"));
        }

        if self.database.url.is_empty() {
            return Err(PipelineError::config("DATABASE_URL cannot be empty"));
        }

        if self.load.chunk_size == 0 {
            return Err(PipelineError::config("LOAD_CHUNK_SIZE must be greater than 0"));
        }

        if self.load.chunk_size > MAX_CHUNK_SIZE {
            return Err(PipelineError::config(format!(
                "LOAD_CHUNK_SIZE must be at most {} (PostgreSQL bind parameter limit)",
                MAX_CHUNK_SIZE
            )));
        }

        if self.raw_bucket == self.silver_bucket {
            tracing::warn!(
                bucket = %self.raw_bucket,
                "Raw and silver layers share a bucket; prefixes keep them apart"
            );
        }

        Ok(())
    }
}

/// Parse an optional variable, falling back to `default` when unset
pub(crate) fn parse_var<T, F>(lookup: &F, key: &str, default: T) -> PipelineResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| PipelineError::config(format!("{} has invalid value '{}': {}", key, raw, e))),
        None => Ok(default),
    }
}

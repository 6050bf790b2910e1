//! Configuration management for Fuelwatch
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files with support for environment variable overrides.

use crate::cache::CachePolicy;
use crate::error::{FuelWatchError, Result};
use crate::fuel::{FuelType, StationId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

mod defaults;

/// Placeholder returned instead of secrets
pub const MASKED: &str = "***";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// InfluxDB v2 connection (time-series sink)
    pub influxdb: InfluxConfig,

    /// MQTT broker for Home Assistant mirroring (optional)
    pub mqtt: MqttConfig,

    /// Price source endpoint
    pub source: SourceConfig,

    /// Stations to monitor
    pub stations: Vec<MonitoredStation>,

    /// Polling interval in minutes (interval mode)
    pub poll_interval: u64,

    /// Cron expression; when non-empty it replaces the interval
    pub cron_schedule: String,

    /// Timezone used to evaluate the cron expression
    pub timezone: String,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Web server binding configuration
    pub web: WebConfig,

    /// Directory holding the station database
    pub data_dir: String,

    /// When the change cache is updated relative to the sink write
    pub cache_policy: CachePolicy,

    /// Number of recent sink points used to seed the change cache
    pub seed_window: usize,
}

/// A station and the fuel codes tracked for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredStation {
    pub station_id: StationId,
    pub fuel_types: Vec<String>,
}

/// InfluxDB v2 parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InfluxConfig {
    pub url: String,
    pub token: String,
    pub org: String,
    pub bucket: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

/// MQTT broker parameters; an empty broker disables publishing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub broker: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub discovery_prefix: String,
    pub keep_alive_secs: u64,
}

/// Price source endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,
    /// Optional API key sent as `apikey`
    pub api_key: String,
    pub timeout_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (DEBUG, INFO, WARNING, ERROR, CRITICAL)
    pub level: String,

    /// Path to a rolling log file; empty disables file logging
    pub file: String,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

/// Web server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Bind address
    pub host: String,

    /// TCP port
    pub port: u16,
}

impl MqttConfig {
    pub fn enabled(&self) -> bool {
        !self.broker.trim().is_empty()
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.warn_unknown_fuel_types();
        Ok(config)
    }

    /// Load configuration from `explicit` or the default locations.
    ///
    /// A missing explicit file is an error; when no default file exists the
    /// built-in defaults are returned.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(FuelWatchError::config(format!(
                    "Configuration file not found: {}",
                    path.display()
                )));
            }
            return Self::from_file(path);
        }

        let default_paths = [
            "fuelwatch.yaml",
            "config.yaml",
            "/data/fuelwatch.yaml",
            "/etc/fuelwatch/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        Ok(Config::default())
    }

    /// Apply values saved in the station store's settings table. Keys are
    /// the lowercase names of the environment overrides (`influxdb_url`,
    /// `poll_interval`, ...); `data_dir` cannot be moved from inside itself.
    pub fn apply_settings(&mut self, settings: &BTreeMap<String, String>) {
        let data_dir = std::mem::take(&mut self.data_dir);
        self.apply_overrides_from(|key| settings.get(&key.to_ascii_lowercase()).cloned());
        self.data_dir = data_dir;
    }

    /// Apply overrides from the process environment (after loading `.env`)
    pub fn apply_env_overrides(&mut self) {
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!("No .env file loaded: {}", e);
        }
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides using `lookup` as the variable source. Empty values
    /// are ignored; unparsable numbers keep the previous value.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("INFLUXDB_URL") {
            self.influxdb.url = v;
        }
        if let Some(v) = get("INFLUXDB_TOKEN") {
            self.influxdb.token = v;
        }
        if let Some(v) = get("INFLUXDB_ORG") {
            self.influxdb.org = v;
        }
        if let Some(v) = get("INFLUXDB_BUCKET") {
            self.influxdb.bucket = v;
        }
        if let Some(v) = get("MQTT_BROKER") {
            self.mqtt.broker = v;
        }
        if let Some(port) = get("MQTT_PORT").and_then(|v| v.trim().parse().ok()) {
            self.mqtt.port = port;
        }
        if let Some(v) = get("MQTT_USER") {
            self.mqtt.user = v;
        }
        if let Some(v) = get("MQTT_PASSWORD") {
            self.mqtt.password = v;
        }
        if let Some(v) = get("MQTT_DISCOVERY_PREFIX") {
            self.mqtt.discovery_prefix = v;
        }
        if let Some(v) = get("TIMEZONE") {
            self.timezone = v;
        }
        if let Some(v) = get("CRON_SCHEDULE") {
            self.cron_schedule = v;
        }
        if let Some(minutes) = get("POLL_INTERVAL").and_then(|v| v.trim().parse().ok()) {
            self.poll_interval = minutes;
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = get("DATA_DIR") {
            self.data_dir = v;
        }
        if let Some(v) = get("FUEL_API_URL") {
            self.source.base_url = v;
        }
        if let Some(v) = get("FUEL_API_KEY") {
            self.source.api_key = v;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("influxdb.url", &self.influxdb.url, "InfluxDB URL is required"),
            ("influxdb.token", &self.influxdb.token, "InfluxDB token is required"),
            ("influxdb.org", &self.influxdb.org, "InfluxDB organization is required"),
            ("influxdb.bucket", &self.influxdb.bucket, "InfluxDB bucket is required"),
        ];
        for (field, value, message) in required {
            if value.trim().is_empty() {
                return Err(FuelWatchError::validation(field, message));
            }
        }

        if self.stations.is_empty() {
            return Err(FuelWatchError::validation(
                "stations",
                "At least one station must be configured",
            ));
        }
        for station in &self.stations {
            if station.fuel_types.is_empty() {
                return Err(FuelWatchError::validation(
                    "stations",
                    format!(
                        "Station {} must have at least one fuel type",
                        station.station_id
                    ),
                ));
            }
        }

        if self.poll_interval == 0 {
            return Err(FuelWatchError::validation(
                "poll_interval",
                "Must be at least 1 minute",
            ));
        }

        self.timezone_tz()?;

        if self.seed_window == 0 {
            return Err(FuelWatchError::validation(
                "seed_window",
                "Must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Parsed timezone for schedule evaluation
    pub fn timezone_tz(&self) -> Result<chrono_tz::Tz> {
        self.timezone
            .trim()
            .parse::<chrono_tz::Tz>()
            .map_err(|_| FuelWatchError::validation("timezone", format!("unknown timezone {}", self.timezone)))
    }

    /// Location of the SQLite station store
    pub fn db_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join("config.db")
    }

    /// Copy of this config safe to hand out over the API
    pub fn masked(&self) -> Self {
        let mut copy = self.clone();
        if !copy.influxdb.token.is_empty() {
            copy.influxdb.token = MASKED.to_string();
        }
        if !copy.mqtt.password.is_empty() {
            copy.mqtt.password = MASKED.to_string();
        }
        if !copy.source.api_key.is_empty() {
            copy.source.api_key = MASKED.to_string();
        }
        copy
    }

    fn warn_unknown_fuel_types(&self) {
        for station in &self.stations {
            let invalid = FuelType::unknown_codes(&station.fuel_types);
            if !invalid.is_empty() {
                warn!(
                    "Station {} has invalid fuel types: {:?}",
                    station.station_id, invalid
                );
            }
        }
    }
}

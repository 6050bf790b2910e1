//! # Fuelwatch - fuel price monitor for NSW FuelCheck
//!
//! Polls the FuelCheck price feed on a fixed interval or cron schedule,
//! records price changes in InfluxDB and mirrors current prices to Home
//! Assistant over MQTT.
//!
//! ## Architecture
//!
//! - `source`: price source trait and the FuelCheck HTTP client
//! - `cache`: per-key change cache that suppresses redundant writes
//! - `sink`: time-series sink trait and the InfluxDB v2 writer
//! - `publish`: Home Assistant discovery and state publishing over MQTT
//! - `store`: SQLite station and settings store
//! - `monitor`: the update cycle that ties the above together
//! - `scheduler`: interval and cron tick scheduling with cancellation
//! - `web`: JSON HTTP API over the monitor's latest view
//! - `config`, `logging`, `error`: ambient plumbing

pub mod cache;
pub mod config;
pub mod error;
pub mod fuel;
pub mod logging;
pub mod monitor;
pub mod publish;
pub mod scheduler;
pub mod sink;
pub mod source;
pub mod store;
#[cfg(feature = "web")]
pub mod web;


// Re-export commonly used types
pub use config::Config;
pub use error::{FuelWatchError, Result};
pub use monitor::Monitor;

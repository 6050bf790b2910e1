//! Time-series sink abstraction
//!
//! The monitor writes one batch per tick (only when prices changed) and
//! reads a bounded window back at startup to seed the change cache.

pub mod influx;
pub mod line_protocol;

use crate::error::Result;
use crate::fuel::StationId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

pub use influx::InfluxWriter;

/// Measurement name used for every price point
pub const MEASUREMENT: &str = "fuel_price";

/// A point to be written: tags plus the `price` field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceRecord {
    pub station_id: StationId,
    pub station_name: String,
    pub station_address: String,
    pub fuel_type: String,
    pub price: f64,
}

/// A point read back from the sink
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedPrice {
    pub time: DateTime<Utc>,
    pub station_id: StationId,
    pub fuel_type: String,
    pub price: f64,
}

/// Filter for historical reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    pub station_id: Option<StationId>,
    pub fuel_type: Option<String>,
    pub days: u32,
}

#[async_trait]
pub trait TimeSeriesSink: Send + Sync {
    /// Check reachability; updates the connected flag
    async fn connect(&self) -> Result<()>;

    /// Last known connection state
    fn is_connected(&self) -> bool;

    /// Write all points with one shared timestamp
    async fn write_points(&self, points: &[PriceRecord], timestamp: DateTime<Utc>) -> Result<()>;

    /// Most recent `limit` points across all keys, newest first
    async fn recent_points(&self, limit: usize) -> Result<Vec<RecordedPrice>>;

    /// Points matching `query`, oldest first
    async fn history(&self, query: &HistoryQuery) -> Result<Vec<RecordedPrice>>;

    async fn close(&self) {}
}

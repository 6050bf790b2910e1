use crate::config::MonitoredStation;
use crate::source::Snapshot;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    Completed,
    /// The sink was not connected; nothing was fetched
    SkippedNotConnected,
    /// The source failed; nothing was written or published
    SkippedFetchFailed,
}

/// What one tick did
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub outcome: CycleOutcome,
    /// Keys whose price moved past the epsilon
    pub changed: usize,
    /// Points accepted by the sink (0 when the write was skipped or failed)
    pub written: usize,
    pub published_states: usize,
    pub published_discovery: usize,
    /// Configured keys absent from the snapshot
    pub skipped_missing: usize,
    pub write_error: Option<String>,
}

impl CycleReport {
    pub(super) fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            outcome: CycleOutcome::Completed,
            changed: 0,
            written: 0,
            published_states: 0,
            published_discovery: 0,
            skipped_missing: 0,
            write_error: None,
        }
    }
}

/// Running totals since process start
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleCounters {
    pub total_cycles: u64,
    pub failed_fetches: u64,
    pub failed_writes: u64,
}

/// One entry on the report stream
#[derive(Debug, Clone, Serialize)]
pub struct CycleEvent {
    pub report: CycleReport,
    pub counters: CycleCounters,
}

/// Read-only view handed to concurrent readers after every tick
#[derive(Debug, Clone, Default)]
pub struct MonitorSnapshot {
    /// Latest successful fetch
    pub prices: Option<Arc<Snapshot>>,
    pub last_report: Option<CycleReport>,
    pub counters: CycleCounters,
    pub cache_size: usize,
    /// Station list used by the latest tick
    pub stations: Vec<MonitoredStation>,
}

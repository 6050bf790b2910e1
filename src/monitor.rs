//! Update cycle orchestration
//!
//! One [`Monitor::run_cycle`] call is one tick: check the sink, reload the
//! station list, fetch a snapshot, detect changes against the
//! [`ChangeCache`], write the changed points as one batch and republish
//! every present key to the pub/sub mirror. The monitor is the only owner of
//! the cache; readers get immutable [`MonitorSnapshot`]s through a watch
//! channel and never block a tick.

mod types;
#[cfg(test)]
mod tests;

pub use types::{CycleCounters, CycleEvent, CycleOutcome, CycleReport, MonitorSnapshot};

use crate::cache::{CachePolicy, ChangeCache};
use crate::config::MonitoredStation;
use crate::fuel::PriceKey;
use crate::logging::{StructuredLogger, get_logger};
use crate::publish::HomeAssistantMirror;
use crate::scheduler::Tick;
use crate::sink::{PriceRecord, TimeSeriesSink};
use crate::source::{PriceSource, Snapshot};
use crate::store::StationProvider;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

const EVENT_BUFFER: usize = 100;

pub struct Monitor {
    source: Arc<dyn PriceSource>,
    sink: Arc<dyn TimeSeriesSink>,
    mirror: HomeAssistantMirror,
    stations: Arc<dyn StationProvider>,
    cache: ChangeCache,
    policy: CachePolicy,
    monitored: Vec<MonitoredStation>,
    counters: CycleCounters,
    latest: Option<Arc<Snapshot>>,
    last_report: Option<CycleReport>,
    snapshot_tx: watch::Sender<Arc<MonitorSnapshot>>,
    events_tx: broadcast::Sender<CycleEvent>,
    logger: StructuredLogger,
}

impl Monitor {
    pub fn new(
        source: Arc<dyn PriceSource>,
        sink: Arc<dyn TimeSeriesSink>,
        mirror: HomeAssistantMirror,
        stations: Arc<dyn StationProvider>,
        cache: ChangeCache,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(Arc::new(MonitorSnapshot::default()));
        let (events_tx, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            source,
            sink,
            mirror,
            stations,
            cache,
            policy: CachePolicy::default(),
            monitored: Vec::new(),
            counters: CycleCounters::default(),
            latest: None,
            last_report: None,
            snapshot_tx,
            events_tx,
            logger: get_logger("monitor"),
        }
    }

    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Station list used if the first reload fails
    pub fn with_initial_stations(mut self, stations: Vec<MonitoredStation>) -> Self {
        self.monitored = stations;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<MonitorSnapshot>> {
        self.snapshot_tx.subscribe()
    }

    pub fn event_sender(&self) -> broadcast::Sender<CycleEvent> {
        self.events_tx.clone()
    }

    pub fn cache(&self) -> &ChangeCache {
        &self.cache
    }

    pub fn counters(&self) -> CycleCounters {
        self.counters
    }

    pub fn monitored_stations(&self) -> &[MonitoredStation] {
        &self.monitored
    }

    /// Run one tick. Never fails; problems are logged and reflected in the
    /// returned report.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let started_at = Utc::now();
        let mut report = CycleReport::new(started_at);
        self.counters.total_cycles += 1;

        if !self.sink.is_connected() {
            self.logger
                .error("Not connected to InfluxDB, skipping update cycle");
            report.outcome = CycleOutcome::SkippedNotConnected;
            return self.finish(report);
        }

        self.reload_stations();

        let snapshot = match self.source.fetch().await {
            Ok(snapshot) => Arc::new(snapshot),
            Err(e) => {
                self.counters.failed_fetches += 1;
                self.logger
                    .error(&format!("Failed to fetch price data: {}", e));
                report.outcome = CycleOutcome::SkippedFetchFailed;
                return self.finish(report);
            }
        };
        self.latest = Some(snapshot.clone());

        let keys = self.present_keys(&snapshot, &mut report);
        let (batch, pending) = self.detect_changes(&snapshot, &keys);
        report.changed = batch.len();

        if batch.is_empty() {
            self.logger
                .info("No price changes detected, skipping InfluxDB write");
        } else {
            match self.sink.write_points(&batch, started_at).await {
                Ok(()) => {
                    report.written = batch.len();
                    for (key, price) in pending {
                        self.cache.set(key, price);
                    }
                }
                Err(e) => {
                    self.counters.failed_writes += 1;
                    self.logger
                        .error(&format!("Failed to write price data: {}", e));
                    report.write_error = Some(e.to_string());
                }
            }
        }

        self.publish(&snapshot, &keys, &mut report).await;
        self.finish(report)
    }

    fn reload_stations(&mut self) {
        match self.stations.load_stations() {
            Ok(stations) => self.monitored = stations,
            Err(e) => self.logger.warn(&format!(
                "Could not reload stations, keeping {} previous: {}",
                self.monitored.len(),
                e
            )),
        }
    }

    /// Configured keys present in the snapshot, in configuration order and
    /// without duplicates
    fn present_keys(&self, snapshot: &Snapshot, report: &mut CycleReport) -> Vec<PriceKey> {
        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        for station in &self.monitored {
            for fuel_type in &station.fuel_types {
                let key = PriceKey::new(station.station_id, fuel_type.clone());
                if !seen.insert(key.clone()) {
                    continue;
                }
                if snapshot.price(&key).is_some() {
                    keys.push(key);
                } else {
                    report.skipped_missing += 1;
                    self.logger.debug(&format!("No price for {} this tick", key));
                }
            }
        }
        keys
    }

    /// Points to write plus cache updates deferred until the write succeeds
    fn detect_changes(
        &mut self,
        snapshot: &Snapshot,
        keys: &[PriceKey],
    ) -> (Vec<PriceRecord>, Vec<(PriceKey, f64)>) {
        let mut batch = Vec::new();
        let mut pending = Vec::new();
        for key in keys {
            let Some(point) = snapshot.price(key) else {
                continue;
            };
            if !point.price.is_finite() {
                self.logger
                    .warn(&format!("Ignoring non-numeric price for {}", key));
                continue;
            }
            if !self.cache.is_changed(key, point.price) {
                continue;
            }
            let Some(station) = snapshot.station(key.station_id) else {
                self.logger.warn(&format!(
                    "Station {} not found in price data, not writing {}",
                    key.station_id, key
                ));
                continue;
            };
            let (name, address) = (station.name.clone(), station.address.clone());
            self.logger.info(&format!(
                "Price change for {} ({}): {:?} -> {}",
                key,
                name,
                self.cache.get(key),
                point.price
            ));
            batch.push(PriceRecord {
                station_id: key.station_id,
                station_name: name,
                station_address: address,
                fuel_type: key.fuel_type.clone(),
                price: point.price,
            });

            match self.policy {
                CachePolicy::UpdateBeforeWrite => self.cache.set(key.clone(), point.price),
                CachePolicy::UpdateAfterConfirmedWrite => pending.push((key.clone(), point.price)),
            }
        }
        (batch, pending)
    }

    async fn publish(&self, snapshot: &Snapshot, keys: &[PriceKey], report: &mut CycleReport) {
        if !self.mirror.is_connected() {
            return;
        }
        for key in keys {
            let Some(point) = snapshot.price(key) else {
                continue;
            };
            let name = snapshot
                .station(key.station_id)
                .map(|s| s.name.clone())
                .unwrap_or_else(|| format!("Station {}", key.station_id));
            if self
                .mirror
                .publish_discovery(key.station_id, &name, &key.fuel_type)
                .await
            {
                report.published_discovery += 1;
            }
            if self
                .mirror
                .publish_state(key.station_id, &key.fuel_type, point.price)
                .await
            {
                report.published_states += 1;
            }
        }
    }

    fn finish(&mut self, report: CycleReport) -> CycleReport {
        self.logger.info(&format!(
            "Cycle {:?}: {} changed, {} written, {} states published, {} missing",
            report.outcome,
            report.changed,
            report.written,
            report.published_states,
            report.skipped_missing
        ));
        self.last_report = Some(report.clone());
        self.snapshot_tx.send_replace(Arc::new(MonitorSnapshot {
            prices: self.latest.clone(),
            last_report: self.last_report.clone(),
            counters: self.counters,
            cache_size: self.cache.len(),
            stations: self.monitored.clone(),
        }));
        // No subscribers is fine
        let _ = self.events_tx.send(CycleEvent {
            report: report.clone(),
            counters: self.counters,
        });
        report
    }

    /// Release the sink and the mirror
    pub async fn close(&self) {
        self.sink.close().await;
        self.mirror.close().await;
    }
}

#[async_trait]
impl Tick for Monitor {
    async fn tick(&mut self) {
        self.run_cycle().await;
    }
}

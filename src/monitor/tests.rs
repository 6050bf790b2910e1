use super::*;
use crate::error::{FuelWatchError, Result};
use crate::publish::DisabledPublisher;
use crate::sink::{HistoryQuery, RecordedPrice};
use crate::source::{PricePoint, Station};
use crate::store::StaticStations;
use chrono::DateTime;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

struct FixedSource {
    prices: Mutex<Vec<(PriceKey, f64)>>,
    // Station left out of the snapshot's station list
    unlisted: Option<u32>,
}

impl FixedSource {
    fn new(prices: &[(u32, &str, f64)]) -> Self {
        let source = Self {
            prices: Mutex::new(Vec::new()),
            unlisted: None,
        };
        source.set(prices);
        source
    }

    fn set(&self, prices: &[(u32, &str, f64)]) {
        *self.prices.lock().unwrap() = prices
            .iter()
            .map(|(id, fuel, price)| (PriceKey::new(*id, *fuel), *price))
            .collect();
    }
}

#[async_trait]
impl PriceSource for FixedSource {
    async fn fetch(&self) -> Result<Snapshot> {
        let prices = self.prices.lock().unwrap().clone();
        let stations = prices
            .iter()
            .filter(|(k, _)| Some(k.station_id) != self.unlisted)
            .map(|(k, _)| Station {
                id: k.station_id,
                name: format!("Station {}", k.station_id),
                address: "1 Main St".into(),
                brand: None,
            });
        let points = prices.iter().map(|(k, p)| {
            (
                k.clone(),
                PricePoint {
                    price: *p,
                    last_updated: None,
                },
            )
        });
        Ok(Snapshot::from_parts(stations.collect::<Vec<_>>(), points))
    }
}

#[derive(Default)]
struct FlakySink {
    fail_writes: AtomicBool,
    writes: Mutex<Vec<usize>>,
}

#[async_trait]
impl TimeSeriesSink for FlakySink {
    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }

    async fn write_points(&self, points: &[PriceRecord], _ts: DateTime<Utc>) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(FuelWatchError::sink_write("bucket not found"));
        }
        self.writes.lock().unwrap().push(points.len());
        Ok(())
    }

    async fn recent_points(&self, _limit: usize) -> Result<Vec<RecordedPrice>> {
        Ok(Vec::new())
    }

    async fn history(&self, _query: &HistoryQuery) -> Result<Vec<RecordedPrice>> {
        Ok(Vec::new())
    }
}

struct BrokenStations;

impl StationProvider for BrokenStations {
    fn load_stations(&self) -> Result<Vec<MonitoredStation>> {
        Err(FuelWatchError::config_reload("database is locked"))
    }
}

fn station(id: u32, fuels: &[&str]) -> MonitoredStation {
    MonitoredStation {
        station_id: id,
        fuel_types: fuels.iter().map(|s| s.to_string()).collect(),
    }
}

fn monitor(
    source: Arc<FixedSource>,
    sink: Arc<FlakySink>,
    stations: Arc<dyn StationProvider>,
) -> Monitor {
    Monitor::new(
        source,
        sink,
        HomeAssistantMirror::new(Arc::new(DisabledPublisher), "homeassistant"),
        stations,
        ChangeCache::new(),
    )
}

#[tokio::test]
async fn confirmed_write_policy_retries_after_failure() {
    let source = Arc::new(FixedSource::new(&[(350, "E10", 150.9)]));
    let sink = Arc::new(FlakySink::default());
    sink.fail_writes.store(true, Ordering::SeqCst);
    let mut monitor = monitor(
        source,
        sink.clone(),
        Arc::new(StaticStations::new(vec![station(350, &["E10"])])),
    )
    .with_cache_policy(CachePolicy::UpdateAfterConfirmedWrite);

    let first = monitor.run_cycle().await;
    assert_eq!(first.changed, 1);
    assert!(first.write_error.is_some());
    assert!(monitor.cache().is_empty());

    sink.fail_writes.store(false, Ordering::SeqCst);
    let second = monitor.run_cycle().await;
    assert_eq!(second.written, 1);
    assert_eq!(monitor.cache().get(&PriceKey::new(350, "E10")), Some(150.9));
    assert_eq!(monitor.counters().failed_writes, 1);
}

#[tokio::test]
async fn optimistic_policy_suppresses_retry_after_failed_write() {
    let source = Arc::new(FixedSource::new(&[(350, "E10", 150.9)]));
    let sink = Arc::new(FlakySink::default());
    sink.fail_writes.store(true, Ordering::SeqCst);
    let mut monitor = monitor(
        source,
        sink.clone(),
        Arc::new(StaticStations::new(vec![station(350, &["E10"])])),
    );

    let first = monitor.run_cycle().await;
    assert_eq!(first.outcome, CycleOutcome::Completed);
    assert_eq!(monitor.cache().get(&PriceKey::new(350, "E10")), Some(150.9));

    sink.fail_writes.store(false, Ordering::SeqCst);
    let second = monitor.run_cycle().await;
    assert_eq!(second.changed, 0);
    assert!(sink.writes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn failed_reload_keeps_previous_stations() {
    let source = Arc::new(FixedSource::new(&[(350, "E10", 150.9)]));
    let sink = Arc::new(FlakySink::default());
    let mut monitor = monitor(source, sink.clone(), Arc::new(BrokenStations))
        .with_initial_stations(vec![station(350, &["E10"])]);

    let report = monitor.run_cycle().await;
    assert_eq!(report.written, 1);
    assert_eq!(monitor.monitored_stations().len(), 1);
}

#[tokio::test]
async fn duplicate_fuel_codes_are_written_once() {
    let source = Arc::new(FixedSource::new(&[(350, "E10", 150.9)]));
    let sink = Arc::new(FlakySink::default());
    let mut monitor = monitor(
        source,
        sink.clone(),
        Arc::new(StaticStations::new(vec![station(350, &["E10", "E10"])])),
    )
    .with_cache_policy(CachePolicy::UpdateAfterConfirmedWrite);

    monitor.run_cycle().await;
    assert_eq!(*sink.writes.lock().unwrap(), vec![1]);
}

#[tokio::test]
async fn watchers_see_latest_snapshot_after_each_tick() {
    let source = Arc::new(FixedSource::new(&[(350, "E10", 150.9)]));
    let sink = Arc::new(FlakySink::default());
    let mut monitor = monitor(
        source.clone(),
        sink,
        Arc::new(StaticStations::new(vec![station(350, &["E10"])])),
    );
    let rx = monitor.subscribe();
    let mut events = monitor.event_sender().subscribe();
    assert!(rx.borrow().prices.is_none());

    monitor.run_cycle().await;
    source.set(&[(350, "E10", 152.3)]);
    monitor.run_cycle().await;

    let view = rx.borrow().clone();
    let prices = view.prices.as_ref().unwrap();
    assert_eq!(prices.price(&PriceKey::new(350, "E10")).unwrap().price, 152.3);
    assert_eq!(view.counters.total_cycles, 2);
    assert_eq!(view.cache_size, 1);

    let first = events.recv().await.unwrap();
    assert_eq!(first.counters.total_cycles, 1);
}

#[tokio::test]
async fn price_for_unknown_station_is_not_written() {
    let mut source = FixedSource::new(&[(350, "E10", 150.9), (17, "U91", 158.4)]);
    source.unlisted = Some(17);
    let sink = Arc::new(FlakySink::default());
    let mut monitor = monitor(
        Arc::new(source),
        sink.clone(),
        Arc::new(StaticStations::new(vec![
            station(350, &["E10"]),
            station(17, &["U91"]),
        ])),
    );

    let report = monitor.run_cycle().await;
    assert_eq!(report.written, 1);
    assert_eq!(*sink.writes.lock().unwrap(), vec![1]);
    assert!(monitor.cache().get(&PriceKey::new(17, "U91")).is_none());
}

#[tokio::test]
async fn non_finite_price_is_ignored() {
    let source = Arc::new(FixedSource::new(&[(350, "E10", f64::NAN), (350, "P98", 165.0)]));
    let sink = Arc::new(FlakySink::default());
    let mut monitor = monitor(
        source,
        sink.clone(),
        Arc::new(StaticStations::new(vec![station(350, &["E10", "P98"])])),
    );

    let report = monitor.run_cycle().await;
    assert_eq!(report.changed, 1);
    assert!(monitor.cache().get(&PriceKey::new(350, "E10")).is_none());
}

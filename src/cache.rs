//! Change cache: last price known to have been handed to the sink per key
//!
//! The cache suppresses redundant writes. It is owned by the monitor and
//! mutated only from the update cycle.

use crate::fuel::PriceKey;
use crate::logging::get_logger;
use crate::sink::{RecordedPrice, TimeSeriesSink};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Absolute tolerance under which two prices are considered equal
pub const PRICE_EPSILON: f64 = 0.001;

/// True when `current` must be written given the cached `last` value
pub fn price_changed(last: Option<f64>, current: f64) -> bool {
    match last {
        None => true,
        Some(last) => (current - last).abs() > PRICE_EPSILON,
    }
}

/// When the cache is updated relative to the sink write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Update as soon as a change is detected. A failed write is not retried
    /// until the price moves again.
    #[default]
    UpdateBeforeWrite,
    /// Update only after the sink confirmed the batch. A failed write is
    /// retried on every tick until it succeeds.
    UpdateAfterConfirmedWrite,
}

#[derive(Debug, Clone, Default)]
pub struct ChangeCache {
    entries: HashMap<PriceKey, f64>,
}

impl ChangeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from sink records ordered newest first; the first record per
    /// key wins.
    pub fn from_recent<I>(records: I) -> Self
    where
        I: IntoIterator<Item = RecordedPrice>,
    {
        let mut entries = HashMap::new();
        for record in records {
            entries
                .entry(PriceKey::new(record.station_id, record.fuel_type))
                .or_insert(record.price);
        }
        Self { entries }
    }

    /// Seed from the sink's most recent `window` points. An unreachable sink
    /// yields an empty cache.
    pub async fn seed(sink: &dyn TimeSeriesSink, window: usize) -> Self {
        let logger = get_logger("cache");
        match sink.recent_points(window).await {
            Ok(records) => {
                let cache = Self::from_recent(records);
                logger.info(&format!("Loaded {} cached prices", cache.len()));
                cache
            }
            Err(e) => {
                logger.warn(&format!(
                    "Could not seed price cache, every key counts as changed: {}",
                    e
                ));
                Self::new()
            }
        }
    }

    pub fn get(&self, key: &PriceKey) -> Option<f64> {
        self.entries.get(key).copied()
    }

    pub fn set(&mut self, key: PriceKey, price: f64) {
        self.entries.insert(key, price);
    }

    pub fn is_changed(&self, key: &PriceKey, price: f64) -> bool {
        price_changed(self.get(key), price)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn record(station_id: u32, fuel: &str, price: f64, age_min: i64) -> RecordedPrice {
        RecordedPrice {
            time: Utc::now() - Duration::minutes(age_min),
            station_id,
            fuel_type: fuel.to_string(),
            price,
        }
    }

    #[test]
    fn epsilon_threshold() {
        assert!(!price_changed(Some(150.9), 150.901));
        assert!(price_changed(Some(150.9), 151.5));
        assert!(price_changed(None, 150.9));
        assert!(!price_changed(Some(150.9), 150.9));
    }

    #[test]
    fn first_record_per_key_wins() {
        let cache = ChangeCache::from_recent(vec![
            record(350, "E10", 152.1, 1),
            record(350, "E10", 149.0, 60),
            record(350, "P98", 170.0, 5),
        ]);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&PriceKey::new(350, "E10")), Some(152.1));
        assert_eq!(cache.get(&PriceKey::new(350, "P98")), Some(170.0));
    }

    #[test]
    fn set_and_is_changed() {
        let mut cache = ChangeCache::new();
        let key = PriceKey::new(1, "U91");
        assert!(cache.is_changed(&key, 180.0));
        cache.set(key.clone(), 180.0);
        assert!(!cache.is_changed(&key, 180.0005));
        assert!(cache.is_changed(&key, 179.9));
    }
}

//! Price source abstraction and the per-tick snapshot
//!
//! A [`PriceSource`] returns a complete [`Snapshot`] on demand. The snapshot
//! is reshaped into two lookup maps so the update cycle can answer
//! "station by id" and "price by (station, fuel)" in O(1).

pub mod nsw;

use crate::error::Result;
use crate::fuel::{PriceKey, StationId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

pub use nsw::NswFuelClient;

/// A fuel station as reported by the source in one fetch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Station {
    pub id: StationId,
    pub name: String,
    pub address: String,
    pub brand: Option<String>,
}

/// One observed price. Absence from a snapshot means "currently unknown".
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PricePoint {
    /// Cents per litre (or per kWh for EV), fractional
    pub price: f64,
    /// When the source last saw this price change
    pub last_updated: Option<DateTime<Utc>>,
}

/// One fetch cycle's complete view of stations and prices
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub stations: HashMap<StationId, Station>,
    pub prices: HashMap<PriceKey, PricePoint>,
    pub fetched_at: DateTime<Utc>,
}

impl Snapshot {
    /// Reshape flat source output into lookup maps. Duplicate station ids or
    /// price keys are resolved last-write-wins.
    pub fn from_parts<S, P>(stations: S, prices: P) -> Self
    where
        S: IntoIterator<Item = Station>,
        P: IntoIterator<Item = (PriceKey, PricePoint)>,
    {
        Self {
            stations: stations.into_iter().map(|s| (s.id, s)).collect(),
            prices: prices.into_iter().collect(),
            fetched_at: Utc::now(),
        }
    }

    pub fn station(&self, id: StationId) -> Option<&Station> {
        self.stations.get(&id)
    }

    pub fn price(&self, key: &PriceKey) -> Option<&PricePoint> {
        self.prices.get(key)
    }
}

/// Capability returning a complete price snapshot, or a tagged failure
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch(&self) -> Result<Snapshot>;
}

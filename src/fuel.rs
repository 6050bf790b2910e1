//! Fuel type codes and price keys

use crate::error::{FuelWatchError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Numeric station identifier as used by the price source
pub type StationId = u32;

/// Closed set of fuel codes published by NSW FuelCheck
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FuelType {
    E10,
    U91,
    E85,
    P95,
    P98,
    DL,
    PDL,
    B20,
    LPG,
    CNG,
    EV,
}

impl FuelType {
    pub const ALL: [FuelType; 11] = [
        FuelType::E10,
        FuelType::U91,
        FuelType::E85,
        FuelType::P95,
        FuelType::P98,
        FuelType::DL,
        FuelType::PDL,
        FuelType::B20,
        FuelType::LPG,
        FuelType::CNG,
        FuelType::EV,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::E10 => "E10",
            Self::U91 => "U91",
            Self::E85 => "E85",
            Self::P95 => "P95",
            Self::P98 => "P98",
            Self::DL => "DL",
            Self::PDL => "PDL",
            Self::B20 => "B20",
            Self::LPG => "LPG",
            Self::CNG => "CNG",
            Self::EV => "EV",
        }
    }

    /// True when `code` names one of the known fuel types (case-sensitive)
    pub fn is_known(code: &str) -> bool {
        code.parse::<FuelType>().is_ok()
    }

    /// Codes from `codes` that are not known fuel types
    pub fn unknown_codes<'a, I>(codes: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        codes
            .into_iter()
            .filter(|c| !Self::is_known(c))
            .cloned()
            .collect()
    }
}

impl fmt::Display for FuelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FuelType {
    type Err = FuelWatchError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|ft| ft.as_str() == s)
            .ok_or_else(|| FuelWatchError::validation("fuel_type", format!("unknown code {}", s)))
    }
}

/// Identity of one price series: (station, fuel code).
///
/// The fuel code stays a string so that configured codes the source does not
/// return simply never match, instead of failing a tick.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PriceKey {
    pub station_id: StationId,
    pub fuel_type: String,
}

impl PriceKey {
    pub fn new(station_id: StationId, fuel_type: impl Into<String>) -> Self {
        Self {
            station_id,
            fuel_type: fuel_type.into(),
        }
    }
}

impl fmt::Display for PriceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.station_id, self.fuel_type)
    }
}

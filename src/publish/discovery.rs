//! Home Assistant MQTT discovery topics and payloads

use crate::error::Result;
use crate::fuel::StationId;
use serde::Serialize;

const MANUFACTURER: &str = "NSW FuelCheck";
const MODEL: &str = "Fuel Station Monitor";

/// `<prefix>/sensor/fuelapp/fuelapp_<id>_<fuel>/config`
pub fn discovery_topic(prefix: &str, station_id: StationId, fuel_type: &str) -> String {
    format!(
        "{}/sensor/fuelapp/{}/config",
        prefix,
        unique_id(station_id, fuel_type)
    )
}

/// `fuelapp/sensor/<id>/<fuel>/state`
pub fn state_topic(station_id: StationId, fuel_type: &str) -> String {
    format!("fuelapp/sensor/{}/{}/state", station_id, fuel_type)
}

/// Price as a plain number string; whole values keep one decimal place
pub fn format_state(price: f64) -> String {
    if price.is_finite() && price.fract() == 0.0 {
        format!("{:.1}", price)
    } else {
        format!("{}", price)
    }
}

fn unique_id(station_id: StationId, fuel_type: &str) -> String {
    format!("fuelapp_{}_{}", station_id, fuel_type)
}

// Quotes break Home Assistant entity names
fn sanitize_name(name: &str) -> String {
    name.chars().filter(|c| *c != '"' && *c != '\'').collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub identifiers: Vec<String>,
    pub name: String,
    pub manufacturer: &'static str,
    pub model: &'static str,
    pub sw_version: &'static str,
}

/// Discovery config for one sensor. Field order is the serialized key order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveryPayload {
    pub name: String,
    pub unique_id: String,
    pub state_topic: String,
    pub unit_of_measurement: &'static str,
    pub device_class: &'static str,
    pub icon: &'static str,
    pub device: DeviceInfo,
}

impl DiscoveryPayload {
    pub fn new(station_id: StationId, station_name: &str, fuel_type: &str) -> Self {
        Self {
            name: format!("{} Price", fuel_type),
            unique_id: unique_id(station_id, fuel_type),
            state_topic: state_topic(station_id, fuel_type),
            unit_of_measurement: "¢",
            device_class: "monetary",
            icon: "mdi:gas-station",
            device: DeviceInfo {
                identifiers: vec![format!("fuelapp_{}", station_id)],
                name: sanitize_name(station_name),
                manufacturer: MANUFACTURER,
                model: MODEL,
                sw_version: env!("CARGO_PKG_VERSION"),
            },
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

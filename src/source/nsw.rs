//! NSW FuelCheck HTTP client

use super::{PricePoint, PriceSource, Snapshot, Station};
use crate::config::SourceConfig;
use crate::error::{FuelWatchError, Result};
use crate::fuel::{PriceKey, StationId};
use crate::logging::{StructuredLogger, get_logger};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use std::time::Duration;

const TIMESTAMP_FORMAT: &str = "%d/%m/%Y %I:%M:%S %p";

#[derive(Debug, Deserialize)]
struct RawResponse {
    #[serde(default)]
    stations: Vec<RawStation>,
    #[serde(default)]
    prices: Vec<RawPrice>,
}

#[derive(Debug, Deserialize)]
struct RawStation {
    #[serde(deserialize_with = "station_code")]
    code: StationId,
    name: String,
    #[serde(default)]
    address: String,
    #[serde(default)]
    brand: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPrice {
    #[serde(deserialize_with = "station_code")]
    stationcode: StationId,
    fueltype: String,
    price: f64,
    #[serde(default)]
    lastupdated: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CodeRepr {
    Number(u64),
    Text(String),
}

// Station codes arrive as numbers or numeric strings depending on endpoint
fn station_code<'de, D>(deserializer: D) -> std::result::Result<StationId, D::Error>
where
    D: Deserializer<'de>,
{
    match CodeRepr::deserialize(deserializer)? {
        CodeRepr::Number(n) => StationId::try_from(n).map_err(D::Error::custom),
        CodeRepr::Text(s) => s.trim().parse().map_err(D::Error::custom),
    }
}

/// Parse a FuelCheck `lastupdated` value (Sydney local time)
pub fn parse_last_updated(value: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT).ok()?;
    chrono_tz::Australia::Sydney
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

impl RawResponse {
    fn into_snapshot(self) -> Snapshot {
        let stations = self.stations.into_iter().map(|s| Station {
            id: s.code,
            name: s.name,
            address: s.address,
            brand: s.brand.filter(|b| !b.is_empty()),
        });
        let prices = self.prices.into_iter().map(|p| {
            (
                PriceKey::new(p.stationcode, p.fueltype),
                PricePoint {
                    price: p.price,
                    last_updated: p.lastupdated.as_deref().and_then(parse_last_updated),
                },
            )
        });
        Snapshot::from_parts(stations, prices)
    }
}

// FuelCheck reports failures either as errorDetails or a top-level message
fn api_error_message(body: &serde_json::Value) -> Option<String> {
    if let Some(details) = body.get("errorDetails") {
        let msg = details
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("FuelCheck API error");
        return Some(msg.to_string());
    }
    if body.get("stations").is_none() && body.get("prices").is_none() {
        let msg = body
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("response missing stations and prices");
        return Some(msg.to_string());
    }
    None
}

/// Client for the public FuelCheck price endpoint
pub struct NswFuelClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    logger: StructuredLogger,
}

impl NswFuelClient {
    pub fn new(cfg: &SourceConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs.max(1)))
            .build()?;
        let logger = get_logger("source");
        logger.info(&format!("FuelCheck client initialized for {}", cfg.base_url));
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: Some(cfg.api_key.trim().to_string()).filter(|k| !k.is_empty()),
            logger,
        })
    }

    fn prices_url(&self) -> String {
        format!("{}/prices", self.base_url)
    }
}

#[async_trait]
impl PriceSource for NswFuelClient {
    async fn fetch(&self) -> Result<Snapshot> {
        self.logger.info("Fetching fuel price data from FuelCheck");

        let mut request = self
            .http
            .get(self.prices_url())
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, concat!("fuelwatch/", env!("CARGO_PKG_VERSION")))
            .header("transactionid", uuid::Uuid::new_v4().to_string())
            .header(
                "requesttimestamp",
                Utc::now().format(TIMESTAMP_FORMAT).to_string(),
            );
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| FuelWatchError::unexpected_fetch(format!("request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(FuelWatchError::source_fetch(format!(
                "FuelCheck API returned {}: {}",
                status, snippet
            )));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| FuelWatchError::unexpected_fetch(format!("invalid JSON: {}", e)))?;
        if let Some(msg) = api_error_message(&body) {
            return Err(FuelWatchError::source_fetch(msg));
        }

        let raw: RawResponse = serde_json::from_value(body)
            .map_err(|e| FuelWatchError::unexpected_fetch(format!("unexpected payload: {}", e)))?;
        let snapshot = raw.into_snapshot();

        self.logger.info(&format!(
            "Fetched data for {} stations with {} price points",
            snapshot.stations.len(),
            snapshot.prices.len()
        ));
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn station_codes_accept_numbers_and_strings() {
        let raw: RawResponse = serde_json::from_str(
            r#"{
                "stations": [
                    {"code": 350, "name": "A", "address": "x"},
                    {"code": "17", "name": "B"}
                ],
                "prices": [
                    {"stationcode": "350", "fueltype": "E10", "price": 150.9}
                ]
            }"#,
        )
        .unwrap();
        let snap = raw.into_snapshot();
        assert!(snap.station(350).is_some());
        assert_eq!(snap.station(17).unwrap().address, "");
        assert_eq!(snap.price(&PriceKey::new(350, "E10")).unwrap().price, 150.9);
    }

    #[test]
    fn parses_sydney_local_timestamps() {
        // 10:30 AEST (UTC+10) in July
        let ts = parse_last_updated("15/07/2024 10:30:00 AM").unwrap();
        assert_eq!(ts.hour(), 0);
        assert_eq!(ts.minute(), 30);
        assert!(parse_last_updated("yesterday").is_none());
    }

    #[test]
    fn error_bodies_are_recognised() {
        let body = serde_json::json!({"errorDetails": {"code": "E0", "message": "Invalid API key"}});
        assert_eq!(api_error_message(&body).unwrap(), "Invalid API key");
        let ok = serde_json::json!({"stations": [], "prices": []});
        assert!(api_error_message(&ok).is_none());
    }
}

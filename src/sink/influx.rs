//! InfluxDB v2 HTTP sink

use super::line_protocol::encode_batch;
use super::{HistoryQuery, MEASUREMENT, PriceRecord, RecordedPrice, TimeSeriesSink};
use crate::config::InfluxConfig;
use crate::error::{FuelWatchError, Result};
use crate::logging::{StructuredLogger, get_logger};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// How far back the seed query looks
const SEED_RANGE: &str = "-30d";

/// Quote `value` as a Flux string literal
pub fn flux_string(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Flux for the newest `limit` price points across all series
pub fn recent_points_flux(bucket: &str, limit: usize) -> String {
    format!(
        "from(bucket: {bucket}) |> range(start: {SEED_RANGE}) \
         |> filter(fn: (r) => r._measurement == {measurement} and r._field == \"price\") \
         |> group() |> sort(columns: [\"_time\"], desc: true) |> limit(n: {limit})",
        bucket = flux_string(bucket),
        measurement = flux_string(MEASUREMENT),
    )
}

/// Flux for a filtered, chronologically sorted history
pub fn history_flux(bucket: &str, query: &HistoryQuery) -> String {
    let mut flux = format!(
        "from(bucket: {}) |> range(start: -{}d) |> filter(fn: (r) => r._measurement == {})",
        flux_string(bucket),
        query.days,
        flux_string(MEASUREMENT)
    );
    if let Some(id) = query.station_id {
        flux.push_str(&format!(
            " |> filter(fn: (r) => r.station_id == {})",
            flux_string(&id.to_string())
        ));
    }
    if let Some(fuel) = &query.fuel_type {
        flux.push_str(&format!(
            " |> filter(fn: (r) => r.fuel_type == {})",
            flux_string(fuel)
        ));
    }
    flux.push_str(" |> filter(fn: (r) => r._field == \"price\") |> group() |> sort(columns: [\"_time\"])");
    flux
}

/// Parse an annotation-free Flux CSV response into price records.
///
/// Rows that repeat the header (one per result table) and rows missing a
/// usable time, station or value are skipped.
pub fn parse_query_csv(body: &str) -> Result<Vec<RecordedPrice>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_reader(body.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| FuelWatchError::sink_query(format!("invalid CSV header: {}", e)))?
        .clone();
    let column = |name: &str| headers.iter().position(|h| h == name);
    let (Some(time_idx), Some(value_idx), Some(station_idx), Some(fuel_idx)) = (
        column("_time"),
        column("_value"),
        column("station_id"),
        column("fuel_type"),
    ) else {
        return Ok(Vec::new());
    };

    let mut out = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| FuelWatchError::sink_query(format!("invalid CSV row: {}", e)))?;
        let field = |idx: usize| row.get(idx).unwrap_or("").trim();
        if field(time_idx) == "_time" {
            continue;
        }
        let Ok(time) = DateTime::parse_from_rfc3339(field(time_idx)) else {
            continue;
        };
        let (Ok(station_id), Ok(price)) = (field(station_idx).parse(), field(value_idx).parse())
        else {
            continue;
        };
        out.push(RecordedPrice {
            time: time.with_timezone(&Utc),
            station_id,
            fuel_type: field(fuel_idx).to_string(),
            price,
        });
    }
    Ok(out)
}

/// Writes price batches to InfluxDB v2 and reads them back with Flux
pub struct InfluxWriter {
    http: reqwest::Client,
    url: String,
    token: String,
    org: String,
    bucket: String,
    connected: AtomicBool,
    logger: StructuredLogger,
}

impl InfluxWriter {
    pub fn new(cfg: &InfluxConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs.max(1)))
            .build()?;
        let logger = get_logger("influxdb");
        logger.info(&format!(
            "InfluxDB writer initialized for {}/{}",
            cfg.url, cfg.bucket
        ));
        Ok(Self {
            http,
            url: cfg.url.trim_end_matches('/').to_string(),
            token: cfg.token.clone(),
            org: cfg.org.clone(),
            bucket: cfg.bucket.clone(),
            connected: AtomicBool::new(false),
            logger,
        })
    }

    fn auth_header(&self) -> String {
        format!("Token {}", self.token)
    }

    async fn check_health(&self) -> Result<()> {
        let resp = self
            .http
            .get(format!("{}/health", self.url))
            .send()
            .await
            .map_err(|e| FuelWatchError::network(format!("InfluxDB unreachable: {}", e)))?;
        let body: serde_json::Value = resp.json().await?;
        match body.get("status").and_then(|s| s.as_str()) {
            Some("pass") => Ok(()),
            _ => Err(FuelWatchError::network(format!(
                "InfluxDB health check failed: {}",
                body.get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("unknown")
            ))),
        }
    }

    async fn query_csv(&self, flux: String) -> Result<String> {
        let resp = self
            .http
            .post(format!("{}/api/v2/query", self.url))
            .query(&[("org", self.org.as_str())])
            .header(AUTHORIZATION, self.auth_header())
            .header(ACCEPT, "application/csv")
            .json(&serde_json::json!({
                "query": flux,
                "type": "flux",
                "dialect": {"header": true, "annotations": [], "delimiter": ","}
            }))
            .send()
            .await
            .map_err(|e| FuelWatchError::sink_query(e.to_string()))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| FuelWatchError::sink_query(e.to_string()))?;
        if !status.is_success() {
            return Err(FuelWatchError::sink_query(format!(
                "InfluxDB query returned {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }
        Ok(body)
    }
}

#[async_trait]
impl TimeSeriesSink for InfluxWriter {
    async fn connect(&self) -> Result<()> {
        let result = self.check_health().await;
        self.connected.store(result.is_ok(), Ordering::SeqCst);
        match &result {
            Ok(()) => self.logger.info("Successfully connected to InfluxDB"),
            Err(e) => self
                .logger
                .error(&format!("Failed to connect to InfluxDB: {}", e)),
        }
        result
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn write_points(&self, points: &[PriceRecord], timestamp: DateTime<Utc>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let body = encode_batch(points, timestamp);
        if body.is_empty() {
            self.logger
                .warn("No encodable price points in batch, nothing written");
            return Ok(());
        }
        let resp = self
            .http
            .post(format!("{}/api/v2/write", self.url))
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", self.bucket.as_str()),
                ("precision", "ns"),
            ])
            .header(AUTHORIZATION, self.auth_header())
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await
            .map_err(|e| FuelWatchError::sink_write(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(FuelWatchError::sink_write(format!(
                "InfluxDB write returned {}: {}",
                status,
                text.chars().take(200).collect::<String>()
            )));
        }
        self.logger.info(&format!(
            "Successfully wrote {} price points to InfluxDB",
            points.len()
        ));
        Ok(())
    }

    async fn recent_points(&self, limit: usize) -> Result<Vec<RecordedPrice>> {
        let body = self.query_csv(recent_points_flux(&self.bucket, limit)).await?;
        parse_query_csv(&body)
    }

    async fn history(&self, query: &HistoryQuery) -> Result<Vec<RecordedPrice>> {
        let body = self.query_csv(history_flux(&self.bucket, query)).await?;
        parse_query_csv(&body)
    }

    async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.logger.info("InfluxDB connection closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flux_strings_are_escaped() {
        assert_eq!(flux_string("fuel"), "\"fuel\"");
        assert_eq!(flux_string("a\"b\\c"), "\"a\\\"b\\\\c\"");
    }

    #[test]
    fn history_flux_includes_filters() {
        let flux = history_flux(
            "fuel_prices",
            &HistoryQuery {
                station_id: Some(350),
                fuel_type: Some("E10".into()),
                days: 7,
            },
        );
        assert!(flux.contains("range(start: -7d)"));
        assert!(flux.contains("r.station_id == \"350\""));
        assert!(flux.contains("r.fuel_type == \"E10\""));
    }

    #[test]
    fn recent_flux_limits_and_sorts_descending() {
        let flux = recent_points_flux("fuel_prices", 50);
        assert!(flux.contains("limit(n: 50)"));
        assert!(flux.contains("desc: true"));
    }

    #[test]
    fn parses_csv_with_repeated_headers_and_quoted_tags() {
        let body = "\
,result,table,_start,_stop,_time,_value,_field,_measurement,fuel_type,station_address,station_id,station_name\r\n\
,_result,0,2024-01-01T00:00:00Z,2024-01-31T00:00:00Z,2024-01-30T10:00:00Z,150.9,price,fuel_price,E10,\"1 Main St, Ryde\",350,Metro\r\n\
\r\n\
,result,table,_start,_stop,_time,_value,_field,_measurement,fuel_type,station_address,station_id,station_name\r\n\
,_result,1,2024-01-01T00:00:00Z,2024-01-31T00:00:00Z,2024-01-30T09:00:00Z,165,price,fuel_price,P98,\"1 Main St, Ryde\",350,Metro\r\n";
        let rows = parse_query_csv(body).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].station_id, 350);
        assert_eq!(rows[0].fuel_type, "E10");
        assert_eq!(rows[0].price, 150.9);
        assert_eq!(rows[1].price, 165.0);
    }

    #[test]
    fn empty_body_yields_no_rows() {
        assert!(parse_query_csv("").unwrap().is_empty());
    }
}

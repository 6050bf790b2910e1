//! InfluxDB line protocol encoding for price batches

use super::{MEASUREMENT, PriceRecord};
use chrono::{DateTime, Utc};

fn escape_measurement(value: &str) -> String {
    value.replace(',', "\\,").replace(' ', "\\ ")
}

// Tag keys and values: commas, equals signs and spaces are escaped
fn escape_tag(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
        .replace('\n', "\\n")
}

/// Encode one record. Tags with empty values are omitted; line protocol
/// does not allow them. Non-finite prices have no encoding and yield `None`.
pub fn encode_record(record: &PriceRecord, timestamp_ns: i64) -> Option<String> {
    if !record.price.is_finite() {
        return None;
    }
    let station_id = record.station_id.to_string();
    let tags = [
        ("station_id", station_id.as_str()),
        ("station_name", record.station_name.as_str()),
        ("station_address", record.station_address.as_str()),
        ("fuel_type", record.fuel_type.as_str()),
    ];

    let mut line = escape_measurement(MEASUREMENT);
    for (key, value) in tags {
        if value.trim().is_empty() {
            continue;
        }
        line.push(',');
        line.push_str(key);
        line.push('=');
        line.push_str(&escape_tag(value));
    }
    line.push_str(" price=");
    line.push_str(&record.price.to_string());
    line.push(' ');
    line.push_str(&timestamp_ns.to_string());
    Some(line)
}

/// Encode a batch sharing `timestamp`, one line per encodable record
pub fn encode_batch(records: &[PriceRecord], timestamp: DateTime<Utc>) -> String {
    let ts = timestamp
        .timestamp_nanos_opt()
        .unwrap_or_else(|| timestamp.timestamp_millis().saturating_mul(1_000_000));
    records
        .iter()
        .filter_map(|r| encode_record(r, ts))
        .collect::<Vec<_>>()
        .join("\n")
}

//! SQLite-backed station and settings store
//!
//! The store is the runtime source of monitored stations. On first start it
//! is bootstrapped from the YAML station list; afterwards the web API edits
//! it and the monitor re-reads it every tick.

use crate::config::MonitoredStation;
use crate::error::{FuelWatchError, Result};
use crate::fuel::StationId;
use crate::logging::{StructuredLogger, get_logger};
use rusqlite::{Connection, params};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA_VERSION: i64 = 1;

/// Source of the monitored station list, consulted once per tick
pub trait StationProvider: Send + Sync {
    fn load_stations(&self) -> Result<Vec<MonitoredStation>>;
}

/// Fixed station list taken from the configuration file
#[derive(Debug, Clone, Default)]
pub struct StaticStations {
    stations: Vec<MonitoredStation>,
}

impl StaticStations {
    pub fn new(stations: Vec<MonitoredStation>) -> Self {
        Self { stations }
    }
}

impl StationProvider for StaticStations {
    fn load_stations(&self) -> Result<Vec<MonitoredStation>> {
        Ok(self.stations.clone())
    }
}

pub struct StationStore {
    conn: Mutex<Connection>,
    logger: StructuredLogger,
}

impl StationStore {
    /// Open (creating if needed) the database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_version (
                 version INTEGER PRIMARY KEY,
                 created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
             );
             CREATE TABLE IF NOT EXISTS settings (
                 key TEXT PRIMARY KEY,
                 value TEXT NOT NULL,
                 updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
             );
             CREATE TABLE IF NOT EXISTS stations (
                 station_id INTEGER PRIMARY KEY,
                 fuel_types TEXT NOT NULL,
                 created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                 updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
             );",
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
            params![SCHEMA_VERSION],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            logger: get_logger("store"),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| FuelWatchError::storage("station store lock poisoned"))
    }

    pub fn schema_version(&self) -> Result<i64> {
        let conn = self.conn()?;
        Ok(conn.query_row("SELECT MAX(version) FROM schema_version", [], |r| {
            r.get(0)
        })?)
    }

    /// All stations ordered by id
    pub fn list_stations(&self) -> Result<Vec<MonitoredStation>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT station_id, fuel_types FROM stations ORDER BY station_id")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, StationId>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (station_id, raw) = row?;
            let fuel_types: Vec<String> = serde_json::from_str(&raw)?;
            out.push(MonitoredStation {
                station_id,
                fuel_types,
            });
        }
        Ok(out)
    }

    /// Insert a new station; an existing id is a validation error
    pub fn add_station(&self, station: &MonitoredStation) -> Result<()> {
        let fuel_types = serde_json::to_string(&station.fuel_types)?;
        let inserted = self.conn()?.execute(
            "INSERT OR IGNORE INTO stations (station_id, fuel_types) VALUES (?1, ?2)",
            params![station.station_id, fuel_types],
        )?;
        if inserted == 0 {
            return Err(FuelWatchError::validation(
                "station_id",
                format!("Station {} already exists", station.station_id),
            ));
        }
        self.logger
            .info(&format!("Added station {}", station.station_id));
        Ok(())
    }

    /// Replace the fuel types of a station. Returns false when not found.
    pub fn update_station(&self, station_id: StationId, fuel_types: &[String]) -> Result<bool> {
        let raw = serde_json::to_string(fuel_types)?;
        let updated = self.conn()?.execute(
            "UPDATE stations SET fuel_types = ?1, updated_at = CURRENT_TIMESTAMP
             WHERE station_id = ?2",
            params![raw, station_id],
        )?;
        Ok(updated > 0)
    }

    /// Returns false when the station did not exist
    pub fn delete_station(&self, station_id: StationId) -> Result<bool> {
        let deleted = self
            .conn()?
            .execute("DELETE FROM stations WHERE station_id = ?1", params![station_id])?;
        if deleted > 0 {
            self.logger.info(&format!("Deleted station {}", station_id));
        }
        Ok(deleted > 0)
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, CURRENT_TIMESTAMP)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn all_settings(&self) -> Result<BTreeMap<String, String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT key, value FROM settings")?;
        let rows = stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?;
        let mut out = BTreeMap::new();
        for row in rows {
            let (k, v) = row?;
            out.insert(k, v);
        }
        Ok(out)
    }

    /// Copy `stations` into an empty store. Returns how many were inserted;
    /// a store that already holds stations is left untouched.
    pub fn seed_from_config(&self, stations: &[MonitoredStation]) -> Result<usize> {
        let mut conn = self.conn()?;
        let existing: i64 = conn.query_row("SELECT COUNT(*) FROM stations", [], |r| r.get(0))?;
        if existing > 0 {
            return Ok(0);
        }

        let tx = conn.transaction()?;
        let mut inserted = 0;
        for station in stations {
            let raw = serde_json::to_string(&station.fuel_types)?;
            inserted += tx.execute(
                "INSERT OR IGNORE INTO stations (station_id, fuel_types) VALUES (?1, ?2)",
                params![station.station_id, raw],
            )?;
        }
        tx.commit()?;
        drop(conn);

        if inserted > 0 {
            self.logger.info(&format!(
                "Seeded station store with {} stations from configuration",
                inserted
            ));
        }
        Ok(inserted)
    }
}

impl StationProvider for StationStore {
    fn load_stations(&self) -> Result<Vec<MonitoredStation>> {
        self.list_stations()
            .map_err(|e| FuelWatchError::config_reload(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station(id: StationId, fuels: &[&str]) -> MonitoredStation {
        MonitoredStation {
            station_id: id,
            fuel_types: fuels.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn add_list_update_delete() {
        let store = StationStore::open_in_memory().unwrap();
        store.add_station(&station(350, &["E10", "P98"])).unwrap();
        store.add_station(&station(17, &["U91"])).unwrap();

        let listed = store.list_stations().unwrap();
        assert_eq!(listed, vec![station(17, &["U91"]), station(350, &["E10", "P98"])]);

        assert!(store.update_station(350, &["DL".to_string()]).unwrap());
        assert!(!store.update_station(999, &["DL".to_string()]).unwrap());
        assert!(store.delete_station(17).unwrap());
        assert!(!store.delete_station(17).unwrap());
        assert_eq!(store.list_stations().unwrap(), vec![station(350, &["DL"])]);
    }

    #[test]
    fn duplicate_station_is_rejected() {
        let store = StationStore::open_in_memory().unwrap();
        store.add_station(&station(350, &["E10"])).unwrap();
        let err = store.add_station(&station(350, &["P98"])).unwrap_err();
        assert!(matches!(err, FuelWatchError::Validation { .. }));
    }

    #[test]
    fn seeding_happens_once() {
        let store = StationStore::open_in_memory().unwrap();
        assert_eq!(store.seed_from_config(&[station(1, &["E10"])]).unwrap(), 1);
        assert_eq!(store.seed_from_config(&[station(2, &["E10"])]).unwrap(), 0);
        assert_eq!(store.load_stations().unwrap().len(), 1);
    }

    #[test]
    fn settings_upsert() {
        let store = StationStore::open_in_memory().unwrap();
        assert!(store.all_settings().unwrap().is_empty());
        store.set_setting("influxdb_url", "http://a").unwrap();
        store.set_setting("influxdb_url", "http://b").unwrap();
        let settings = store.all_settings().unwrap();
        assert_eq!(settings.len(), 1);
        assert_eq!(settings["influxdb_url"], "http://b");
        assert_eq!(store.schema_version().unwrap(), SCHEMA_VERSION);
    }
}

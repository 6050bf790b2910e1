use fuelwatch::cache::CachePolicy;
use fuelwatch::config::{Config, MonitoredStation};
use std::fs;

fn valid() -> Config {
    let mut cfg = Config::default();
    cfg.influxdb.token = "token".into();
    cfg.influxdb.org = "home".into();
    cfg.stations = vec![MonitoredStation {
        station_id: 350,
        fuel_types: vec!["E10".into(), "P98".into()],
    }];
    cfg
}

#[test]
fn serialized_yaml_loads_back() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let path = tmp_dir.path().join("config.yaml");

    let mut cfg = valid();
    cfg.cron_schedule = "*/30 6-22 * * *".to_string();
    cfg.cache_policy = CachePolicy::UpdateAfterConfirmedWrite;
    cfg.logging.file = path.with_extension("log").to_string_lossy().to_string();

    fs::write(&path, serde_yaml::to_string(&cfg).unwrap()).unwrap();
    let loaded = Config::from_file(&path).unwrap();

    assert_eq!(loaded.cron_schedule, "*/30 6-22 * * *");
    assert_eq!(loaded.cache_policy, CachePolicy::UpdateAfterConfirmedWrite);
    assert_eq!(loaded.stations, cfg.stations);
    assert_eq!(loaded.logging.file, cfg.logging.file);
    assert!(loaded.validate().is_ok());
}

#[test]
fn config_validation_errors() {
    let mut cfg = valid();
    cfg.influxdb.url.clear();
    assert!(cfg.validate().is_err());

    cfg = valid();
    cfg.influxdb.bucket = "  ".into();
    assert!(cfg.validate().is_err());

    cfg = valid();
    cfg.stations.clear();
    assert!(cfg.validate().is_err());

    cfg = valid();
    cfg.poll_interval = 0;
    assert!(cfg.validate().is_err());

    cfg = valid();
    cfg.seed_window = 0;
    assert!(cfg.validate().is_err());
}

#[test]
fn unknown_fuel_codes_load_without_error() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    fs::write(
        tmp.path(),
        "influxdb:\n  token: t\n  org: o\nstations:\n  - station_id: 9\n    fuel_types: [E10, KEROSENE]\n",
    )
    .unwrap();
    let cfg = Config::from_file(tmp.path()).unwrap();
    assert_eq!(cfg.stations[0].fuel_types, vec!["E10", "KEROSENE"]);
    assert!(cfg.validate().is_ok());
}

#[test]
fn from_file_with_invalid_yaml_fails() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    fs::write(tmp.path(), b"bad: [unclosed").unwrap();
    let err = Config::from_file(tmp.path()).unwrap_err();
    let msg = format!("{}", err);
    assert!(msg.contains("Serialization error"));
}

#[test]
fn missing_explicit_file_is_an_error() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let err = Config::load(Some(&tmp_dir.path().join("nope.yaml"))).unwrap_err();
    assert!(format!("{}", err).contains("not found"));
}

#[test]
fn db_path_lives_in_data_dir() {
    let mut cfg = Config::default();
    cfg.data_dir = "/data".into();
    assert_eq!(cfg.db_path(), std::path::Path::new("/data/config.db"));
}

use super::*;

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8086".to_string(),
            token: String::new(),
            org: String::new(),
            bucket: "fuel_prices".to_string(),
            timeout_secs: 10,
        }
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: String::new(),
            port: 1883,
            user: String::new(),
            password: String::new(),
            discovery_prefix: "homeassistant".to_string(),
            keep_alive_secs: 60,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.onegov.nsw.gov.au/FuelCheckApp/v1/fuel".to_string(),
            api_key: String::new(),
            timeout_secs: 30,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: String::new(),
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            influxdb: InfluxConfig::default(),
            mqtt: MqttConfig::default(),
            source: SourceConfig::default(),
            stations: Vec::new(),
            poll_interval: 60,
            cron_schedule: String::new(),
            timezone: "Australia/Sydney".to_string(),
            logging: LoggingConfig::default(),
            web: WebConfig::default(),
            data_dir: ".".to_string(),
            cache_policy: CachePolicy::default(),
            seed_window: 50,
        }
    }
}

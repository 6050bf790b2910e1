use fuelwatch::config::LoggingConfig;
use fuelwatch::logging::{LogContext, get_logger, get_logger_with_context, init_logging, parse_log_level};
use tracing::Level;

#[test]
fn legacy_level_names_are_accepted() {
    assert_eq!(parse_log_level("WARNING").unwrap(), Level::WARN);
    assert_eq!(parse_log_level("CRITICAL").unwrap(), Level::ERROR);
    assert_eq!(parse_log_level(" debug ").unwrap(), Level::DEBUG);
    assert!(parse_log_level("LOUD").is_err());
}

#[test]
fn console_logging_initializes_and_loggers_emit() {
    let config = LoggingConfig::default();
    assert!(config.file.is_empty());
    init_logging(&config).unwrap();

    let logger = get_logger("monitor");
    logger.info("Test info message");
    logger.debug("Test debug message");
    logger.warn("Test warning message");
    logger.error("Test error message");

    let scoped = get_logger_with_context(LogContext::new("influxdb").with_station_id(350));
    assert_eq!(scoped.format_fields(), "component=influxdb,station_id=350");
}

use crate::error::{FuelWatchError, Result};
use tracing::Level;

/// Parse a configured level. WARNING and CRITICAL are accepted for older
/// configuration files.
pub fn parse_log_level(level_str: &str) -> Result<Level> {
    match level_str.trim().to_uppercase().as_str() {
        "TRACE" => Ok(Level::TRACE),
        "DEBUG" => Ok(Level::DEBUG),
        "INFO" => Ok(Level::INFO),
        "WARN" | "WARNING" => Ok(Level::WARN),
        "ERROR" | "CRITICAL" => Ok(Level::ERROR),
        _ => Err(FuelWatchError::config(format!(
            "Invalid log level: {}",
            level_str
        ))),
    }
}

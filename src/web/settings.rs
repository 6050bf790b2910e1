//! Configuration endpoints. Saved values live in the store's settings
//! table and take effect on the next start.

use super::{AppState, error_response};
use crate::config::MASKED;
use crate::logging::{get_logger, parse_log_level};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ConfigUpdate {
    pub influxdb_url: Option<String>,
    pub influxdb_token: Option<String>,
    pub influxdb_org: Option<String>,
    pub influxdb_bucket: Option<String>,
    pub poll_interval: Option<i64>,
    pub log_level: Option<String>,
}

impl ConfigUpdate {
    /// Settings rows to write. Blank strings are skipped, as is a token
    /// echoed back in its masked form.
    fn into_settings(self) -> Result<Vec<(&'static str, String)>, Response> {
        let mut out = Vec::new();
        let text_fields = [
            ("influxdb_url", self.influxdb_url),
            ("influxdb_token", self.influxdb_token.filter(|t| t != MASKED)),
            ("influxdb_org", self.influxdb_org),
            ("influxdb_bucket", self.influxdb_bucket),
        ];
        for (key, value) in text_fields {
            if let Some(v) = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
                out.push((key, v));
            }
        }

        if let Some(minutes) = self.poll_interval {
            if minutes < 1 {
                return Err(error_response(
                    StatusCode::BAD_REQUEST,
                    "Poll interval must be at least 1 minute",
                ));
            }
            out.push(("poll_interval", minutes.to_string()));
        }

        if let Some(level) = self.log_level.filter(|l| !l.trim().is_empty()) {
            if parse_log_level(&level).is_err() {
                return Err(error_response(
                    StatusCode::BAD_REQUEST,
                    format!("Invalid log level: {}", level),
                ));
            }
            out.push(("log_level", level.trim().to_uppercase()));
        }
        Ok(out)
    }
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/config", responses(
    (status = 200, description = "Effective configuration with secrets masked")
)))]
pub async fn get_config(State(state): State<AppState>) -> impl IntoResponse {
    let mut config = (*state.config).clone();
    match state.store.all_settings() {
        Ok(settings) => config.apply_settings(&settings),
        Err(e) => get_logger("web").warn(&format!("Could not read saved settings: {}", e)),
    }
    Json(config.masked())
}

#[cfg_attr(feature = "openapi", utoipa::path(put, path = "/api/config", request_body = ConfigUpdate, responses(
    (status = 200, description = "Settings saved, applied on restart"),
    (status = 400, description = "Invalid poll interval or log level")
)))]
pub async fn update_config(
    State(state): State<AppState>,
    Json(body): Json<ConfigUpdate>,
) -> Response {
    let settings = match body.into_settings() {
        Ok(s) => s,
        Err(response) => return response,
    };

    let logger = get_logger("web");
    for (key, value) in &settings {
        if let Err(e) = state.store.set_setting(key, value) {
            logger.error(&format!("Failed to save setting {}: {}", key, e));
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
        }
    }

    let updated: Vec<&str> = settings.iter().map(|(k, _)| *k).collect();
    logger.info(&format!("Saved settings: {}", updated.join(", ")));
    Json(serde_json::json!({
        "message": "Configuration updated successfully",
        "updated": updated,
        "restart_required": true,
    }))
    .into_response()
}

//! Station management endpoints backed by the SQLite store

use super::{AppState, error_response};
use crate::config::MonitoredStation;
use crate::error::FuelWatchError;
use crate::fuel::{FuelType, StationId};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct NewStation {
    pub station_id: Option<StationId>,
    #[serde(default)]
    pub fuel_types: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct StationUpdate {
    #[serde(default)]
    pub fuel_types: Vec<String>,
}

fn check_fuel_types(fuel_types: &[String]) -> Result<(), Response> {
    if fuel_types.is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "At least one fuel type is required",
        ));
    }
    let invalid = FuelType::unknown_codes(fuel_types);
    if !invalid.is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            format!("Invalid fuel types: {:?}", invalid),
        ));
    }
    Ok(())
}

fn storage_failure(e: FuelWatchError) -> Response {
    crate::logging::get_logger("web").error(&format!("Station store error: {}", e));
    error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/stations", responses(
    (status = 200, description = "Configured stations with names from the latest fetch")
)))]
pub async fn list_stations(State(state): State<AppState>) -> Response {
    let stations = match state.store.list_stations() {
        Ok(s) => s,
        Err(e) => return storage_failure(e),
    };
    let view = state.monitor.borrow().clone();
    let result: Vec<serde_json::Value> = stations
        .iter()
        .map(|s| {
            let name = view
                .prices
                .as_ref()
                .and_then(|p| p.station(s.station_id))
                .map(|st| st.name.clone())
                .unwrap_or_else(|| format!("Station {}", s.station_id));
            serde_json::json!({
                "station_id": s.station_id,
                "station_name": name,
                "fuel_types": s.fuel_types,
            })
        })
        .collect();
    Json(serde_json::json!({"stations": result})).into_response()
}

#[cfg_attr(feature = "openapi", utoipa::path(post, path = "/api/stations", request_body = NewStation, responses(
    (status = 201, description = "Station added"),
    (status = 400, description = "Missing id, invalid fuel types or duplicate station")
)))]
pub async fn add_station(State(state): State<AppState>, Json(body): Json<NewStation>) -> Response {
    let Some(station_id) = body.station_id.filter(|id| *id > 0) else {
        return error_response(StatusCode::BAD_REQUEST, "station_id is required");
    };
    if let Err(resp) = check_fuel_types(&body.fuel_types) {
        return resp;
    }

    let station = MonitoredStation {
        station_id,
        fuel_types: body.fuel_types,
    };
    match state.store.add_station(&station) {
        Ok(()) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "message": "Station added successfully",
                "station": station,
            })),
        )
            .into_response(),
        Err(FuelWatchError::Validation { .. }) => {
            error_response(StatusCode::BAD_REQUEST, "Station already exists")
        }
        Err(e) => storage_failure(e),
    }
}

#[cfg_attr(feature = "openapi", utoipa::path(put, path = "/api/stations/{station_id}", request_body = StationUpdate, responses(
    (status = 200, description = "Station updated"),
    (status = 400, description = "Invalid fuel types"),
    (status = 404, description = "Station not found")
)))]
pub async fn update_station(
    State(state): State<AppState>,
    Path(station_id): Path<StationId>,
    Json(body): Json<StationUpdate>,
) -> Response {
    if let Err(resp) = check_fuel_types(&body.fuel_types) {
        return resp;
    }
    match state.store.update_station(station_id, &body.fuel_types) {
        Ok(true) => Json(serde_json::json!({
            "message": "Station updated successfully",
            "station": MonitoredStation {
                station_id,
                fuel_types: body.fuel_types,
            },
        }))
        .into_response(),
        Ok(false) => error_response(StatusCode::NOT_FOUND, "Station not found"),
        Err(e) => storage_failure(e),
    }
}

#[cfg_attr(feature = "openapi", utoipa::path(delete, path = "/api/stations/{station_id}", responses(
    (status = 200, description = "Station deleted"),
    (status = 404, description = "Station not found")
)))]
pub async fn delete_station(
    State(state): State<AppState>,
    Path(station_id): Path<StationId>,
) -> Response {
    match state.store.delete_station(station_id) {
        Ok(true) => {
            Json(serde_json::json!({"message": "Station deleted successfully"})).into_response()
        }
        Ok(false) => error_response(StatusCode::NOT_FOUND, "Station not found"),
        Err(e) => storage_failure(e),
    }
}

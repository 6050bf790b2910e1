//! Current and historical price endpoints

use super::{AppState, error_response};
use crate::fuel::{FuelType, PriceKey, StationId};
use crate::sink::HistoryQuery;
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

const DEFAULT_HISTORY_DAYS: i64 = 7;
const MAX_HISTORY_DAYS: i64 = 365;

#[derive(Debug, Default, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::IntoParams))]
#[cfg_attr(feature = "openapi", into_params(parameter_in = Query))]
pub struct HistoryParams {
    pub station_id: Option<StationId>,
    pub fuel_type: Option<String>,
    pub days: Option<i64>,
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/prices/current", responses(
    (status = 200, description = "Latest prices for configured stations"),
    (status = 503, description = "No snapshot fetched yet")
)))]
pub async fn current_prices(State(state): State<AppState>) -> Response {
    let view = state.monitor.borrow().clone();
    let Some(snapshot) = view.prices.as_ref() else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "No price data fetched yet",
        );
    };
    let stations = state.store.list_stations().unwrap_or_else(|e| {
        crate::logging::get_logger("web")
            .warn(&format!("Using last monitored stations: {}", e));
        view.stations.clone()
    });

    let mut result = Vec::new();
    for configured in &stations {
        let Some(station) = snapshot.station(configured.station_id) else {
            continue;
        };
        let mut prices = serde_json::Map::new();
        for fuel_type in &configured.fuel_types {
            let key = PriceKey::new(configured.station_id, fuel_type.clone());
            if let Some(point) = snapshot.price(&key) {
                prices.insert(fuel_type.clone(), serde_json::json!(point.price));
            }
        }
        result.push(serde_json::json!({
            "station_id": configured.station_id,
            "station_name": station.name,
            "station_address": station.address,
            "prices": prices,
        }));
    }

    Json(serde_json::json!({
        "prices": result,
        "fetched_at": snapshot.fetched_at,
    }))
    .into_response()
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/prices/history", params(HistoryParams), responses(
    (status = 200, description = "Price history ordered by time"),
    (status = 400, description = "Invalid fuel type or day range"),
    (status = 500, description = "Time-series query failed")
)))]
pub async fn price_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Response {
    let fuel_type = params.fuel_type.filter(|f| !f.trim().is_empty());
    if let Some(code) = &fuel_type
        && !FuelType::is_known(code)
    {
        return error_response(StatusCode::BAD_REQUEST, "Invalid fuel type");
    }

    let days = params.days.unwrap_or(DEFAULT_HISTORY_DAYS);
    if !(1..=MAX_HISTORY_DAYS).contains(&days) {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("days must be between 1 and {}", MAX_HISTORY_DAYS),
        );
    }

    let query = HistoryQuery {
        station_id: params.station_id,
        fuel_type,
        days: days as u32,
    };
    match state.sink.history(&query).await {
        Ok(history) => Json(serde_json::json!({"history": history})).into_response(),
        Err(e) => {
            crate::logging::get_logger("web")
                .error(&format!("Failed to fetch price history: {}", e));
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to fetch price history",
            )
        }
    }
}

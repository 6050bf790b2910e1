//! Axum-based HTTP API, with optional OpenAPI (utoipa) and Swagger UI
//!
//! Handlers read the monitor's latest published view and never touch the
//! change cache or wait on a running tick.

mod prices;
mod settings;
mod stations;

use crate::config::Config;
use crate::fuel::FuelType;
use crate::logging::get_logger;
use crate::monitor::{CycleEvent, MonitorSnapshot};
use crate::scheduler::SchedulerState;
use crate::sink::TimeSeriesSink;
use crate::store::StationStore;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use prices::{current_prices, price_history};
pub use settings::{get_config, update_config};
pub use stations::{add_station, delete_station, list_stations, update_station};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<StationStore>,
    pub sink: Arc<dyn TimeSeriesSink>,
    pub monitor: watch::Receiver<Arc<MonitorSnapshot>>,
    pub events: broadcast::Sender<CycleEvent>,
    pub scheduler: watch::Receiver<SchedulerState>,
    /// Human-readable cadence, e.g. "every 60 minutes"
    pub schedule: String,
    pub mode: &'static str,
}

pub(crate) fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({"error": message.into()}))).into_response()
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/health", responses(
    (status = 200, description = "Service is healthy")
)))]
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/status", responses(
    (status = 200, description = "Scheduler state, counters and last cycle report")
)))]
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let view = state.monitor.borrow().clone();
    let scheduler_state = *state.scheduler.borrow();
    Json(serde_json::json!({
        "version": env!("APP_VERSION"),
        "scheduler_state": scheduler_state,
        "mode": state.mode,
        "schedule": state.schedule,
        "counters": view.counters,
        "last_report": view.last_report,
        "cache_size": view.cache_size,
        "last_fetch": view.prices.as_ref().map(|p| p.fetched_at),
        "monitored_stations": view.stations.len(),
    }))
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/fuel-types", responses(
    (status = 200, description = "Allowed fuel type codes")
)))]
pub async fn fuel_types() -> impl IntoResponse {
    let codes: Vec<&str> = FuelType::ALL.iter().map(|f| f.as_str()).collect();
    Json(serde_json::json!({"fuel_types": codes}))
}

#[derive(Debug, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct MqttTestBody {
    pub broker: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

fn default_mqtt_port() -> u16 {
    1883
}

#[cfg_attr(feature = "openapi", utoipa::path(post, path = "/api/mqtt/test", request_body = MqttTestBody, responses(
    (status = 200, description = "Outcome of a test connection")
)))]
pub async fn mqtt_test(Json(body): Json<MqttTestBody>) -> impl IntoResponse {
    let (success, message) =
        crate::publish::test_connection(&body.broker, body.port, &body.user, &body.password).await;
    Json(serde_json::json!({"success": success, "message": message}))
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/events", responses(
    (status = 200, description = "Server-sent stream of cycle reports")
)))]
pub async fn events(State(state): State<AppState>) -> impl IntoResponse {
    let rx = state.events.subscribe();
    let stream = tokio_stream::wrappers::BroadcastStream::new(rx).filter_map(|msg| {
        let event = msg.ok()?;
        Event::default()
            .event("cycle")
            .json_data(&event)
            .ok()
            .map(Ok::<Event, std::convert::Infallible>)
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[cfg(feature = "openapi")]
#[derive(utoipa::OpenApi)]
#[openapi(
    paths(
        health, status, fuel_types, mqtt_test, events,
        settings::get_config, settings::update_config,
        stations::list_stations, stations::add_station,
        stations::update_station, stations::delete_station,
        prices::current_prices, prices::price_history,
    ),
    components(schemas(
        MqttTestBody, settings::ConfigUpdate, stations::NewStation, stations::StationUpdate
    )),
    tags((name = "fuelwatch", description = "Fuelwatch price monitor API"))
)]
pub struct ApiDoc;

pub fn build_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/api/health", get(health))
        .route("/api/status", get(status))
        .route("/api/stations", get(list_stations).post(add_station))
        .route(
            "/api/stations/{station_id}",
            put(update_station).delete(delete_station),
        )
        .route("/api/prices/current", get(current_prices))
        .route("/api/prices/history", get(price_history))
        .route("/api/fuel-types", get(fuel_types))
        .route("/api/config", get(get_config).put(update_config))
        .route("/api/mqtt/test", post(mqtt_test))
        .route("/api/events", get(events));

    #[cfg(feature = "openapi")]
    let router = {
        use utoipa::OpenApi;
        router.merge(
            utoipa_swagger_ui::SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()),
        )
    };

    router
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Serve the API until `token` is cancelled
pub async fn serve(
    state: AppState,
    host: &str,
    port: u16,
    token: CancellationToken,
) -> anyhow::Result<()> {
    let router = build_router(state);
    let logger = get_logger("web");
    logger.info(&format!(
        "Starting web server; requested host={}, port={}",
        host, port
    ));

    let addr = match host.parse::<IpAddr>() {
        Ok(ip) => SocketAddr::new(ip, port),
        Err(_) => {
            logger.warn(&format!("Invalid host '{}'; falling back to 127.0.0.1", host));
            ([127, 0, 0, 1], port).into()
        }
    };

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    logger.info(&format!(
        "Web server listening at http://{}:{} (API /api)",
        local_addr.ip(),
        local_addr.port()
    ));

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await?;
    logger.info("Web server stopped");
    Ok(())
}

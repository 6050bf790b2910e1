use anyhow::{Context, Result};
use clap::Parser;
use fuelwatch::cache::ChangeCache;
use fuelwatch::config::Config;
use fuelwatch::logging::{get_logger, init_logging};
use fuelwatch::monitor::{CycleOutcome, Monitor};
use fuelwatch::publish::{self, HomeAssistantMirror};
use fuelwatch::scheduler::{Cadence, Scheduler};
use fuelwatch::sink::{InfluxWriter, TimeSeriesSink};
use fuelwatch::source::NswFuelClient;
use fuelwatch::store::StationStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// NSW fuel price monitor with InfluxDB history and MQTT mirroring
#[derive(Debug, Parser)]
#[command(name = "fuelwatch", version = env!("APP_VERSION"))]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run a single update cycle and exit
    #[arg(long)]
    once: bool,

    /// Also serve the HTTP API
    #[arg(long)]
    web: bool,

    /// Web server bind address
    #[arg(long)]
    host: Option<String>,

    /// Web server port
    #[arg(long)]
    port: Option<u16>,

    /// Log level (DEBUG, INFO, WARNING, ERROR, CRITICAL)
    #[arg(long)]
    log_level: Option<String>,
}

// Environment and command line win over both the file and saved settings
fn apply_overrides(config: &mut Config, cli: &Cli) {
    config.apply_env_overrides();
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(host) = &cli.host {
        config.web.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.web.port = port;
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;
    apply_overrides(&mut config, cli);
    Ok(config)
}

// Cancel `token` on Ctrl-C or SIGTERM
fn spawn_signal_handler(token: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                }
                Err(e) => {
                    tracing::error!("Failed to listen for SIGTERM: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {}
            _ = terminate => {}
        }
        tracing::info!("Shutdown signal received, stopping after the current cycle");
        token.cancel();
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(&cli)?;

    // The store is the runtime source of stations; YAML only bootstraps it.
    // Opened before logging so a saved log level applies from the start.
    let db_path = config.db_path();
    let store = Arc::new(
        StationStore::open(&db_path).with_context(|| format!("opening {}", db_path.display()))?,
    );
    let settings = store.all_settings()?;
    if !settings.is_empty() {
        config.apply_settings(&settings);
        apply_overrides(&mut config, &cli);
    }

    init_logging(&config.logging).map_err(|e| anyhow::anyhow!("{}", e))?;
    let logger = get_logger("main");
    logger.info(&format!("Fuelwatch {} starting up", env!("APP_VERSION")));
    logger.info(&format!(
        "Opened station store at {} (schema v{}, {} saved settings)",
        db_path.display(),
        store.schema_version()?,
        settings.len()
    ));

    store.seed_from_config(&config.stations)?;
    config.stations = store.list_stations()?;
    config.validate()?;

    let sink = Arc::new(InfluxWriter::new(&config.influxdb)?);
    if let Err(e) = sink.connect().await {
        logger.error(&format!("Failed to connect to InfluxDB, exiting: {}", e));
        std::process::exit(1);
    }
    let cache = ChangeCache::seed(sink.as_ref(), config.seed_window).await;

    let mirror = HomeAssistantMirror::new(
        publish::from_config(&config.mqtt),
        config.mqtt.discovery_prefix.clone(),
    );
    let source = Arc::new(NswFuelClient::new(&config.source)?);

    let mut monitor = Monitor::new(source, sink.clone(), mirror, store.clone(), cache)
        .with_cache_policy(config.cache_policy)
        .with_initial_stations(config.stations.clone());

    if cli.once {
        let report = monitor.run_cycle().await;
        monitor.close().await;
        if report.outcome != CycleOutcome::Completed {
            std::process::exit(1);
        }
        return Ok(());
    }

    let token = CancellationToken::new();
    spawn_signal_handler(token.clone());

    let scheduler = Scheduler::new(Cadence::from_config(&config)?, token.clone());

    #[cfg(feature = "web")]
    let web_task = if cli.web {
        let state = fuelwatch::web::AppState {
            config: Arc::new(config.clone()),
            store: store.clone(),
            sink: sink.clone(),
            monitor: monitor.subscribe(),
            events: monitor.event_sender(),
            scheduler: scheduler.subscribe(),
            schedule: scheduler.cadence().describe(),
            mode: scheduler.cadence().mode(),
        };
        let host = config.web.host.clone();
        let port = config.web.port;
        let web_token = token.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = fuelwatch::web::serve(state, &host, port, web_token.clone()).await {
                tracing::error!("Web server error: {}", e);
                web_token.cancel();
            }
        }))
    } else {
        None
    };
    #[cfg(not(feature = "web"))]
    if cli.web {
        logger.warn("Built without the web feature; --web ignored");
    }

    scheduler.run(&mut monitor).await;

    logger.info("Shutting down...");
    monitor.close().await;
    #[cfg(feature = "web")]
    if let Some(task) = web_task
        && let Err(e) = task.await
    {
        logger.warn(&format!("Web server task ended abnormally: {}", e));
    }
    Ok(())
}

//! Application entry point for the `aquawatch-relay` service.
//!
//! This binary orchestrates the full startup sequence, including:
//! - Initializing structured logging/tracing
//! - Loading configuration from environment variables or `.env`
//! - Loading the threshold table (built-in or `THRESHOLDS_FILE`)
//! - Opening the token store (Postgres when `DATABASE_URL` is set, JSON file otherwise)
//! - Building the notification dispatcher and its providers
//! - Starting the sensor monitor when `SENSOR_API_URL` is set
//! - Binding the Axum HTTP server and serving requests
//!
//! Missing required configuration stops the process before the listener is
//! bound.
use std::{env, net::SocketAddr, sync::Arc, time::Instant};

use anyhow::{Context, Result};
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use aquawatch_relay::dispatch::{stamp_sent_at, stringify_data, FcmProvider, WebhookProvider};
use aquawatch_relay::routes::{self, AppState};
use aquawatch_relay::{
    config, schema, Dispatcher, FileTokenStore, HttpSensorSource, Monitor, PgTokenStore,
    ThresholdTable, TokenStore,
};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    init_tracing();
    dotenv().ok();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    let thresholds = match &cfg.thresholds_file {
        Some(path) => ThresholdTable::from_file(path)
            .with_context(|| format!("Failed to load thresholds from {}", path.display()))?,
        None => ThresholdTable::default(),
    };
    tracing::info!("Monitoring {} parameters", thresholds.len());
    let thresholds = Arc::new(thresholds);

    let store: Arc<dyn TokenStore> = match &cfg.db_url {
        Some(db_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(cfg.db_pool_max)
                .connect(db_url)
                .await
                .context("Failed to connect to token database")?;
            schema::create_schema(&pool).await?;
            tracing::info!("Using Postgres token store");
            Arc::new(PgTokenStore::new(pool))
        }
        None => {
            tracing::info!(
                "Using JSON token store at {}",
                cfg.token_store_path.display()
            );
            Arc::new(FileTokenStore::new(cfg.token_store_path.clone()))
        }
    };

    let mut dispatcher = Dispatcher::new(cfg.dispatch_config());
    dispatcher.register_provider(
        "fcm",
        Arc::new(FcmProvider::new(&cfg.fcm_endpoint, &cfg.fcm_server_key)),
    )?;
    if let Some(url) = &cfg.webhook_url {
        dispatcher.register_provider("webhook", Arc::new(WebhookProvider::new(url)))?;
    }
    dispatcher.use_middleware(stamp_sent_at);
    dispatcher.use_middleware(stringify_data);
    let dispatcher = Arc::new(dispatcher);

    // Held until shutdown; dropping it stops the timer.
    let monitor = cfg.sensor_api_url.as_ref().map(|url| {
        let monitor = Monitor::new(
            cfg.monitor_config(),
            Arc::new(HttpSensorSource::new(url)),
            Arc::clone(&thresholds),
            Arc::clone(&dispatcher),
            Arc::clone(&store),
        );
        monitor.start();
        monitor
    });
    if monitor.is_none() {
        tracing::info!("SENSOR_API_URL not set, sensor monitor disabled");
    }

    let app = routes::router(AppState {
        dispatcher,
        store,
        thresholds,
        api_key: cfg.api_key.as_str().into(),
        started_at: Instant::now(),
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    if let Some(monitor) = monitor {
        monitor.stop();
    }
    Ok(())
}

// ---

/// Initialize the global tracing subscriber for structured logging.
///
/// This function configures the [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `RELAY_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level controlled by `RUST_LOG`, falling back to `RELAY_LOG_LEVEL`
///
/// This should be called once at application startup before any logging
/// or tracing macros are invoked.
fn init_tracing() {
    // ---
    let span_events = match env::var("RELAY_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("RELAY_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "debug",
        };
        EnvFilter::new(format!("{level},sqlx::query=warn,hyper=info,reqwest=info"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use scrivener_core::config_file;
use scrivener_core::{Config, EngineSet, HttpFetcher, TranslationService};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

mod error;
mod handlers;
mod models;
mod routes;
mod state;

use state::AppState;

const DEFAULT_BIND: &str = "127.0.0.1:1969";

/// Terminal logging from `RUST_LOG` (default `info`), plus a daily-rotated
/// file when a log directory is configured. The guard must outlive `main`.
fn init_tracing(log_dir: Option<&PathBuf>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,hyper=warn,h2=warn,reqwest=warn,rustls=warn")
        })
    };
    let terminal = fmt::layer().with_target(false);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "scrivener-server.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file = fmt::layer().with_ansi(false).with_writer(writer);
            tracing_subscriber::registry()
                .with(filter())
                .with(terminal)
                .with(file)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter())
                .with(terminal)
                .init();
            None
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Precedence: env > config file > defaults
    let file = config_file::load_config();
    let mut config = Config::default();
    file.apply_to(&mut config);
    if let Ok(dir) = std::env::var("SCRIVENER_TRANSLATORS_DIR") {
        config.translator_dirs.push(PathBuf::from(dir));
    }
    let server = file.server.unwrap_or_default();
    let bind = std::env::var("SCRIVENER_BIND")
        .ok()
        .or(server.bind)
        .unwrap_or_else(|| DEFAULT_BIND.to_string());
    let log_dir = std::env::var("SCRIVENER_LOG_DIR")
        .ok()
        .or(server.log_dir)
        .map(PathBuf::from);

    let _log_guard = init_tracing(log_dir.as_ref());

    let fetcher = Arc::new(HttpFetcher::new(&config.fetch)?);
    let service = TranslationService::new(
        &config,
        EngineSet::builtin(),
        fetcher,
        Some(scrivener_codecs::format_ids()),
    );
    let report = service.load();
    tracing::info!(
        translators = report.loaded,
        rejected = report.errors.len(),
        "registry loaded"
    );

    let state = Arc::new(AppState { service });

    // Expired sessions are also swept on every open; this bounds memory
    // when traffic stops.
    let sweeper = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let swept = sweeper.service.sessions().sweep();
            if swept > 0 {
                tracing::debug!(swept, "expired sessions removed");
            }
        }
    });

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = bind.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

//! Leadline server binary.
//!
//! Loads configuration, prepares the database and serves the media-stream
//! endpoint until SIGINT or SIGTERM.

use std::net::SocketAddr;

use leadline_server::config::{self, DatabaseConfig, LoggingConfig};
use leadline_server::{app, services_from_config, AppState};
use leadline_store::DbPool;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Picks the config file: first CLI argument, then `LEADLINE_CONFIG_PATH`,
/// then `config.toml`. Also returns where the choice came from.
fn config_path() -> (String, &'static str) {
    let non_blank = |value: &String| !value.trim().is_empty();
    if let Some(path) = std::env::args().nth(1).filter(non_blank) {
        return (path, "cli-arg");
    }
    match std::env::var("LEADLINE_CONFIG_PATH") {
        Ok(path) if non_blank(&path) => (path, "env-var"),
        _ => (DEFAULT_CONFIG_PATH.to_string(), "default"),
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn open_database(database: &DatabaseConfig) -> DbPool {
    let pool = leadline_store::create_pool(&database.path, database.runtime_settings())
        .expect("failed to open the database, check database.path in config");
    let conn = pool
        .get()
        .expect("failed to get a database connection for migrations");
    let applied = leadline_store::run_migrations(&conn).expect("failed to migrate the database");
    if applied > 0 {
        tracing::info!(applied, path = %database.path, "database schema updated");
    }
    pool
}

#[tokio::main]
async fn main() {
    let (path, source) = config_path();
    let config = config::load_config(Some(path.as_str()))
        .expect("failed to load configuration, the server cannot start without valid config");

    init_tracing(&config.logging);
    tracing::info!(%source, %path, "configuration loaded");

    let pool = open_database(&config.database);
    let services = services_from_config(&config, pool)
        .expect("failed to build call collaborators, check calendar and evaluation config");

    let addr = SocketAddr::new(config.server.host, config.server.port);
    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind the listen address, is the port already in use?");
    tracing::info!(%addr, "leadline server listening");

    axum::serve(listener, app(AppState::new(services)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("leadline server stopped");
}

/// Resolves on the first SIGINT or SIGTERM.
async fn shutdown_signal() {
    let interrupt = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install the SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        signal(SignalKind::terminate())
            .expect("failed to install the SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let signal = tokio::select! {
        () = interrupt => "SIGINT",
        () = terminate => "SIGTERM",
    };
    tracing::info!(signal, "shutting down, draining open calls");
}

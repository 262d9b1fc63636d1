use clap::Parser;
use kiln::Kiln;
use kiln_api::{ApiConfig, AppState, build_app, build_internal_app};
use std::future::IntoFuture;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Kiln API Server
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Host address to bind to
    #[arg(short = 'H', long, env = "KILN_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "KILN_PORT", default_value_t = 3000)]
    port: u16,

    /// Port of the internal callback listener
    #[arg(long, env = "KILN_INTERNAL_PORT", default_value_t = 3001)]
    internal_port: u16,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "KILN_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Config file path
    #[arg(short, long, env = "KILN_CONFIG")]
    config_file: Option<PathBuf>,

    /// Disable Swagger UI
    #[arg(long, env = "KILN_DISABLE_SWAGGER", default_value_t = false)]
    disable_swagger: bool,

    /// Postgres connection string; in-memory storage when absent
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging
    let filter = format!(
        "kiln={lvl},kiln_api={lvl},tower_http=debug",
        lvl = cli.log_level
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let mut config = if let Some(config_path) = &cli.config_file {
        match ApiConfig::load_from_file(config_path) {
            Ok(cfg) => {
                info!("Configuration loaded from: {}", config_path.display());
                cfg
            }
            Err(e) => {
                warn!(
                    "Failed to load config file: {}. Using default configuration.",
                    e
                );
                ApiConfig::default()
            }
        }
    } else {
        ApiConfig::default()
    };

    // Override with CLI options
    config.host = cli.host;
    config.port = cli.port;
    config.internal_port = cli.internal_port;
    config.log_level = cli.log_level.clone();
    config.kiln.log_level = cli.log_level;
    config.enable_swagger = !cli.disable_swagger;
    if cli.database_url.is_some() {
        config.kiln.database_url = cli.database_url;
    }

    let addr = config.socket_addr()?;
    let internal_addr = config.internal_socket_addr()?;

    // Initialize the broker and its dispatch worker
    if config.kiln.database_url.is_none() {
        warn!("DATABASE_URL not set, instances are kept in memory only");
    }
    let kiln = Kiln::builder(config.kiln.clone()).build().await?;
    let worker = kiln.worker().spawn();

    let state = AppState::new(kiln);
    let app = build_app(state.clone(), &config);
    let internal_app = build_internal_app(state);

    // Start servers
    info!("Starting server on: {}", addr);
    info!("Internal callbacks on: {}", internal_addr);
    if config.enable_swagger {
        info!("Swagger UI: http://{}/swagger-ui", addr);
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let internal_listener = tokio::net::TcpListener::bind(internal_addr).await?;

    let public = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .into_future();
    let internal = axum::serve(internal_listener, internal_app)
        .with_graceful_shutdown(shutdown_signal())
        .into_future();

    let result = tokio::try_join!(public, internal);
    worker.abort();

    result
        .map(|_| ())
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use clap::Parser;
use http::{Method, header::CONTENT_TYPE};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use voicebridge::{ServerConfig, routes, state::AppState};

/// voicebridge - Real-time voice relay server
#[derive(Parser, Debug)]
#[command(name = "voicebridge")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env first so both configuration sources see the same environment
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    // The upstream link is TLS; the provider has to be in place before the
    // first connection attempt.
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("could not install the ring crypto provider"))?;

    let cli = Cli::parse();

    let config = match cli.config {
        Some(path) => {
            println!("Loading configuration from {}", path.display());
            ServerConfig::from_file(&path)?
        }
        None => ServerConfig::from_env()?,
    };

    if config.openai_api_key.is_none() {
        warn!(
            "OPENAI_API_KEY is not set; relay sessions will fail to connect. \
             The query API remains available."
        );
    }

    let address = config.address();
    let cors = cors_layer(config.cors_allowed_origins.as_deref());
    println!("Starting voicebridge on {address}");

    let app_state = Arc::new(AppState::new(config));

    // Session query API plus the relay WebSocket endpoint
    let app = routes::create_api_router()
        .merge(routes::create_relay_router())
        .with_state(app_state.clone())
        .layer(cors);

    let socket_addr: SocketAddr = address
        .parse()
        .map_err(|e| anyhow!("invalid listen address '{}': {}", address, e))?;

    println!("Server listening on http://{}", socket_addr);

    let listener = TcpListener::bind(&socket_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(app_state))
        .await?;

    Ok(())
}

/// CORS policy from the configured origin list.
///
/// `"*"` opens the API to any origin without credentials; a comma-separated
/// list allows exactly those origins with credentials; no configuration
/// leaves the browser's same-origin rules in charge.
fn cors_layer(origins: Option<&str>) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE]);

    match origins {
        Some("*") => base.allow_origin(Any).allow_credentials(false),
        Some(list) => {
            let parsed: Vec<_> = list
                .split(',')
                .filter_map(|origin| origin.trim().parse().ok())
                .collect();
            base.allow_origin(parsed).allow_credentials(true)
        }
        None => {
            info!("no CORS origins configured; browsers enforce same-origin");
            base.allow_credentials(false)
        }
    }
}

/// Wait for ctrl-c, then close every registered session before the server
/// stops accepting connections.
async fn shutdown_signal(state: Arc<AppState>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }

    let active = state.sessions.active_count();
    info!(
        active_sessions = active,
        "shutdown signal received, closing sessions"
    );
    state.sessions.close_all();
}

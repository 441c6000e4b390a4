//! Tapango gateway kernel
//!
//! HTTP server fronting the dashboard API with rate limit, auth and
//! validation gates.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use axum::http::{HeaderValue, Method, header};
use clap::{Parser, Subcommand};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use tapango_kernel::config::Config;
use tapango_kernel::schema::SchemaRegistry;
use tapango_kernel::state::AppState;
use tapango_kernel::{build_app, session};

#[derive(Parser)]
#[command(name = "tapango", version, about = "Tapango gateway kernel")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// List the request schemas and exit; fails on invalid schema files
    Schemas {
        /// Directory of extra YAML schemas (overrides SCHEMAS_DIR)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    init_tracing();

    let cli = Cli::parse();
    let result = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve().await,
        Command::Schemas { dir } => list_schemas(dir),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn serve() -> Result<()> {
    info!("Starting Tapango gateway kernel");

    // Load configuration from environment
    let config = Config::from_env().context("failed to load configuration")?;
    info!(port = config.port, "Configuration loaded");
    if config.trust_forwarded_headers {
        warn!(
            "TRUST_FORWARDED_HEADERS is on: clients are identified by X-Forwarded-For/X-Real-IP, \
             which direct callers can forge unless a proxy overwrites them"
        );
    }

    let state = AppState::new(&config)
        .await
        .context("failed to initialize application state")?;

    info!(
        schemas = state.schemas().len(),
        buckets = ?state.rate_limiter().config().buckets(),
        "Gates configured"
    );

    let app = build_app(state)?;
    let app = session::apply_session_layer(
        app,
        config.redis_url.as_deref(),
        session::same_site(&config.cookie_same_site),
    )
    .await
    .context("failed to create session layer")?
    .layer(build_cors_layer(&config));

    // Start the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind to address")?;

    info!(%addr, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("server error")?;

    Ok(())
}

fn list_schemas(dir: Option<PathBuf>) -> Result<()> {
    let mut registry = SchemaRegistry::with_builtin();
    let dir = dir.or_else(|| std::env::var_os("SCHEMAS_DIR").map(PathBuf::from));

    if let Some(dir) = &dir {
        registry
            .load_dir(dir)
            .with_context(|| format!("failed to load schemas from {}", dir.display()))?;
    }

    for name in registry.names() {
        let Some(schema) = registry.get(name) else {
            continue;
        };
        let description = schema.description.as_deref().unwrap_or("");
        println!("{name:<20} {:>2} fields  {description}", schema.fields.len());
    }
    Ok(())
}

fn build_cors_layer(config: &Config) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::OPTIONS];

    if config.cors_allowed_origins.len() == 1 && config.cors_allowed_origins[0] == "*" {
        CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(methods)
            .allow_headers(tower_http::cors::Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_allowed_origins
            .iter()
            .filter_map(|o| match o.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(origin = %o, "ignoring unparseable CORS origin");
                    None
                }
            })
            .collect();

        // Credentials cannot be combined with wildcard headers
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

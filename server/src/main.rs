//! GIRO License Server
//!
//! Issues, binds, validates, and revokes licenses for GIRO desktop
//! deployments.
//!
//! Usage:
//!   giro-license-server --port 8080 --db giro-licenses.db

use anyhow::{Context, Result};
use clap::Parser;
use giro_license_server::auth::AuthLayer;
use giro_license_server::fraud::FraudDetector;
use giro_license_server::ratelimit::RateLimiter;
use giro_license_server::service::LicenseService;
use giro_license_server::{build_router, AppState, ServerConfig};
use giro_store::LicenseStore;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "giro-license-server")]
#[command(about = "GIRO license issuing and validation server")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Path to the license database
    #[arg(long, default_value = "giro-licenses.db")]
    db: PathBuf,

    /// Path to the decision signing key file
    #[arg(long, default_value = "giro-signing.key")]
    signing_key: PathBuf,

    /// Admin account email (seeded on first start)
    #[arg(long, env = "GIRO_ADMIN_EMAIL", default_value = "admin@giro.local")]
    admin_email: String,

    /// Admin account password
    #[arg(long, env = "GIRO_ADMIN_PASSWORD")]
    admin_password: Option<String>,

    /// Deployment API key for machine-to-server calls
    #[arg(long, env = "GIRO_API_KEY")]
    api_key: Option<String>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    info!("GIRO License Server starting...");

    let config = Arc::new(ServerConfig::from_env());
    let store = LicenseStore::open(&args.db)
        .with_context(|| format!("failed to open store at {}", args.db.display()))?;
    info!("store ready at {}", args.db.display());

    let signer = Arc::new(
        giro_license_server::signer::load_or_generate(&args.signing_key)
            .context("failed to load signing key")?,
    );

    let auth = Arc::new(AuthLayer::new(store.clone(), config.session_ttl));

    // Seed credentials. Generated values are printed once so a fresh
    // deployment is immediately usable.
    let admin_password = args
        .admin_password
        .unwrap_or_else(AuthLayer::generate_token);
    let api_key = args.api_key.unwrap_or_else(AuthLayer::generate_token);
    auth.bootstrap(&args.admin_email, &admin_password, &api_key)
        .context("failed to seed credentials")?;

    let fraud = Arc::new(FraudDetector::new(store.clone(), config.fraud.clone()));
    let service = Arc::new(LicenseService::new(
        store,
        fraud,
        Arc::clone(&signer),
        Arc::clone(&config),
    ));
    let limiter = Arc::new(RateLimiter::new(
        config.rate_limit_per_minute,
        config.rate_limit_burst,
    ));

    let state = AppState {
        service,
        auth,
        limiter,
        config: Arc::clone(&config),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    println!("\n========================================");
    println!("  GIRO License Server Running");
    println!("========================================");
    println!("  Port:         {}", args.port);
    println!("  Admin email:  {}", args.admin_email);
    println!("  API key:      {api_key}");
    println!("  Decision key: {}", hex::encode(signer.public_key()));
    println!("========================================\n");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received, draining connections");
}

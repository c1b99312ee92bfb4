//! KISS Startpage - self-hosted startpage backend

use clap::Parser;
use kiss_startpage::api::handlers::AppState;
use kiss_startpage::api::router;
use kiss_startpage::config::Config;
use kiss_startpage::icons::HttpUpstream;
use kiss_startpage::metrics::Metrics;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// KISS Startpage - dashboard backend with icon catalog proxy
#[derive(Parser, Debug)]
#[command(name = "kiss_startpage")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Listen address, e.g. 0.0.0.0:8080 (overrides config)
    #[arg(short, long, value_name = "ADDR")]
    listen: Option<String>,

    /// Data directory for users, sessions and dashboard config (overrides config)
    #[arg(short, long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration from file if specified, otherwise use default loading
    let mut config = if let Some(ref path) = cli.config {
        Config::from_file(path)?
    } else {
        Config::load()
    };

    // Initialize tracing: RUST_LOG wins, then --verbose, then the configured level
    let log_level = if cli.verbose {
        "kiss_startpage=trace,tower_http=trace".to_string()
    } else {
        config.log_level.clone()
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // CLI overrides
    if let Some(ref addr) = cli.listen {
        let addr: std::net::SocketAddr = addr.parse()?;
        config.bind = addr.ip();
        config.port = addr.port();
    }
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }

    info!("Starting KISS Startpage v{}", env!("CARGO_PKG_VERSION"));
    info!("  Listen address: {}", config.listen_addr());
    info!("  Data directory: {:?}", config.data_dir);
    info!("  App root: {:?}", config.app_root);
    info!("  Private icons: {:?}", config.private_icons_dir);
    info!("  Session TTL: {}s", config.session_ttl_secs);
    info!("  Icon index TTL: {}s", config.icon_index_ttl_secs);
    if config.password_iterations < kiss_startpage::auth::DEFAULT_ITERATIONS {
        warn!(
            "  Password hashing uses {} iterations (default {})",
            config.password_iterations,
            kiss_startpage::auth::DEFAULT_ITERATIONS
        );
    }

    let metrics = if config.metrics_enabled {
        let metrics = Metrics::new();
        metrics
            .build_info
            .with_label_values(&[env!("CARGO_PKG_VERSION")])
            .set(1.0);
        let start = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        metrics.process_start_time_seconds.set(start);
        Some(metrics)
    } else {
        info!("  Metrics: disabled");
        None
    };

    let upstream = Arc::new(HttpUpstream::new()?);
    let state = Arc::new(AppState::new(&config, upstream, metrics));
    state.ensure_files()?;
    if !state.users.has_users()? {
        warn!("No admin account configured yet; first-time setup is pending");
    }

    let app = router(state);

    // Start server with graceful shutdown
    let listener = TcpListener::bind(config.listen_addr()).await?;
    info!("KISS Startpage listening on http://{}", config.listen_addr());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Handle shutdown signals (SIGINT, SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

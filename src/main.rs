//! bd daemon - local RPC daemon and federation sync credential broker.

use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::signal;
use tokio::sync::Notify;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bd_daemon::auth::{AuthManager, RateLimiter};
use bd_daemon::commands::CommandRegistry;
use bd_daemon::config::Settings;
use bd_daemon::crypto::{ensure_private_dir, FileKeyring, Keyring};
use bd_daemon::error::DaemonError;
use bd_daemon::federation::{DoltRemote, FederationStore};
use bd_daemon::socket::{ConnectionContext, ConnectionMetrics, SocketListener};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const NAME: &str = env!("CARGO_PKG_NAME");

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return ExitCode::SUCCESS;
    }

    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("{} {}", NAME, VERSION);
        return ExitCode::SUCCESS;
    }

    let config_path = get_config_path(&args);

    let settings = match &config_path {
        Some(path) => match Settings::load(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Error loading configuration: {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => Settings::default(),
    };

    if let Err(e) = init_logging(&settings) {
        eprintln!("Error initializing logging: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Starting {} v{}", NAME, VERSION);
    match &config_path {
        Some(path) => info!("Configuration loaded from: {}", path),
        None => info!("No configuration file given, using defaults"),
    }
    info!("Socket path: {}", settings.socket.path.display());

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(async_main(settings)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Daemon failed");
            ExitCode::FAILURE
        }
    }
}

/// Async main function.
async fn async_main(settings: Settings) -> Result<(), DaemonError> {
    let settings = Arc::new(settings);

    if let Some(dir) = settings
        .socket
        .path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
    {
        ensure_private_dir(dir).map_err(|e| DaemonError::Socket {
            message: format!("Failed to create socket directory {}: {}", dir.display(), e),
        })?;
    }

    let auth = Arc::new(AuthManager::new(&settings.socket.path, Utc::now())?);

    let rate_limiter = Arc::new(
        RateLimiter::new(
            settings.security.rate_limit_requests,
            Duration::from_secs(settings.security.rate_limit_window_seconds),
        )
        .with_cleanup_interval(Duration::from_secs(
            settings.security.cleanup_interval_seconds,
        )),
    );
    rate_limiter.start_cleanup_task();
    info!(
        max_requests = settings.security.rate_limit_requests,
        window_seconds = settings.security.rate_limit_window_seconds,
        "Per-client rate limiting enabled"
    );

    let metrics = Arc::new(ConnectionMetrics::new());
    let mut registry = CommandRegistry::new(Arc::clone(&metrics), Arc::clone(&rate_limiter));
    if settings.federation.enabled {
        let store = open_federation_store(&settings)?;
        registry = registry.with_federation(
            Arc::new(store),
            Duration::from_secs(settings.federation.sync_timeout_seconds),
        );
    } else {
        info!("Federation disabled");
    }

    let ctx = Arc::new(ConnectionContext::new(
        Arc::clone(&settings),
        Arc::clone(&auth),
        Arc::clone(&rate_limiter),
        Arc::new(registry),
        metrics,
    ));

    let result = serve(ctx, &settings).await;

    rate_limiter.shutdown().await;
    if let Err(e) = auth.cleanup() {
        warn!(error = %e, "Failed to clean up auth state");
    }

    info!("Daemon stopped");
    result
}

async fn serve(ctx: Arc<ConnectionContext>, settings: &Settings) -> Result<(), DaemonError> {
    let listener = SocketListener::bind(ctx).await?;

    let shutdown = Arc::new(Notify::new());
    let shutdown_for_run = Arc::clone(&shutdown);

    tokio::select! {
        result = listener.run(shutdown_for_run) => {
            if let Err(e) = &result {
                error!(error = %e, "Socket listener failed");
            }
            listener.remove_socket_file();
            return result;
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, initiating graceful shutdown...");
            shutdown.notify_waiters();
        }
    }

    let drain_timeout = Duration::from_secs(settings.limits.drain_timeout_seconds);
    match tokio::time::timeout(drain_timeout, listener.wait_for_drain()).await {
        Ok(()) => info!("Graceful shutdown complete"),
        Err(_) => warn!(
            "Shutdown timeout after {}s, some connections may be terminated",
            drain_timeout.as_secs()
        ),
    }
    listener.remove_socket_file();
    Ok(())
}

/// Open the peer store. The keyring is optional: without it the store
/// derives the same key from the database path.
fn open_federation_store(settings: &Settings) -> Result<FederationStore, DaemonError> {
    let federation = &settings.federation;
    let db_path = federation.db_path.as_path();

    let keyring: Option<Arc<dyn Keyring>> =
        match FileKeyring::open(federation.keyring_path(), db_path) {
            Ok(keyring) => Some(Arc::new(keyring)),
            Err(e) => {
                warn!(error = %e, "Keyring unavailable, using path-derived credential key");
                None
            }
        };

    let remote = DoltRemote::new(
        federation.dolt_binary.clone(),
        db_path,
        federation.branch.clone(),
        Duration::from_secs(federation.sync_timeout_seconds),
    );

    FederationStore::open(federation.peers_path(), db_path, keyring, Arc::new(remote))
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn print_help() {
    println!(
        r#"{} {}
Local RPC daemon for bd with federation sync credential storage.

USAGE:
    {} [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Path to configuration file
                           [default: built-in defaults]
    -h, --help             Print help information
    -V, --version          Print version information
"#,
        NAME, VERSION, NAME
    );
}

/// Get configuration file path from command line arguments.
fn get_config_path(args: &[String]) -> Option<String> {
    for (i, arg) in args.iter().enumerate() {
        if (arg == "--config" || arg == "-c") && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(path.to_string());
        }
    }
    None
}

fn init_logging(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.logging.level))?;

    match settings.logging.format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .try_init()?;
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .try_init()?;
        }
    }

    Ok(())
}

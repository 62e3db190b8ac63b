//! ca-injector - admission webhook that injects CA bundles into pods.
//!
//! This is the main entry point that:
//! - Initializes structured logging
//! - Creates the Kubernetes client
//! - Loads and resolves the bundle config (startup fails if this fails)
//! - Starts the health server, config watcher and webhook server

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use kube::Client;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use ca_injector::config::{DEFAULT_CONFIG_PATH, DEFAULT_WATCH_INTERVAL};
use ca_injector::health::{HealthState, run_health_server};
use ca_injector::{
    BundleResolver, ConfigLoader, ConfigStore, KubeClusterClient, MutationEngine, ReqwestFetcher,
    WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH, WebhookState, run_webhook_server,
};

/// Grace period for in-flight admission requests to complete during shutdown
const SHUTDOWN_GRACE_PERIOD_SECS: u64 = 5;

#[derive(Parser, Debug)]
#[command(name = "ca-injector", version, about, long_about = None)]
struct Cli {
    /// Path to the YAML config file
    #[arg(long, env = "CA_INJECTOR_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Seconds between config file change checks
    #[arg(long, env = "CA_INJECTOR_WATCH_INTERVAL", default_value_t = DEFAULT_WATCH_INTERVAL.as_secs())]
    watch_interval: u64,

    /// Path to the webhook TLS certificate
    #[arg(long, env = "CA_INJECTOR_TLS_CERT", default_value = WEBHOOK_CERT_PATH)]
    tls_cert: String,

    /// Path to the webhook TLS private key
    #[arg(long, env = "CA_INJECTOR_TLS_KEY", default_value = WEBHOOK_KEY_PATH)]
    tls_key: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ca_injector=info".parse()?)
                .add_directive("kube=info".parse()?),
        )
        .json()
        .init();

    let cli = Cli::parse();
    info!(config = %cli.config.display(), "Starting ca-injector");

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    let cluster = Arc::new(KubeClusterClient::new(client));
    let resolver = BundleResolver::new(cluster.clone(), Arc::new(ReqwestFetcher::new()?));

    // Create shared health state
    let health_state = Arc::new(HealthState::new());

    let loader = ConfigLoader::new(&cli.config, resolver).with_health_state(health_state.clone());
    let initial = loader.load().await?;
    health_state.metrics.record_config_reload(true);
    health_state
        .metrics
        .set_bundles_loaded(initial.bundles.len() as i64);
    let store = Arc::new(ConfigStore::new(initial));
    health_state.set_ready(true).await;

    // Start health server
    let health_handle = {
        let health_state = health_state.clone();
        tokio::spawn(async move {
            if let Err(e) = run_health_server(health_state).await {
                error!("Health server error: {}", e);
            }
        })
    };

    // Start config watcher
    let cancel = CancellationToken::new();
    let watcher_handle = {
        let store = store.clone();
        let cancel = cancel.clone();
        let interval = Duration::from_secs(cli.watch_interval.max(1));
        tokio::spawn(async move {
            loader.watch(store, interval, cancel).await;
        })
    };

    // Start webhook server
    let webhook_handle = {
        let engine = MutationEngine::new(store, cluster).with_health_state(health_state.clone());
        let state = Arc::new(WebhookState::new(engine).with_health_state(health_state.clone()));
        tokio::spawn(async move {
            if let Err(e) = run_webhook_server(state, &cli.tls_cert, &cli.tls_key).await {
                error!("Webhook server error: {}", e);
            }
        })
    };

    // Wait for any task to complete (or fail), or shutdown signal
    tokio::select! {
        result = health_handle => {
            if let Err(e) = result {
                error!("Health server task panicked: {}", e);
            }
        }
        result = webhook_handle => {
            if let Err(e) = result {
                error!("Webhook server task panicked: {}", e);
            }
        }
        result = watcher_handle => {
            if let Err(e) = result {
                error!("Config watcher task panicked: {}", e);
            }
        }
        // Handle graceful shutdown on SIGTERM or SIGINT
        _ = shutdown_signal() => {
            info!("Received shutdown signal, initiating graceful shutdown...");
            cancel.cancel();

            // Mark as not ready so the API server stops routing admissions here
            health_state.set_ready(false).await;
            info!("Marked injector as not ready");

            info!(
                "Waiting {}s for in-flight admission requests to complete...",
                SHUTDOWN_GRACE_PERIOD_SECS
            );
            tokio::time::sleep(Duration::from_secs(SHUTDOWN_GRACE_PERIOD_SECS)).await;

            info!("Grace period complete, shutting down");
        }
    }

    cancel.cancel();
    info!("Injector stopped");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
///
/// Note: Signal handler setup failures are fatal - the injector cannot shut down
/// gracefully without them. Using expect() here is intentional.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

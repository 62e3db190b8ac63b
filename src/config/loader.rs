//! Loading, reloading and watching the config file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{Config, ConfigStore, RawConfig, UnresolvedConfig};
use crate::bundle::BundleResolver;
use crate::error::{Error, Result};
use crate::health::HealthState;

/// Default location of the config file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/ca-injector/config.yaml";
/// Default polling interval for config file changes
pub const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_secs(10);

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Builds [`Config`] generations from the config file, the environment and the
/// bundle sources they name.
#[derive(Clone)]
pub struct ConfigLoader {
    path: PathBuf,
    resolver: BundleResolver,
    env: EnvLookup,
    health_state: Option<Arc<HealthState>>,
}

impl ConfigLoader {
    /// Create a loader reading `path` and the process environment
    pub fn new(path: impl Into<PathBuf>, resolver: BundleResolver) -> Self {
        Self {
            path: path.into(),
            resolver,
            env: Arc::new(|key| std::env::var(key).ok()),
            health_state: None,
        }
    }

    /// Replace the environment lookup
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Arc::new(lookup);
        self
    }

    /// Record reload metrics on the given health state
    pub fn with_health_state(mut self, health_state: Arc<HealthState>) -> Self {
        self.health_state = Some(health_state);
        self
    }

    /// Path of the config file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the file and apply environment overrides
    pub async fn read(&self) -> Result<UnresolvedConfig> {
        let text = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            Error::Config(format!("failed to read {}: {}", self.path.display(), e))
        })?;
        let mut raw = RawConfig::from_yaml(&text)?;
        raw.apply_env(|key| (self.env)(key))?;
        raw.validate()
    }

    /// Resolve every bundle of an unresolved config into a new generation
    pub async fn build(&self, unresolved: UnresolvedConfig) -> Result<Config> {
        let bundles = self.resolver.resolve_all(&unresolved.sources).await?;
        Ok(Config {
            annotation_inject: unresolved.annotation_inject,
            annotation_injected: unresolved.annotation_injected,
            config_map_name: unresolved.config_map_name,
            bundles,
        })
    }

    /// Read and fully resolve a new generation
    pub async fn load(&self) -> Result<Config> {
        info!(path = %self.path.display(), "Loading config");
        let unresolved = self.read().await?;
        let config = self.build(unresolved).await?;
        info!(
            bundles = config.bundles.len(),
            config_map = %config.config_map_name,
            "Config loaded"
        );
        Ok(config)
    }

    /// Load a new generation and publish it.
    ///
    /// On failure the store keeps the previous generation.
    pub async fn reload(&self, store: &ConfigStore) -> Result<()> {
        let result = self.load().await;
        if let Some(ref state) = self.health_state {
            state.metrics.record_config_reload(result.is_ok());
        }
        let config = result?;
        if let Some(ref state) = self.health_state {
            state.metrics.set_bundles_loaded(config.bundles.len() as i64);
        }
        store.replace(config).await;
        Ok(())
    }

    /// Reload whenever the config file's modification time changes.
    ///
    /// Runs until `cancel` fires. A reload in progress is abandoned on
    /// cancellation, leaving the store untouched.
    pub async fn watch(&self, store: Arc<ConfigStore>, interval: Duration, cancel: CancellationToken) {
        info!(path = %self.path.display(), interval_secs = interval.as_secs(), "Watching config file");
        let mut last_modified = self.modified().await;
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Config watcher stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            let modified = self.modified().await;
            if modified.is_none() || modified == last_modified {
                continue;
            }
            last_modified = modified;

            info!(path = %self.path.display(), "Config file changed, reloading");
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(Error::Cancelled),
                result = self.reload(&store) => result,
            };
            match outcome {
                Ok(()) => info!("Config reloaded"),
                Err(Error::Cancelled) => {
                    debug!("Config reload cancelled");
                    return;
                }
                Err(e) => error!(error = %e, "Config reload failed, keeping previous config"),
            }
        }
    }

    async fn modified(&self) -> Option<SystemTime> {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.modified().ok(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Cannot stat config file");
                None
            }
        }
    }
}

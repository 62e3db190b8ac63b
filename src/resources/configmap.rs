//! Bundle ConfigMap synchronization.
//!
//! Each namespace that runs injected pods gets one ConfigMap holding every
//! bundle its pods asked for, keyed by bundle name. [`ConfigMapSynchronizer::upsert`]
//! creates or merges entries and skips the write when the stored value already
//! matches, so repeated admissions don't bump the resourceVersion.
//!
//! There is no client-side locking. Concurrent upserts race at the API server:
//! a create that loses (`AlreadyExists`) or an update with a stale
//! resourceVersion is retried against a fresh read.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use super::common::generate_configmap;
use crate::cluster::ClusterClient;
use crate::error::{Error, Result};

/// Attempts made before a conflicting upsert is reported as a failure
pub const MAX_SYNC_ATTEMPTS: u32 = 3;

/// What an upsert did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    /// ConfigMap did not exist and was created
    Created,
    /// Bundle key was added or changed
    Updated,
    /// Stored value already matched; nothing written
    Unchanged,
}

impl SyncOutcome {
    /// Lowercase label for metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOutcome::Created => "created",
            SyncOutcome::Updated => "updated",
            SyncOutcome::Unchanged => "unchanged",
        }
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keeps the named bundle ConfigMap of a namespace up to date
#[derive(Clone)]
pub struct ConfigMapSynchronizer {
    cluster: Arc<dyn ClusterClient>,
    name: String,
}

impl ConfigMapSynchronizer {
    /// Create a synchronizer for ConfigMaps called `name`
    pub fn new(cluster: Arc<dyn ClusterClient>, name: impl Into<String>) -> Self {
        Self {
            cluster,
            name: name.into(),
        }
    }

    /// Name of the managed ConfigMap
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ensure `namespace`'s ConfigMap maps `bundle` to `content`.
    ///
    /// Other keys already present are preserved. Every failure is reported as
    /// [`Error::Sync`].
    pub async fn upsert(&self, namespace: &str, bundle: &str, content: &str) -> Result<SyncOutcome> {
        let mut attempt = 1;
        loop {
            match self.try_upsert(namespace, bundle, content).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.is_conflict() && attempt < MAX_SYNC_ATTEMPTS => {
                    debug!(
                        namespace = %namespace,
                        configmap = %self.name,
                        attempt,
                        error = %e,
                        "ConfigMap changed concurrently, retrying"
                    );
                    attempt += 1;
                }
                Err(e @ Error::Sync { .. }) => return Err(e),
                Err(e) => return Err(Error::sync(namespace, &self.name, e)),
            }
        }
    }

    async fn try_upsert(&self, namespace: &str, bundle: &str, content: &str) -> Result<SyncOutcome> {
        let existing = self.cluster.get_config_map(namespace, &self.name).await?;

        let Some(mut config_map) = existing else {
            info!(namespace = %namespace, bundle = %bundle, "Creating bundles configmap");
            let config_map = generate_configmap(namespace, &self.name, bundle, content);
            self.cluster.create_config_map(namespace, &config_map).await?;
            return Ok(SyncOutcome::Created);
        };

        let data = config_map.data.get_or_insert_with(BTreeMap::new);
        if data.get(bundle).map(String::as_str) == Some(content) {
            debug!(namespace = %namespace, bundle = %bundle, "Bundle already up to date");
            return Ok(SyncOutcome::Unchanged);
        }

        info!(namespace = %namespace, bundle = %bundle, "Adding/updating bundle");
        data.insert(bundle.to_string(), content.to_string());
        self.cluster.update_config_map(namespace, &config_map).await?;
        Ok(SyncOutcome::Updated)
    }
}

//! Cluster access used by bundle resolution and ConfigMap synchronization.
//!
//! [`ClusterClient`] is the only way the injector talks to the Kubernetes API,
//! so tests can substitute an in-memory implementation.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::api::{Api, PostParams};
use kube::Client;

#[cfg(test)]
use mockall::automock;

use crate::error::{Error, Result};

/// Trait abstracting the Kubernetes operations the injector needs.
///
/// Lookups return `Ok(None)` when the object does not exist. Writes map an
/// HTTP 409 to [`Error::Conflict`].
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Get a Secret by namespace and name
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>>;

    /// Get a ConfigMap by namespace and name
    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>>;

    /// Create a ConfigMap in the namespace
    async fn create_config_map(&self, namespace: &str, config_map: &ConfigMap)
    -> Result<ConfigMap>;

    /// Replace an existing ConfigMap in the namespace
    async fn update_config_map(&self, namespace: &str, config_map: &ConfigMap)
    -> Result<ConfigMap>;
}

/// [`ClusterClient`] backed by a kube-rs client
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    /// Wrap the given kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn map_write_error(err: kube::Error, what: &str) -> Error {
    match err {
        kube::Error::Api(e) if e.code == 409 => Error::Conflict(format!("{}: {}", what, e.message)),
        other => Error::Kube(other),
    }
}

fn config_map_name(config_map: &ConfigMap) -> Result<&str> {
    config_map
        .metadata
        .name
        .as_deref()
        .ok_or_else(|| Error::Config("ConfigMap has no name".to_string()))
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn create_config_map(
        &self,
        namespace: &str,
        config_map: &ConfigMap,
    ) -> Result<ConfigMap> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), config_map)
            .await
            .map_err(|e| map_write_error(e, "ConfigMap already exists"))
    }

    async fn update_config_map(
        &self,
        namespace: &str,
        config_map: &ConfigMap,
    ) -> Result<ConfigMap> {
        let name = config_map_name(config_map)?;
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        api.replace(name, &PostParams::default(), config_map)
            .await
            .map_err(|e| map_write_error(e, "ConfigMap was modified concurrently"))
    }
}

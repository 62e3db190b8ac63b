//! Injector configuration.
//!
//! A [`Config`] is one immutable generation: annotation keys, the target
//! ConfigMap name and every bundle already resolved to validated PEM. Readers
//! take a snapshot from the [`ConfigStore`] and keep it for the whole request;
//! reloads build a new generation and swap it in atomically.

mod file;
mod loader;

pub use file::{
    BundleSourceSpec, ENV_ANNOTATIONS_INJECT, ENV_ANNOTATIONS_INJECTED, ENV_CONFIGMAP_NAME,
    ENV_ROOTCA, RawConfig, SourceType, UnresolvedConfig,
};
pub use loader::{ConfigLoader, DEFAULT_CONFIG_PATH, DEFAULT_WATCH_INTERVAL};

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::bundle::ResolvedBundle;
use crate::error::{Error, Result};

/// Reference to a single key of a namespaced object, written `namespace/name/key`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectKeyRef {
    pub namespace: String,
    pub name: String,
    pub key: String,
}

impl ObjectKeyRef {
    /// Parse a `namespace/name/key` triple
    pub fn parse(bundle: &str, source: &str) -> Result<Self> {
        let parts: Vec<&str> = source.split('/').collect();
        match parts.as_slice() {
            [namespace, name, key]
                if !namespace.is_empty() && !name.is_empty() && !key.is_empty() =>
            {
                Ok(Self {
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                    key: key.to_string(),
                })
            }
            _ => Err(Error::InvalidSource {
                bundle: bundle.to_string(),
                message: format!("expected namespace/name/key, got {:?}", source),
            }),
        }
    }
}

impl fmt::Display for ObjectKeyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.name, self.key)
    }
}

/// Where a bundle's PEM comes from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BundleSource {
    /// Literal PEM text
    Local(String),
    /// HTTP(S) URL serving PEM text
    Url(String),
    /// Key of a Secret
    Secret(ObjectKeyRef),
    /// Key of a ConfigMap
    ConfigMap(ObjectKeyRef),
}

impl BundleSource {
    /// Build a source from its declared type and raw source string
    pub fn parse(bundle: &str, spec: &BundleSourceSpec) -> Result<Self> {
        Ok(match spec.kind {
            SourceType::Local => BundleSource::Local(spec.source.clone()),
            SourceType::Url => BundleSource::Url(spec.source.clone()),
            SourceType::Secret => BundleSource::Secret(ObjectKeyRef::parse(bundle, &spec.source)?),
            SourceType::ConfigMap => {
                BundleSource::ConfigMap(ObjectKeyRef::parse(bundle, &spec.source)?)
            }
        })
    }

    /// Source type label used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            BundleSource::Local(_) => "local",
            BundleSource::Url(_) => "url",
            BundleSource::Secret(_) => "secret",
            BundleSource::ConfigMap(_) => "configMap",
        }
    }
}

impl fmt::Display for BundleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Local sources are the certificate itself; don't dump it into logs
            BundleSource::Local(_) => write!(f, "local:<inline>"),
            BundleSource::Url(url) => write!(f, "url:{}", url),
            BundleSource::Secret(r) => write!(f, "secret:{}", r),
            BundleSource::ConfigMap(r) => write!(f, "configMap:{}", r),
        }
    }
}

/// One fully resolved configuration generation
#[derive(Clone, Debug)]
pub struct Config {
    /// Pod annotation requesting injection (comma separated bundle names)
    pub annotation_inject: String,
    /// Pod annotation written once injection is done
    pub annotation_injected: String,
    /// Name of the bundle ConfigMap maintained in each namespace
    pub config_map_name: String,
    /// Resolved bundles by name
    pub bundles: BTreeMap<String, ResolvedBundle>,
}

impl Config {
    /// Look up a resolved bundle by name
    pub fn bundle(&self, name: &str) -> Option<&ResolvedBundle> {
        self.bundles.get(name)
    }
}

/// Holder for the current [`Config`] generation.
///
/// Readers clone the `Arc` and never see a half-built config; writers replace
/// the whole generation.
pub struct ConfigStore {
    current: RwLock<Arc<Config>>,
}

impl ConfigStore {
    /// Create a store publishing the initial generation
    pub fn new(config: Config) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
        }
    }

    /// Get the current generation
    pub async fn snapshot(&self) -> Arc<Config> {
        self.current.read().await.clone()
    }

    /// Publish a new generation
    pub async fn replace(&self, config: Config) {
        *self.current.write().await = Arc::new(config);
    }
}

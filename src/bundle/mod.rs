//! Bundle resolution.
//!
//! Turns a configured [`BundleSource`] into PEM text and validates it. All
//! bundles of a config generation are resolved together at load time; the
//! admission path only ever reads the results.
//!
//! ## Validation level
//!
//! [`validate_certificate`] is deliberately tolerant: content is accepted when it
//! is non-empty and contains the `-----BEGIN CERTIFICATE-----` marker anywhere.
//! End markers, base64 bodies and DER structure are not checked.

pub mod fetch;

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::{debug, info};

use crate::cluster::ClusterClient;
use crate::config::{BundleSource, ObjectKeyRef};
use crate::error::{Error, Result};

pub use fetch::{HttpFetcher, ReqwestFetcher};

/// Marker that identifies PEM certificate material
pub const CERTIFICATE_MARKER: &str = "-----BEGIN CERTIFICATE-----";

/// Check that candidate bundle text looks like a PEM certificate
pub fn validate_certificate(bundle: &str, candidate: &str) -> Result<()> {
    if candidate.is_empty() || !candidate.contains(CERTIFICATE_MARKER) {
        return Err(Error::InvalidCertificate {
            bundle: bundle.to_string(),
        });
    }
    Ok(())
}

/// A bundle whose PEM has passed validation.
///
/// Only [`BundleResolver`] creates these, so holding one means the content was
/// validated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedBundle {
    source: BundleSource,
    pem: String,
}

impl ResolvedBundle {
    pub(crate) fn new(bundle: &str, source: BundleSource, pem: String) -> Result<Self> {
        validate_certificate(bundle, &pem)?;
        Ok(Self { source, pem })
    }

    /// Validated PEM text
    pub fn pem(&self) -> &str {
        &self.pem
    }

    /// Source the PEM was resolved from
    pub fn source(&self) -> &BundleSource {
        &self.source
    }
}

/// Resolves bundle sources using injected cluster and HTTP capabilities
#[derive(Clone)]
pub struct BundleResolver {
    cluster: Arc<dyn ClusterClient>,
    http: Arc<dyn HttpFetcher>,
}

impl BundleResolver {
    /// Create a resolver
    pub fn new(cluster: Arc<dyn ClusterClient>, http: Arc<dyn HttpFetcher>) -> Self {
        Self { cluster, http }
    }

    /// Resolve a single bundle to validated PEM text
    pub async fn resolve(&self, name: &str, source: &BundleSource) -> Result<String> {
        Ok(self.resolve_bundle(name, source).await?.pem)
    }

    /// Resolve a single bundle
    pub async fn resolve_bundle(&self, name: &str, source: &BundleSource) -> Result<ResolvedBundle> {
        info!(bundle = %name, source = %source, "Fetching bundle");
        let pem = match source {
            BundleSource::Local(pem) => pem.clone(),
            BundleSource::Url(url) => self.http.get(url).await.map_err(|e| match e {
                Error::Fetch { message, .. } => Error::fetch(name, message),
                other => Error::fetch(name, other),
            })?,
            BundleSource::Secret(r) => self.from_secret(name, r).await?,
            BundleSource::ConfigMap(r) => self.from_config_map(name, r).await?,
        };
        ResolvedBundle::new(name, source.clone(), pem)
    }

    /// Resolve every source, in name order.
    ///
    /// The first failure aborts the whole set; no partial table is returned.
    pub async fn resolve_all(
        &self,
        sources: &BTreeMap<String, BundleSource>,
    ) -> Result<BTreeMap<String, ResolvedBundle>> {
        let mut bundles = BTreeMap::new();
        for (name, source) in sources {
            let bundle = self.resolve_bundle(name, source).await?;
            debug!(bundle = %name, bytes = bundle.pem.len(), "Bundle resolved");
            bundles.insert(name.clone(), bundle);
        }
        Ok(bundles)
    }

    async fn from_secret(&self, name: &str, r: &ObjectKeyRef) -> Result<String> {
        let secret = self
            .cluster
            .get_secret(&r.namespace, &r.name)
            .await
            .map_err(|e| Error::fetch(name, e))?
            .ok_or_else(|| Error::not_found(name, format!("Secret {}/{}", r.namespace, r.name)))?;

        let value = secret
            .data
            .as_ref()
            .and_then(|data| data.get(&r.key))
            .ok_or_else(|| Error::not_found(name, format!("key {} in Secret {}", r.key, r.name)))?;

        Ok(decode_secret_value(&value.0))
    }

    async fn from_config_map(&self, name: &str, r: &ObjectKeyRef) -> Result<String> {
        let config_map = self
            .cluster
            .get_config_map(&r.namespace, &r.name)
            .await
            .map_err(|e| Error::fetch(name, e))?
            .ok_or_else(|| {
                Error::not_found(name, format!("ConfigMap {}/{}", r.namespace, r.name))
            })?;

        config_map
            .data
            .as_ref()
            .and_then(|data| data.get(&r.key))
            .cloned()
            .ok_or_else(|| {
                Error::not_found(name, format!("key {} in ConfigMap {}", r.key, r.name))
            })
    }
}

/// Secret values may hold base64 of the PEM (an extra encoding layer on top of
/// the API's own) or the PEM itself. Decode when the bytes are valid base64,
/// otherwise take them as text. Line breaks are ignored, so output wrapped by
/// the `base64` CLI decodes too.
fn decode_secret_value(raw: &[u8]) -> String {
    let compact: Vec<u8> = raw.iter().copied().filter(|b| !b.is_ascii_whitespace()).collect();
    match STANDARD.decode(&compact) {
        Ok(decoded) => String::from_utf8_lossy(&decoded).into_owned(),
        Err(_) => String::from_utf8_lossy(raw).into_owned(),
    }
}

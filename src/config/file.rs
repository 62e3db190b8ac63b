//! On-disk configuration format and environment overrides.

use std::collections::BTreeMap;

use serde::Deserialize;

use super::BundleSource;
use crate::error::{Error, Result};

/// Overrides `configMapName`
pub const ENV_CONFIGMAP_NAME: &str = "CA_INJECTOR_CONFIGMAP_NAME";
/// Overrides `annotations.inject`
pub const ENV_ANNOTATIONS_INJECT: &str = "CA_INJECTOR_ANNOTATIONS_INJECT";
/// Overrides `annotations.injected`
pub const ENV_ANNOTATIONS_INJECTED: &str = "CA_INJECTOR_ANNOTATIONS_INJECTED";
/// Replaces the whole `rootCA` table with a JSON object
pub const ENV_ROOTCA: &str = "CA_INJECTOR_ROOTCA";

/// Declared type of a bundle source
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceType {
    Local,
    Url,
    Secret,
    #[serde(alias = "configmap")]
    ConfigMap,
}

/// A bundle entry as written in the config file
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct BundleSourceSpec {
    #[serde(rename = "type")]
    pub kind: SourceType,
    pub source: String,
}

/// Annotation keys section
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawAnnotations {
    pub inject: Option<String>,
    pub injected: Option<String>,
}

/// Config file contents before validation
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawConfig {
    #[serde(default)]
    pub annotations: RawAnnotations,
    #[serde(default, alias = "configmapname")]
    pub config_map_name: Option<String>,
    #[serde(default, rename = "rootCA", alias = "rootca")]
    pub root_ca: BTreeMap<String, BundleSourceSpec>,
}

/// Validated settings with bundle sources not yet resolved
#[derive(Clone, Debug)]
pub struct UnresolvedConfig {
    pub annotation_inject: String,
    pub annotation_injected: String,
    pub config_map_name: String,
    pub sources: BTreeMap<String, BundleSource>,
}

impl RawConfig {
    /// Parse YAML config text. An empty document yields an empty config.
    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|e| Error::Config(format!("invalid config file: {}", e)))
    }

    /// Apply overrides from the process environment
    pub fn apply_process_env(&mut self) -> Result<()> {
        self.apply_env(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_CONFIGMAP_NAME) {
            self.config_map_name = Some(value);
        }
        if let Some(value) = lookup(ENV_ANNOTATIONS_INJECT) {
            self.annotations.inject = Some(value);
        }
        if let Some(value) = lookup(ENV_ANNOTATIONS_INJECTED) {
            self.annotations.injected = Some(value);
        }
        if let Some(value) = lookup(ENV_ROOTCA) {
            self.root_ca = serde_json::from_str(&value)
                .map_err(|e| Error::Config(format!("invalid {}: {}", ENV_ROOTCA, e)))?;
        }
        Ok(())
    }

    /// Check required settings and parse every bundle source
    pub fn validate(self) -> Result<UnresolvedConfig> {
        let annotation_inject = required(self.annotations.inject, "annotations.inject")?;
        let annotation_injected = required(self.annotations.injected, "annotations.injected")?;
        let config_map_name = required(self.config_map_name, "configMapName")?;

        let sources = self
            .root_ca
            .iter()
            .map(|(name, spec)| Ok((name.clone(), BundleSource::parse(name, spec)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;

        Ok(UnresolvedConfig {
            annotation_inject,
            annotation_injected,
            config_map_name,
            sources,
        })
    }
}

fn required(value: Option<String>, key: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::Config(format!("missing required setting {}", key))),
    }
}

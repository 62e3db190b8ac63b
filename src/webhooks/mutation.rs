//! Pod mutation.
//!
//! For each admission request the [`MutationEngine`]:
//! 1. Checks the request targets `v1/pods` and decodes the object as a Pod
//! 2. Reads the inject annotation; without it, or when it names no bundles,
//!    the pod is admitted unchanged
//! 3. Synchronizes every requested bundle into the namespace's ConfigMap
//! 4. Builds a mutated copy with the bundle volume, one mount per container
//!    per bundle, and the injected annotation
//! 5. Diffs the original against the copy
//!
//! The whole request reads a single config snapshot. Any failure aborts the
//! request; no partial patch is ever returned.

use std::collections::BTreeMap;
use std::sync::Arc;

use json_patch::PatchOperation;
use k8s_openapi::api::core::v1::Pod;
use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse};
use tracing::{debug, info};

use super::patch;
use crate::cluster::ClusterClient;
use crate::config::{Config, ConfigStore};
use crate::error::{Error, Result};
use crate::health::HealthState;
use crate::resources::{ConfigMapSynchronizer, bundle_mount_path, bundle_volume, bundle_volume_mount};

/// Value written to the injected annotation
pub const INJECTED_VALUE: &str = "true";

/// Decides and computes the patch for pod admission requests
#[derive(Clone)]
pub struct MutationEngine {
    store: Arc<ConfigStore>,
    cluster: Arc<dyn ClusterClient>,
    health_state: Option<Arc<HealthState>>,
}

impl MutationEngine {
    /// Create an engine reading config from `store`
    pub fn new(store: Arc<ConfigStore>, cluster: Arc<dyn ClusterClient>) -> Self {
        Self {
            store,
            cluster,
            health_state: None,
        }
    }

    /// Record synchronization metrics on the given health state
    pub fn with_health_state(mut self, health_state: Arc<HealthState>) -> Self {
        self.health_state = Some(health_state);
        self
    }

    /// Compute the patch operations for one admission request
    pub async fn mutate(&self, request: &AdmissionRequest<DynamicObject>) -> Result<Vec<PatchOperation>> {
        let pod = decode_pod(request)?;
        let config = self.store.snapshot().await;
        let pod_name = pod_display_name(&pod);

        let Some(requested) = pod
            .metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(&config.annotation_inject))
        else {
            debug!(uid = %request.uid, pod = %pod_name, "No inject annotation, admitting unchanged");
            return Ok(Vec::new());
        };

        let bundles = parse_bundle_list(requested);
        if bundles.is_empty() {
            debug!(uid = %request.uid, pod = %pod_name, "Inject annotation names no bundles, admitting unchanged");
            return Ok(Vec::new());
        }

        let namespace = request
            .namespace
            .clone()
            .or_else(|| pod.metadata.namespace.clone())
            .ok_or_else(|| Error::Decode("admission request has no namespace".to_string()))?;

        info!(
            uid = %request.uid,
            namespace = %namespace,
            pod = %pod_name,
            bundles = ?bundles,
            "Injecting bundles"
        );

        self.synchronize(&config, &namespace, &bundles).await?;

        let mutated = inject(&pod, &config, &bundles);
        let ops = patch::diff(&pod, &mutated)?;
        info!(uid = %request.uid, pod = %pod_name, patch_ops = ops.len(), "Pod mutated");
        Ok(ops)
    }

    /// Compute the admission response for one request
    pub async fn review(&self, request: &AdmissionRequest<DynamicObject>) -> Result<AdmissionResponse> {
        let ops = self.mutate(request).await?;
        patch_response(request, ops)
    }

    async fn synchronize(&self, config: &Config, namespace: &str, bundles: &[String]) -> Result<()> {
        // Every name must be known before anything is written
        let requested = bundles
            .iter()
            .map(|name| {
                config
                    .bundle(name)
                    .map(|bundle| (name, bundle))
                    .ok_or_else(|| Error::UnknownBundle(name.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        let synchronizer = ConfigMapSynchronizer::new(self.cluster.clone(), &config.config_map_name);
        for (name, bundle) in requested {
            let outcome = synchronizer.upsert(namespace, name, bundle.pem()).await?;
            if let Some(ref state) = self.health_state {
                state.metrics.record_sync(outcome.as_str());
            }
        }
        Ok(())
    }
}

/// Wrap patch operations in an allowing admission response
pub fn patch_response(
    request: &AdmissionRequest<DynamicObject>,
    ops: Vec<PatchOperation>,
) -> Result<AdmissionResponse> {
    Ok(AdmissionResponse::from(request).with_patch(json_patch::Patch(ops))?)
}

/// Check the request is for a core v1 Pod and decode its object
pub fn decode_pod(request: &AdmissionRequest<DynamicObject>) -> Result<Pod> {
    let resource = &request.resource;
    if !(resource.group.is_empty() && resource.version == "v1" && resource.resource == "pods") {
        return Err(Error::Decode(format!(
            "expected resource v1/pods, got {}/{}/{}",
            resource.group, resource.version, resource.resource
        )));
    }

    let object = request
        .object
        .as_ref()
        .ok_or_else(|| Error::Decode("admission request has no object".to_string()))?;

    let kind = object.types.as_ref().map(|t| t.kind.as_str()).unwrap_or_default();
    if kind != "Pod" {
        return Err(Error::Decode(format!("expected kind Pod, got {:?}", kind)));
    }

    let value = serde_json::to_value(object)?;
    serde_json::from_value(value).map_err(|e| Error::Decode(format!("object is not a Pod: {}", e)))
}

/// Split an inject annotation into bundle names.
///
/// Names are trimmed, empty entries dropped and repeats ignored; order is kept.
pub fn parse_bundle_list(value: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for name in value.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Build the mutated copy of `pod` with `bundles` injected.
///
/// Entries the pod already carries (same volume name, same mount path) are not
/// duplicated, so re-admitting an injected pod yields no volume or mount changes.
pub fn inject(pod: &Pod, config: &Config, bundles: &[String]) -> Pod {
    let mut mutated = pod.clone();
    let name = &config.config_map_name;
    let spec = mutated.spec.get_or_insert_with(Default::default);

    let volumes = spec.volumes.get_or_insert_with(Vec::new);
    if !volumes.iter().any(|v| &v.name == name) {
        volumes.push(bundle_volume(name));
    }

    for container in &mut spec.containers {
        let mounts = container.volume_mounts.get_or_insert_with(Vec::new);
        for bundle in bundles {
            let path = bundle_mount_path(bundle);
            if !mounts.iter().any(|m| m.mount_path == path) {
                mounts.push(bundle_volume_mount(name, bundle));
            }
        }
    }

    mutated
        .metadata
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(config.annotation_injected.clone(), INJECTED_VALUE.to_string());

    mutated
}

fn pod_display_name(pod: &Pod) -> String {
    match (&pod.metadata.name, &pod.metadata.generate_name) {
        (Some(name), _) => name.clone(),
        (None, Some(prefix)) => format!("{}*", prefix),
        (None, None) => "<unnamed>".to_string(),
    }
}

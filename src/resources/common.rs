//! Common resource generation utilities.
//!
//! Builds the bundle ConfigMap and the volume/mount entries added to pods.

use k8s_openapi::api::core::v1::{ConfigMap, ConfigMapVolumeSource, Volume, VolumeMount};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

/// Value of the `app.kubernetes.io/managed-by` label on created objects
pub const MANAGED_BY: &str = "ca-injector";

/// Directory bundles are mounted into, one `<bundle>.pem` file each
pub const CERTS_DIR: &str = "/etc/ssl/certs";

/// Standard labels applied to all managed resources
pub fn standard_labels() -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(
        "app.kubernetes.io/managed-by".to_string(),
        MANAGED_BY.to_string(),
    );
    labels.insert(
        "app.kubernetes.io/component".to_string(),
        "ca-bundles".to_string(),
    );
    labels
}

/// Generate a bundle ConfigMap holding a single bundle
pub fn generate_configmap(namespace: &str, name: &str, bundle: &str, content: &str) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(standard_labels()),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(bundle.to_string(), content.to_string())])),
        ..Default::default()
    }
}

/// Path a bundle is mounted at inside containers
pub fn bundle_mount_path(bundle: &str) -> String {
    format!("{}/{}.pem", CERTS_DIR, bundle)
}

/// Pod volume exposing the bundle ConfigMap
pub fn bundle_volume(config_map_name: &str) -> Volume {
    Volume {
        name: config_map_name.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: config_map_name.to_string(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Container mount projecting one bundle key as a PEM file
pub fn bundle_volume_mount(config_map_name: &str, bundle: &str) -> VolumeMount {
    VolumeMount {
        name: config_map_name.to_string(),
        mount_path: bundle_mount_path(bundle),
        sub_path: Some(bundle.to_string()),
        ..Default::default()
    }
}

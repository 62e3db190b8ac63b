//! Test fixtures and builder patterns for pods and admission reviews.

use std::collections::BTreeMap;
use std::sync::Arc;

use ca_injector::bundle::{BundleResolver, HttpFetcher};
use ca_injector::config::{BundleSource, Config};
use ca_injector::webhooks::{AdmissionRequest, AdmissionReview};
use ca_injector::{ClusterClient, Error, Result};
use async_trait::async_trait;
use kube::core::DynamicObject;
use serde_json::{Value, json};

/// Inject annotation used throughout the tests
pub const INJECT_ANNOTATION: &str = "ptonini.github.io/inject-ca";
/// Injected annotation used throughout the tests
pub const INJECTED_ANNOTATION: &str = "ptonini.github.io/ca-injected";
/// Bundle ConfigMap name used throughout the tests
pub const CONFIGMAP_NAME: &str = "ca-injector";

/// Minimal PEM accepted by the validator
pub const TEST_CERTIFICATE: &str = "-----BEGIN CERTIFICATE-----
MIIDdzCCAl+gAwIBAgIEAgAAuTANBgkqhkiG9w0BAQUFADBaMQswCQYDVQQGEwJJ
RTESMBAGA1UEChMJQmFsdGltb3JlMRMwEQYDVQQLEwpDeWJlclRydXN0MSIwIAYD
-----END CERTIFICATE-----
";

/// Second distinct PEM
pub const OTHER_CERTIFICATE: &str = "-----BEGIN CERTIFICATE-----
MIIBszCCAVmgAwIBAgIUYnCtjTB3bYlW3wFbPHy0iR9cZ0owCgYIKoZIzj0EAwIw
-----END CERTIFICATE-----
";

/// Builder for creating Pod test fixtures as JSON.
///
/// # Example
/// ```
/// let pod = PodBuilder::new("web")
///     .namespace("team-a")
///     .inject("baltimore")
///     .containers(2)
///     .build();
/// ```
#[derive(Clone, Debug)]
pub struct PodBuilder {
    name: String,
    namespace: Option<String>,
    annotations: BTreeMap<String, String>,
    containers: usize,
    empty_lists: bool,
}

impl PodBuilder {
    /// Create a new builder with the given pod name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            annotations: BTreeMap::new(),
            containers: 1,
            empty_lists: true,
        }
    }

    /// Set the namespace for the pod.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Request injection of a comma separated bundle list.
    pub fn inject(self, bundles: &str) -> Self {
        self.annotation(INJECT_ANNOTATION, bundles)
    }

    /// Add an annotation.
    pub fn annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Set the number of containers.
    pub fn containers(mut self, count: usize) -> Self {
        self.containers = count;
        self
    }

    /// Omit the `volumes` and `volumeMounts` lists instead of sending them empty.
    pub fn without_lists(mut self) -> Self {
        self.empty_lists = false;
        self
    }

    /// Build the pod as JSON.
    pub fn build(&self) -> Value {
        let containers: Vec<Value> = (0..self.containers)
            .map(|i| {
                let mut container = json!({"name": format!("app-{}", i), "image": "nginx:1.27"});
                if self.empty_lists {
                    container["volumeMounts"] = json!([]);
                }
                container
            })
            .collect();

        let mut pod = json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": self.name},
            "spec": {"containers": containers}
        });
        if self.empty_lists {
            pod["spec"]["volumes"] = json!([]);
        }
        if let Some(ref ns) = self.namespace {
            pod["metadata"]["namespace"] = json!(ns);
        }
        if !self.annotations.is_empty() {
            pod["metadata"]["annotations"] = json!(self.annotations);
        }
        pod
    }
}

/// Serialized AdmissionReview for `object` declared as `resource`
pub fn admission_review(resource: &str, namespace: &str, object: &Value) -> Value {
    json!({
        "apiVersion": "admission.k8s.io/v1",
        "kind": "AdmissionReview",
        "request": {
            "uid": "0f6a8e43-6c1b-4d3e-9a62-2f8b5a9d4c11",
            "kind": {"group": "", "version": "v1", "kind": object["kind"]},
            "resource": {"group": "", "version": "v1", "resource": resource},
            "namespace": namespace,
            "operation": "CREATE",
            "userInfo": {"username": "system:serviceaccount:kube-system:replicaset-controller"},
            "object": object
        }
    })
}

/// Decoded pod admission request
pub fn pod_request(namespace: &str, pod: &Value) -> AdmissionRequest<DynamicObject> {
    request_for("pods", namespace, pod)
}

/// Decoded admission request for an arbitrary resource
pub fn request_for(resource: &str, namespace: &str, object: &Value) -> AdmissionRequest<DynamicObject> {
    let review: AdmissionReview<DynamicObject> =
        serde_json::from_value(admission_review(resource, namespace, object)).unwrap();
    review.try_into().unwrap()
}

/// A plain ConfigMap object, used as the wrong kind of payload
pub fn config_map_object() -> Value {
    json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "not-a-pod"}})
}

/// HTTP fetcher returning canned bodies by URL
#[derive(Default)]
pub struct StaticFetcher {
    bodies: BTreeMap<String, std::result::Result<String, String>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for `url`
    pub fn serve(mut self, url: &str, body: &str) -> Self {
        self.bodies.insert(url.to_string(), Ok(body.to_string()));
        self
    }

    /// Fail requests to `url` with a transport error
    pub fn fail(mut self, url: &str, message: &str) -> Self {
        self.bodies.insert(url.to_string(), Err(message.to_string()));
        self
    }
}

#[async_trait]
impl HttpFetcher for StaticFetcher {
    async fn get(&self, url: &str) -> Result<String> {
        self.bodies
            .get(url)
            .cloned()
            .unwrap_or_else(|| Err(format!("connection refused: {}", url)))
            .map_err(|message| Error::fetch(url, message))
    }
}

/// Resolve `sources` into a config generation with the test annotation keys
pub async fn resolve_config(
    cluster: Arc<dyn ClusterClient>,
    fetcher: Arc<dyn HttpFetcher>,
    sources: BTreeMap<String, BundleSource>,
) -> Result<Config> {
    let resolver = BundleResolver::new(cluster, fetcher);
    Ok(Config {
        annotation_inject: INJECT_ANNOTATION.to_string(),
        annotation_injected: INJECTED_ANNOTATION.to_string(),
        config_map_name: CONFIGMAP_NAME.to_string(),
        bundles: resolver.resolve_all(&sources).await?,
    })
}

/// Config generation with local bundles `a` and `b`
pub async fn local_config(cluster: Arc<dyn ClusterClient>) -> Config {
    let sources = BTreeMap::from([
        ("a".to_string(), BundleSource::Local(TEST_CERTIFICATE.to_string())),
        ("b".to_string(), BundleSource::Local(OTHER_CERTIFICATE.to_string())),
    ]);
    resolve_config(cluster, Arc::new(StaticFetcher::new()), sources)
        .await
        .unwrap()
}

/// Paths of a list of patch operations, in order
pub fn patch_paths(ops: &[json_patch::PatchOperation]) -> Vec<String> {
    ops.iter()
        .map(|op| serde_json::to_value(op).unwrap()["path"].as_str().unwrap().to_string())
        .collect()
}

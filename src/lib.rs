//! ca-injector library crate
//!
//! Admission webhook that mounts centrally configured CA bundles into pods.
//! Bundles are resolved once per config generation; each pod admission
//! synchronizes the namespace's bundle ConfigMap and answers with a JSON Patch.

pub mod bundle;
pub mod cluster;
pub mod config;
pub mod error;
pub mod health;
pub mod resources;
pub mod webhooks;

pub use bundle::{BundleResolver, HttpFetcher, ReqwestFetcher, ResolvedBundle};
pub use cluster::{ClusterClient, KubeClusterClient};
pub use config::{BundleSource, Config, ConfigLoader, ConfigStore};
pub use error::{Error, Result};
pub use health::HealthState;
pub use resources::{ConfigMapSynchronizer, SyncOutcome};
pub use webhooks::{
    MutationEngine, WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH, WEBHOOK_PORT, WebhookError, WebhookState,
    run_webhook_server,
};

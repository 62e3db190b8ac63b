//! Resource generation and synchronization.
//!
//! ## Resources Managed
//!
//! | Resource | Purpose |
//! |----------|---------|
//! | ConfigMap | Per-namespace copy of every injected bundle |
//! | Volume | Pod volume exposing the bundle ConfigMap |
//! | VolumeMount | One `<bundle>.pem` file per container per bundle |

pub mod common;
pub mod configmap;

pub use common::{bundle_mount_path, bundle_volume, bundle_volume_mount, standard_labels};
pub use configmap::{ConfigMapSynchronizer, SyncOutcome};

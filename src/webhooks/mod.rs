//! Admission webhooks.
//!
//! - [`mutation`]: injects CA bundles into annotated pods
//! - [`validation`]: always allows
//! - [`patch`]: JSON Patch between a pod and its mutated copy
//! - `server`: axum router and TLS listener

pub mod mutation;
pub mod patch;
mod server;
pub mod validation;

pub use mutation::{INJECTED_VALUE, MutationEngine};
pub use server::{
    WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH, WEBHOOK_PORT, WebhookError, WebhookState,
    create_webhook_router, run_webhook_server,
};

// Re-export kube-rs admission types for contract testing
pub use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};

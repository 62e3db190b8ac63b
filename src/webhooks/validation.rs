//! Validation reviewer.
//!
//! Admits every request unchanged. It exists so the same service can be
//! registered as both a mutating and a validating webhook.

use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse};
use tracing::debug;

use super::mutation::patch_response;
use crate::error::Result;

/// Allow the request with an empty patch
pub fn review(request: &AdmissionRequest<DynamicObject>) -> Result<AdmissionResponse> {
    debug!(uid = %request.uid, operation = ?request.operation, "Validation request allowed");
    patch_response(request, Vec::new())
}

//! Error types for the injector.
//!
//! A single error enum covers bundle resolution (load/reload time) and admission
//! handling (per request). The HTTP layer uses [`Error::is_client_error`] to pick
//! between a 4xx and a 5xx answer.

use thiserror::Error;

/// Error type for injector operations
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Admission request body, resource or object could not be decoded as a Pod
    #[error("Invalid admission request: {0}")]
    Decode(String),

    /// Resolved bundle content is not PEM certificate material
    #[error("Bundle {bundle} does not contain a valid certificate")]
    InvalidCertificate { bundle: String },

    /// Remote bundle source could not be fetched
    #[error("Failed to fetch bundle {bundle}: {message}")]
    Fetch { bundle: String, message: String },

    /// HTTP transport failure or non-success status
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Secret, ConfigMap or key backing a bundle does not exist
    #[error("Bundle {bundle}: {what} not found")]
    NotFound { bundle: String, what: String },

    /// Bundle source string is malformed for its type
    #[error("Invalid source for bundle {bundle}: {message}")]
    InvalidSource { bundle: String, message: String },

    /// Pod requested a bundle that is not configured
    #[error("Unknown bundle: {0}")]
    UnknownBundle(String),

    /// Bundle ConfigMap could not be read or written during admission
    #[error("Failed to synchronize ConfigMap {namespace}/{name}: {message}")]
    Sync {
        namespace: String,
        name: String,
        message: String,
    },

    /// Object already exists or was modified concurrently
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Configuration file or environment is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation was cancelled before completion
    #[error("Operation cancelled")]
    Cancelled,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Patch could not be attached to the admission response
    #[error("Admission response error: {0}")]
    Patch(#[from] kube::core::admission::SerializePatchError),
}

impl Error {
    /// Create a sync error for the given ConfigMap
    pub fn sync(namespace: &str, name: &str, cause: impl std::fmt::Display) -> Self {
        Self::Sync {
            namespace: namespace.to_string(),
            name: name.to_string(),
            message: cause.to_string(),
        }
    }

    /// Create a fetch error for the given bundle
    pub fn fetch(bundle: &str, cause: impl std::fmt::Display) -> Self {
        Self::Fetch {
            bundle: bundle.to_string(),
            message: cause.to_string(),
        }
    }

    /// Create a not-found error for the given bundle
    pub fn not_found(bundle: &str, what: impl Into<String>) -> Self {
        Self::NotFound {
            bundle: bundle.to_string(),
            what: what.into(),
        }
    }

    /// Check if this error indicates a not-found condition
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::Kube(kube::Error::Api(e)) => e.code == 404,
            _ => false,
        }
    }

    /// Check if this error is a create/update conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }

    /// Check if the failure was caused by the request rather than the server.
    ///
    /// Client errors are answered with 400, everything else with 500.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::Decode(_) | Error::UnknownBundle(_))
    }

    /// Short stable label for metrics and logs
    pub fn reason(&self) -> &'static str {
        match self {
            Error::Kube(_) => "KubeError",
            Error::Decode(_) => "DecodeError",
            Error::InvalidCertificate { .. } => "InvalidCertificate",
            Error::Fetch { .. } => "FetchError",
            Error::Http(_) => "HttpError",
            Error::NotFound { .. } => "NotFound",
            Error::InvalidSource { .. } => "InvalidSource",
            Error::UnknownBundle(_) => "UnknownBundle",
            Error::Sync { .. } => "SyncError",
            Error::Conflict(_) => "Conflict",
            Error::Config(_) => "ConfigError",
            Error::Cancelled => "Cancelled",
            Error::Serialization(_) => "SerializationError",
            Error::Patch(_) => "PatchError",
        }
    }
}

/// Result type alias for injector operations
pub type Result<T> = std::result::Result<T, Error>;

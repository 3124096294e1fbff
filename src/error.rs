use std::sync::Arc;

use thiserror::Error;

/// Errors that can occur while building or querying a content catalog
///
/// Cloneable so one failed rebuild can be reported to every caller that
/// waited on it.
#[derive(Error, Debug, Clone)]
pub enum ContentError {
    #[error("Content not found: {path}")]
    NotFound { path: String },

    #[error("Rate limited by remote service: {message}")]
    RateLimited { message: String },

    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Transient network failure: {message}")]
    TransientNetwork {
        message: String,
        #[source]
        source: Option<Arc<reqwest::Error>>,
    },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    /// Uniform wrapper produced by the fault-normalizing decorator
    #[error("Provider '{provider}' failed during {operation}")]
    ProviderFault {
        provider: String,
        operation: &'static str,
        #[source]
        source: Box<ContentError>,
    },

    #[error("Provider '{provider}' panicked during {operation}: {message}")]
    Panicked {
        provider: String,
        operation: &'static str,
        message: String,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid remote structure: {message}")]
    InvalidStructure { message: String },

    #[error("No content provider registered as '{id}'")]
    NotRegistered { id: String },

    #[error("Content provider '{provider}' is read-only")]
    ReadOnly { provider: String },

    #[error("Cache error: {message}")]
    Cache { message: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[source] Arc<serde_json::Error>),
}

impl ContentError {
    /// Unwraps any number of `ProviderFault` layers
    pub fn root_cause(&self) -> &ContentError {
        let mut current = self;
        while let ContentError::ProviderFault { source, .. } = current {
            current = source;
        }
        current
    }

    /// Returns `true` if retrying the same call might succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.root_cause(),
            ContentError::RateLimited { .. } | ContentError::TransientNetwork { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root_cause(), ContentError::NotFound { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.root_cause(), ContentError::Cancelled)
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        ContentError::ValidationFailed {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for ContentError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return ContentError::InvalidStructure {
                message: err.to_string(),
            };
        }
        ContentError::TransientNetwork {
            message: err.to_string(),
            source: Some(Arc::new(err)),
        }
    }
}

impl From<serde_json::Error> for ContentError {
    fn from(err: serde_json::Error) -> Self {
        ContentError::Serialization(Arc::new(err))
    }
}

impl From<figment::Error> for ContentError {
    fn from(err: figment::Error) -> Self {
        ContentError::InvalidConfig {
            message: err.to_string(),
        }
    }
}

/// Result type alias for catalog operations
pub type Result<T> = std::result::Result<T, ContentError>;

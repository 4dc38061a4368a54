//! Error types for the KubeService operator.

use thiserror::Error;

/// Errors that can occur during operator operations.
#[derive(Debug, Error)]
pub enum OperatorError {
    /// Kubernetes API error.
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// Resource not found.
    #[error("Resource not found: {kind}/{name} in namespace {namespace}")]
    NotFound {
        /// Resource kind.
        kind: String,
        /// Resource name.
        name: String,
        /// Resource namespace.
        namespace: String,
    },

    /// The resource store failed in a way the next pass may not see again.
    #[error("Resource store error: {0}")]
    StoreError(String),

    /// A same-named resource exists but belongs to someone else.
    #[error("{kind}/{name} in namespace {namespace} is not owned by {owner}")]
    OwnershipConflict {
        /// Resource kind.
        kind: String,
        /// Resource name.
        name: String,
        /// Resource namespace.
        namespace: String,
        /// Name of the parent that tried to claim it.
        owner: String,
    },

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// HTTP error.
    #[error("HTTP error: {0}")]
    HttpError(String),
}

impl OperatorError {
    /// Whether re-running the pass can clear the error without manual intervention.
    pub fn is_transient(&self) -> bool {
        match self {
            OperatorError::KubeError(kube::Error::Api(resp)) => {
                resp.code == 409 || resp.code == 429 || resp.code >= 500
            }
            OperatorError::KubeError(_) => true,
            OperatorError::StoreError(_) | OperatorError::HttpError(_) => true,
            OperatorError::NotFound { .. } => true,
            OperatorError::OwnershipConflict { .. }
            | OperatorError::InvalidConfig(_)
            | OperatorError::SerializationError(_) => false,
        }
    }
}

/// Result type for operator operations.
pub type OperatorResult<T> = Result<T, OperatorError>;

impl From<serde_json::Error> for OperatorError {
    fn from(err: serde_json::Error) -> Self {
        OperatorError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for OperatorError {
    fn from(err: serde_yaml::Error) -> Self {
        OperatorError::SerializationError(err.to_string())
    }
}

impl From<reqwest::Error> for OperatorError {
    fn from(err: reqwest::Error) -> Self {
        OperatorError::HttpError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ownership_conflict_needs_a_human() {
        let err = OperatorError::OwnershipConflict {
            kind: "Deployment".into(),
            name: "shop-web-v1".into(),
            namespace: "default".into(),
            owner: "shop-web".into(),
        };
        assert!(!err.is_transient());
        assert_eq!(
            err.to_string(),
            "Deployment/shop-web-v1 in namespace default is not owned by shop-web"
        );
    }

    #[test]
    fn store_errors_are_retried() {
        assert!(OperatorError::StoreError("connection reset".into()).is_transient());
        assert!(!OperatorError::InvalidConfig("missing uid".into()).is_transient());
    }
}

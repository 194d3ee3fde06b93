//! Actuator error taxonomy.
//!
//! Every error names the cluster it belongs to. The taxonomy splits
//! along what the caller should do next: configuration errors need an
//! operator, provider errors deserve a retry, partial failures list
//! exactly which instances still need attention, and cancellation is
//! the caller's own doing.

use thiserror::Error;

use crate::aggregate::AggregateError;

/// Errors surfaced by hibernation actuators.
#[derive(Debug, Error)]
pub enum ActuatorError {
    /// Bad or missing configuration. Retrying without operator action
    /// cannot succeed.
    #[error("configuration error for cluster '{cluster}': {reason}")]
    Configuration { cluster: String, reason: String },

    /// No registered actuator handles the cluster's platform.
    #[error("no actuator registered for cluster '{cluster}' (platform '{platform}')")]
    NoActuator { cluster: String, platform: String },

    /// Provider communication failed before any instance was acted on.
    #[error("provider error for cluster '{cluster}': {source}")]
    Provider {
        cluster: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Some instances in the batch failed; the rest were still attempted.
    #[error("cluster '{cluster}': {source}")]
    Partial {
        cluster: String,
        #[source]
        source: AggregateError,
    },

    /// The caller cancelled the operation before it finished.
    #[error("{operation} cancelled for cluster '{cluster}'")]
    Cancelled {
        cluster: String,
        operation: &'static str,
    },
}

impl ActuatorError {
    /// Configuration failure for the named cluster.
    pub fn config(cluster: impl Into<String>, reason: impl Into<String>) -> Self {
        ActuatorError::Configuration {
            cluster: cluster.into(),
            reason: reason.into(),
        }
    }

    /// Provider failure for the named cluster.
    pub fn provider(
        cluster: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        ActuatorError::Provider {
            cluster: cluster.into(),
            source: source.into(),
        }
    }

    /// True when retrying without operator intervention is pointless.
    ///
    /// Reconcilers use this to park misconfigured clusters instead of
    /// hot-looping on them.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            ActuatorError::Configuration { .. } | ActuatorError::NoActuator { .. }
        )
    }
}

//! Read-only cluster descriptors consumed by hibernation actuators.

use serde::{Deserialize, Serialize};

/// Reference to a named secret held by the surrounding orchestrator.
///
/// The subsystem never stores secret material itself; it resolves
/// references through [`crate::secrets::SecretStore`] at call time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRef {
    /// Secret name within the store.
    pub name: String,
}

impl SecretRef {
    /// Create a reference to the named secret.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Provider platform a cluster runs on.
///
/// Each variant carries the platform-specific addressing an actuator
/// needs. A descriptor may name a platform this build ships no actuator
/// for; selection then fails with a configuration error rather than at
/// parse time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Platform {
    /// OpenStack, addressed by a named profile in the clouds document.
    #[serde(rename = "openstack")]
    OpenStack { cloud: String },

    /// AWS, addressed by region.
    Aws { region: String },
}

impl Platform {
    /// Platform name for logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Platform::OpenStack { .. } => "openstack",
            Platform::Aws { .. } => "aws",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Description of one cluster the subsystem acts on.
///
/// Handles are read-only inputs; actuators never mutate them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterHandle {
    /// Human-facing cluster name, carried in every log line and error.
    pub name: String,

    /// Infrastructure identifier prefixed onto every provider resource
    /// belonging to the cluster. Instance queries scope by it.
    pub infra_id: String,

    /// Provider platform discriminator.
    pub platform: Platform,

    /// Secret holding the provider credential document.
    pub credentials_secret: SecretRef,

    /// Optional secret holding extra CA certificates (PEM entries).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_bundle_secret: Option<SecretRef>,
}

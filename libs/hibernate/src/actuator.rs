//! Hibernation actuator contract and registry.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cluster::ClusterHandle;
use crate::error::ActuatorError;
use crate::machine::PowerCheck;

/// A provider-specific driver for cluster power state.
///
/// Implementations hold no state between calls beyond their injected
/// dependencies: every operation re-lists the cluster's instances and
/// acts on what it observes. Callers own retry policy and pacing; the
/// actuator never retries internally.
#[async_trait]
pub trait HibernationActuator: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &'static str;

    /// Whether this actuator drives the given cluster. Pure; no I/O.
    fn can_handle(&self, cluster: &ClusterHandle) -> bool;

    /// Stop every instance that is running or on its way up.
    ///
    /// Instances already stopped or stopping are left alone; an empty
    /// eligible set is a logged success. Per-instance failures do not
    /// stop the batch and come back aggregated in
    /// [`ActuatorError::Partial`].
    async fn stop_machines(
        &self,
        cluster: &ClusterHandle,
        cancel: &CancellationToken,
    ) -> Result<(), ActuatorError>;

    /// Start every instance that is stopped or on its way down.
    ///
    /// Mirror image of [`HibernationActuator::stop_machines`].
    async fn start_machines(
        &self,
        cluster: &ClusterHandle,
        cancel: &CancellationToken,
    ) -> Result<(), ActuatorError>;

    /// Whether every instance is fully running.
    ///
    /// Fails closed: instances in transitional or ambiguous states count
    /// as not yet running.
    async fn machines_running(
        &self,
        cluster: &ClusterHandle,
        cancel: &CancellationToken,
    ) -> Result<PowerCheck, ActuatorError>;

    /// Whether every instance is fully stopped.
    ///
    /// Fails closed, like [`HibernationActuator::machines_running`].
    async fn machines_stopped(
        &self,
        cluster: &ClusterHandle,
        cancel: &CancellationToken,
    ) -> Result<PowerCheck, ActuatorError>;
}

impl fmt::Debug for dyn HibernationActuator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HibernationActuator")
            .field("name", &self.name())
            .finish()
    }
}

/// Registry of available actuators.
///
/// Built once by the composition root and read-only afterwards; there is
/// no global registration and no locking. Selection scans registration
/// order and returns the first match, so `can_handle` predicates must be
/// mutually exclusive across the registered set.
pub struct ActuatorRegistry {
    actuators: Vec<Arc<dyn HibernationActuator>>,
}

impl ActuatorRegistry {
    /// Create a registry over the given actuators.
    pub fn new(actuators: Vec<Arc<dyn HibernationActuator>>) -> Self {
        Self { actuators }
    }

    /// Add an actuator. Only meaningful before the registry is shared.
    pub fn register(&mut self, actuator: Arc<dyn HibernationActuator>) {
        self.actuators.push(actuator);
    }

    /// Select the actuator responsible for `cluster`.
    pub fn select(
        &self,
        cluster: &ClusterHandle,
    ) -> Result<&Arc<dyn HibernationActuator>, ActuatorError> {
        for actuator in &self.actuators {
            if actuator.can_handle(cluster) {
                debug!(
                    cluster = %cluster.name,
                    actuator = actuator.name(),
                    "Selected hibernation actuator"
                );
                return Ok(actuator);
            }
        }
        Err(ActuatorError::NoActuator {
            cluster: cluster.name.clone(),
            platform: cluster.platform.name().to_string(),
        })
    }

    /// Registered actuators, in registration order.
    pub fn actuators(&self) -> &[Arc<dyn HibernationActuator>] {
        &self.actuators
    }
}

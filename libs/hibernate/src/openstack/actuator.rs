//! OpenStack hibernation actuator.
//!
//! Operation flow: resolve a compute client for the cluster, list the
//! cluster's servers by infra-id prefix, filter them through the state
//! sets, then issue one power action per eligible server. Actions run
//! with bounded concurrency; every target is attempted even when some
//! fail, and the failures come back as one aggregate.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use stratus_cloud_config::CloudsDocument;

use crate::actuator::HibernationActuator;
use crate::aggregate::{AggregateError, InstanceFailure, PowerVerb};
use crate::cluster::{ClusterHandle, Platform};
use crate::error::ActuatorError;
use crate::machine::{filter_records, member_names, InstanceRecord, PowerCheck, PowerState};
use crate::openstack::client::{ComputeClient, NovaComputeClient};
use crate::openstack::states::{self, ServerStateSet};
use crate::secrets::{SecretDocument, SecretStore, SecretStoreError};

/// Secret entry holding the clouds document.
pub const CLOUDS_SECRET_KEY: &str = "clouds.yaml";

/// Cap on concurrently in-flight power actions per batch.
const MAX_IN_FLIGHT_ACTIONS: usize = 8;

const OP_STOP: &str = "stop_machines";
const OP_START: &str = "start_machines";
const OP_RUNNING: &str = "machines_running";
const OP_STOPPED: &str = "machines_stopped";

/// Produces a compute client for a cluster.
///
/// The indirection keeps credential plumbing out of the actuator and
/// lets tests substitute a canned client.
#[async_trait]
pub trait ComputeClientFactory: Send + Sync {
    async fn client_for(
        &self,
        cluster: &ClusterHandle,
    ) -> Result<Arc<dyn ComputeClient>, ActuatorError>;
}

/// Factory backed by the secret store.
///
/// Reads the cluster's credential secret, overlays the optional trust
/// bundle, and builds an authenticated [`NovaComputeClient`].
pub struct NovaClientFactory {
    secrets: Arc<dyn SecretStore>,
}

impl NovaClientFactory {
    pub fn new(secrets: Arc<dyn SecretStore>) -> Self {
        Self { secrets }
    }

    async fn trust_bundle(&self, cluster: &ClusterHandle) -> Result<Option<String>, ActuatorError> {
        let Some(secret_ref) = &cluster.trust_bundle_secret else {
            return Ok(None);
        };
        let document = self
            .secrets
            .fetch(secret_ref)
            .await
            .map_err(|e| secret_error(cluster, e))?;
        let pem = concat_pem_entries(&cluster.name, &document)?;
        if pem.is_empty() {
            Ok(None)
        } else {
            Ok(Some(pem))
        }
    }
}

/// Concatenate every entry of a trust-bundle secret into one PEM blob.
///
/// The entry names do not matter; each entry is expected to hold one or
/// more PEM certificates.
fn concat_pem_entries(
    cluster_name: &str,
    document: &SecretDocument,
) -> Result<String, ActuatorError> {
    let mut pem = String::new();
    for (key, bytes) in document.iter() {
        let text = std::str::from_utf8(bytes).map_err(|_| {
            ActuatorError::config(
                cluster_name,
                format!("trust bundle entry '{key}' is not valid UTF-8"),
            )
        })?;
        if !pem.is_empty() && !pem.ends_with('\n') {
            pem.push('\n');
        }
        pem.push_str(text);
    }
    Ok(pem)
}

fn secret_error(cluster: &ClusterHandle, err: SecretStoreError) -> ActuatorError {
    match err {
        SecretStoreError::NotFound { .. } => ActuatorError::config(&cluster.name, err.to_string()),
        SecretStoreError::Backend { .. } => ActuatorError::provider(&cluster.name, err),
    }
}

#[async_trait]
impl ComputeClientFactory for NovaClientFactory {
    async fn client_for(
        &self,
        cluster: &ClusterHandle,
    ) -> Result<Arc<dyn ComputeClient>, ActuatorError> {
        let Platform::OpenStack { cloud } = &cluster.platform else {
            return Err(ActuatorError::config(
                &cluster.name,
                format!(
                    "platform '{}' is not driven by the openstack actuator",
                    cluster.platform.name()
                ),
            ));
        };

        let document = self
            .secrets
            .fetch(&cluster.credentials_secret)
            .await
            .map_err(|e| secret_error(cluster, e))?;
        let clouds_bytes = document.get(CLOUDS_SECRET_KEY).ok_or_else(|| {
            ActuatorError::config(
                &cluster.name,
                format!("credentials secret has no '{CLOUDS_SECRET_KEY}' entry"),
            )
        })?;
        debug!(
            cluster = %cluster.name,
            secret_hash = %document.data_hash(),
            "Loaded credentials secret"
        );

        let clouds = CloudsDocument::parse(clouds_bytes)
            .map_err(|e| ActuatorError::config(&cluster.name, e.to_string()))?;
        let mut profile = clouds
            .profile(cloud)
            .map_err(|e| ActuatorError::config(&cluster.name, e.to_string()))?
            .clone();

        if let Some(pem) = self.trust_bundle(cluster).await? {
            profile.set_trust_bundle(pem);
        }

        let auth = profile
            .validated_auth(cloud)
            .map_err(|e| ActuatorError::config(&cluster.name, e.to_string()))?;
        let client = NovaComputeClient::new(auth, &profile).map_err(|e| {
            ActuatorError::config(&cluster.name, format!("building compute client: {e}"))
        })?;
        Ok(Arc::new(client))
    }
}

/// Hibernation actuator for OpenStack clusters.
pub struct OpenStackActuator {
    clients: Arc<dyn ComputeClientFactory>,
}

impl OpenStackActuator {
    /// Create an actuator with the default secret-backed client factory.
    pub fn new(secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            clients: Arc::new(NovaClientFactory::new(secrets)),
        }
    }

    /// Create an actuator with a custom client factory.
    pub fn with_factory(clients: Arc<dyn ComputeClientFactory>) -> Self {
        Self { clients }
    }

    async fn list_cluster_servers(
        &self,
        client: &dyn ComputeClient,
        cluster: &ClusterHandle,
        cancel: &CancellationToken,
        operation: &'static str,
    ) -> Result<Vec<InstanceRecord>, ActuatorError> {
        let records = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(ActuatorError::Cancelled {
                    cluster: cluster.name.clone(),
                    operation,
                });
            }
            result = client.list_servers(&cluster.infra_id) => {
                result.map_err(|e| ActuatorError::provider(&cluster.name, e))?
            }
        };

        let mut running = 0usize;
        let mut stopped = 0usize;
        let mut transitioning = 0usize;
        for record in &records {
            match states::power_state(record) {
                PowerState::Running => running += 1,
                PowerState::Stopped => stopped += 1,
                PowerState::Transitioning => transitioning += 1,
            }
            if !states::is_recognized(record) {
                debug!(
                    cluster = %cluster.name,
                    instance = %record.name,
                    status = %record.status,
                    task_state = record.task_state.as_deref().unwrap_or(""),
                    "Instance in unrecognized power state"
                );
            }
        }
        debug!(
            cluster = %cluster.name,
            total = records.len(),
            running,
            stopped,
            transitioning,
            "Listed cluster servers"
        );

        Ok(records)
    }

    /// Issue one power action per target with bounded concurrency.
    ///
    /// Outcomes are collected in input order. Cancellation wins over
    /// partial failure: once the token fires, remaining targets are
    /// abandoned and the whole batch reports cancelled.
    async fn power_batch(
        &self,
        client: &dyn ComputeClient,
        cluster: &ClusterHandle,
        verb: PowerVerb,
        targets: &[&InstanceRecord],
        cancel: &CancellationToken,
    ) -> Result<(), ActuatorError> {
        let semaphore = Semaphore::new(MAX_IN_FLIGHT_ACTIONS);
        let operation = match verb {
            PowerVerb::Stop => OP_STOP,
            PowerVerb::Start => OP_START,
        };

        let calls = targets.iter().map(|record| {
            let semaphore = &semaphore;
            async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    // The semaphore is never closed; a closed error can
                    // only mean the batch is being torn down.
                    Err(_) => return CallOutcome::Cancelled,
                };

                let call = async {
                    match verb {
                        PowerVerb::Stop => client.stop_server(&record.id).await,
                        PowerVerb::Start => client.start_server(&record.id).await,
                    }
                };

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => CallOutcome::Cancelled,
                    result = call => match result {
                        Ok(()) => {
                            match verb {
                                PowerVerb::Stop => info!(
                                    cluster = %cluster.name,
                                    instance = %record.name,
                                    "Stop requested"
                                ),
                                PowerVerb::Start => info!(
                                    cluster = %cluster.name,
                                    instance = %record.name,
                                    "Start requested"
                                ),
                            }
                            CallOutcome::Ok
                        }
                        Err(e) => {
                            warn!(
                                cluster = %cluster.name,
                                instance = %record.name,
                                error = %e,
                                "Power action failed"
                            );
                            CallOutcome::Failed(InstanceFailure::new(&record.name, e))
                        }
                    }
                }
            }
        });

        let outcomes = future::join_all(calls).await;

        let mut failures = Vec::new();
        let mut cancelled = false;
        for outcome in outcomes {
            match outcome {
                CallOutcome::Ok => {}
                CallOutcome::Failed(failure) => failures.push(failure),
                CallOutcome::Cancelled => cancelled = true,
            }
        }

        if cancelled {
            return Err(ActuatorError::Cancelled {
                cluster: cluster.name.clone(),
                operation,
            });
        }
        if let Some(aggregate) = AggregateError::from_failures(verb, failures) {
            warn!(
                cluster = %cluster.name,
                failed = aggregate.failure_count(),
                "Batch power operation partially failed"
            );
            return Err(ActuatorError::Partial {
                cluster: cluster.name.clone(),
                source: aggregate,
            });
        }
        Ok(())
    }
}

enum CallOutcome {
    Ok,
    Failed(InstanceFailure),
    Cancelled,
}

#[async_trait]
impl HibernationActuator for OpenStackActuator {
    fn name(&self) -> &'static str {
        "openstack"
    }

    fn can_handle(&self, cluster: &ClusterHandle) -> bool {
        matches!(cluster.platform, Platform::OpenStack { .. })
    }

    #[instrument(skip_all, fields(cluster = %cluster.name, cloud = "openstack"))]
    async fn stop_machines(
        &self,
        cluster: &ClusterHandle,
        cancel: &CancellationToken,
    ) -> Result<(), ActuatorError> {
        let client = self.clients.client_for(cluster).await?;
        let records = self
            .list_cluster_servers(client.as_ref(), cluster, cancel, OP_STOP)
            .await?;

        let targets = filter_records(&records, &ServerStateSet::StartingOrStarted);
        if targets.is_empty() {
            info!(cluster = %cluster.name, "No instances to stop");
            return Ok(());
        }
        info!(cluster = %cluster.name, count = targets.len(), "Stopping instances");
        self.power_batch(client.as_ref(), cluster, PowerVerb::Stop, &targets, cancel)
            .await
    }

    #[instrument(skip_all, fields(cluster = %cluster.name, cloud = "openstack"))]
    async fn start_machines(
        &self,
        cluster: &ClusterHandle,
        cancel: &CancellationToken,
    ) -> Result<(), ActuatorError> {
        let client = self.clients.client_for(cluster).await?;
        let records = self
            .list_cluster_servers(client.as_ref(), cluster, cancel, OP_START)
            .await?;

        let targets = filter_records(&records, &ServerStateSet::StoppingOrStopped);
        if targets.is_empty() {
            info!(cluster = %cluster.name, "No instances to start");
            return Ok(());
        }
        info!(cluster = %cluster.name, count = targets.len(), "Starting instances");
        self.power_batch(client.as_ref(), cluster, PowerVerb::Start, &targets, cancel)
            .await
    }

    #[instrument(skip_all, fields(cluster = %cluster.name, cloud = "openstack"))]
    async fn machines_running(
        &self,
        cluster: &ClusterHandle,
        cancel: &CancellationToken,
    ) -> Result<PowerCheck, ActuatorError> {
        let client = self.clients.client_for(cluster).await?;
        let records = self
            .list_cluster_servers(client.as_ref(), cluster, cancel, OP_RUNNING)
            .await?;

        let pending = member_names(&records, &ServerStateSet::NotYetRunning);
        if !pending.is_empty() {
            debug!(
                cluster = %cluster.name,
                pending = pending.len(),
                "Instances not yet running"
            );
        }
        Ok(PowerCheck::from_pending(pending))
    }

    #[instrument(skip_all, fields(cluster = %cluster.name, cloud = "openstack"))]
    async fn machines_stopped(
        &self,
        cluster: &ClusterHandle,
        cancel: &CancellationToken,
    ) -> Result<PowerCheck, ActuatorError> {
        let client = self.clients.client_for(cluster).await?;
        let records = self
            .list_cluster_servers(client.as_ref(), cluster, cancel, OP_STOPPED)
            .await?;

        let pending = member_names(&records, &ServerStateSet::NotYetStopped);
        if !pending.is_empty() {
            debug!(
                cluster = %cluster.name,
                pending = pending.len(),
                "Instances not yet stopped"
            );
        }
        Ok(PowerCheck::from_pending(pending))
    }
}

//! CLI commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio_util::sync::CancellationToken;

use stratus_hibernate::actuator::ActuatorRegistry;
use stratus_hibernate::cluster::{ClusterHandle, SecretRef};
use stratus_hibernate::machine::PowerCheck;
use stratus_hibernate::openstack::{OpenStackActuator, CLOUDS_SECRET_KEY};
use stratus_hibernate::secrets::{InMemorySecretStore, SecretDocument};

/// Key the trust bundle file is stored under locally.
const CA_BUNDLE_KEY: &str = "ca-bundle.pem";

/// stratus power control - hibernate and wake clusters.
#[derive(Debug, Parser)]
#[command(name = "powerctl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the cluster descriptor (YAML).
    #[arg(long, global = true, env = "POWERCTL_CLUSTER")]
    cluster: Option<PathBuf>,

    /// Path to the clouds.yaml holding the cluster's credentials.
    #[arg(long, global = true, env = "POWERCTL_CLOUDS")]
    clouds: Option<PathBuf>,

    /// Path to a PEM bundle of additional trusted CA certificates.
    #[arg(long, global = true, env = "POWERCTL_CA_BUNDLE")]
    ca_bundle: Option<PathBuf>,

    /// Abort the operation after this many seconds.
    #[arg(long, global = true, default_value_t = 300)]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Stop every running instance of the cluster.
    Stop,

    /// Start every stopped instance of the cluster.
    Start,

    /// Show whether the cluster's instances are running or stopped.
    Status,
}

impl Cli {
    /// Run the CLI command.
    pub async fn run(self) -> Result<()> {
        let cluster_path = self
            .cluster
            .as_deref()
            .context("--cluster is required (or set POWERCTL_CLUSTER)")?;
        let clouds_path = self
            .clouds
            .as_deref()
            .context("--clouds is required (or set POWERCTL_CLOUDS)")?;

        let mut cluster = load_cluster(cluster_path)?;
        let store = assemble_store(&mut cluster, clouds_path, self.ca_bundle.as_deref()).await?;

        let registry =
            ActuatorRegistry::new(vec![Arc::new(OpenStackActuator::new(Arc::new(store)))]);
        let actuator = registry.select(&cluster)?;

        let cancel = CancellationToken::new();
        let guard = cancel.clone();
        let timeout = Duration::from_secs(self.timeout);
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    eprintln!("\n{}", "Interrupted; abandoning remaining calls.".yellow());
                }
                _ = tokio::time::sleep(timeout) => {
                    eprintln!("{}", format!("Timed out after {}s.", timeout.as_secs()).yellow());
                }
            }
            guard.cancel();
        });

        match self.command {
            Command::Stop => {
                actuator.stop_machines(&cluster, &cancel).await?;
                println!(
                    "{} stop requested for running instances of {}",
                    "ok:".green().bold(),
                    cluster.name.bold()
                );
                println!("Run `powerctl status` to watch convergence.");
            }
            Command::Start => {
                actuator.start_machines(&cluster, &cancel).await?;
                println!(
                    "{} start requested for stopped instances of {}",
                    "ok:".green().bold(),
                    cluster.name.bold()
                );
                println!("Run `powerctl status` to watch convergence.");
            }
            Command::Status => {
                let running = actuator.machines_running(&cluster, &cancel).await?;
                let stopped = actuator.machines_stopped(&cluster, &cancel).await?;
                print_status(&cluster.name, &running, &stopped);
            }
        }

        Ok(())
    }
}

/// Read and parse the cluster descriptor.
fn load_cluster(path: &Path) -> Result<ClusterHandle> {
    let raw = std::fs::read(path)
        .with_context(|| format!("failed to read cluster descriptor {}", path.display()))?;
    let cluster: ClusterHandle = serde_yaml::from_slice(&raw)
        .with_context(|| format!("malformed cluster descriptor {}", path.display()))?;
    Ok(cluster)
}

/// Build an in-memory secret store backing the descriptor's secret
/// references with local files.
///
/// The clouds file lands under the cluster's credentials reference. A
/// `--ca-bundle` file backs the trust bundle reference, synthesizing
/// one if the descriptor has none; without the file the reference is
/// dropped, since a local run has nothing behind it.
async fn assemble_store(
    cluster: &mut ClusterHandle,
    clouds_path: &Path,
    ca_bundle: Option<&Path>,
) -> Result<InMemorySecretStore> {
    let store = InMemorySecretStore::new();

    let clouds = std::fs::read(clouds_path)
        .with_context(|| format!("failed to read clouds file {}", clouds_path.display()))?;
    store
        .put(
            cluster.credentials_secret.name.clone(),
            SecretDocument::from_entries([(CLOUDS_SECRET_KEY, clouds)]),
        )
        .await;

    match ca_bundle {
        Some(path) => {
            let pem = std::fs::read(path)
                .with_context(|| format!("failed to read CA bundle {}", path.display()))?;
            let secret_ref = cluster
                .trust_bundle_secret
                .clone()
                .unwrap_or_else(|| SecretRef::new("trust-bundle"));
            store
                .put(
                    secret_ref.name.clone(),
                    SecretDocument::from_entries([(CA_BUNDLE_KEY, pem)]),
                )
                .await;
            cluster.trust_bundle_secret = Some(secret_ref);
        }
        None => {
            cluster.trust_bundle_secret = None;
        }
    }

    Ok(store)
}

fn print_status(cluster: &str, running: &PowerCheck, stopped: &PowerCheck) {
    // Both checks converge only when the listing came back empty.
    if running.converged && stopped.converged {
        println!("{} {} has no instances", "ok:".green().bold(), cluster.bold());
        return;
    }
    if running.converged {
        println!(
            "{} {} is {}",
            "ok:".green().bold(),
            cluster.bold(),
            "running".green()
        );
        return;
    }
    if stopped.converged {
        println!(
            "{} {} is {}",
            "ok:".green().bold(),
            cluster.bold(),
            "stopped".green()
        );
        return;
    }

    println!(
        "{} {} is {}",
        "..".yellow().bold(),
        cluster.bold(),
        "in transition".yellow()
    );
    print_pending("not yet running", &running.pending);
    print_pending("not yet stopped", &stopped.pending);
}

fn print_pending(label: &str, names: &[String]) {
    if names.is_empty() {
        return;
    }
    println!("  {} ({}):", label, names.len());
    for name in names {
        println!("    {name}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use clap::CommandFactory;
    use stratus_hibernate::secrets::SecretStore;

    const DESCRIPTOR: &str = "\
name: prod-east
infra_id: prod-east-7x9kq
platform:
  type: openstack
  cloud: prod
credentials_secret:
  name: prod-east-creds
";

    fn temp_file(content: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file
    }

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_descriptor_yaml() {
        let file = temp_file(DESCRIPTOR.as_bytes());
        let cluster = load_cluster(file.path()).unwrap();

        assert_eq!(cluster.name, "prod-east");
        assert_eq!(cluster.infra_id, "prod-east-7x9kq");
        assert!(cluster.trust_bundle_secret.is_none());
    }

    #[test]
    fn missing_descriptor_names_the_path() {
        let err = load_cluster(Path::new("/nonexistent/cluster.yaml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/cluster.yaml"));
    }

    #[tokio::test]
    async fn assembles_local_secret_store() {
        let clouds = temp_file(b"clouds: {}");
        let bundle = temp_file(b"-----BEGIN CERTIFICATE-----\n");
        let descriptor = temp_file(DESCRIPTOR.as_bytes());
        let mut cluster = load_cluster(descriptor.path()).unwrap();

        let store = assemble_store(&mut cluster, clouds.path(), Some(bundle.path()))
            .await
            .unwrap();

        let doc = store.fetch(&cluster.credentials_secret).await.unwrap();
        assert_eq!(doc.get(CLOUDS_SECRET_KEY), Some(b"clouds: {}".as_slice()));

        let trust_ref = cluster.trust_bundle_secret.as_ref().unwrap();
        assert_eq!(trust_ref.name, "trust-bundle");
        let doc = store.fetch(trust_ref).await.unwrap();
        assert!(doc.contains_key(CA_BUNDLE_KEY));
    }

    #[tokio::test]
    async fn descriptor_trust_reference_is_dropped_without_a_bundle_file() {
        let clouds = temp_file(b"clouds: {}");
        let descriptor = temp_file(DESCRIPTOR.as_bytes());
        let mut cluster = load_cluster(descriptor.path()).unwrap();
        cluster.trust_bundle_secret = Some(SecretRef::new("prod-east-trust"));

        assemble_store(&mut cluster, clouds.path(), None)
            .await
            .unwrap();

        assert!(cluster.trust_bundle_secret.is_none());
    }
}

//! OpenStack hibernation backend.
//!
//! Drives Nova server power state through the compute API: servers are
//! listed by the cluster's infra-id name prefix, classified into typed
//! state sets, and stopped or started one action call per server.

pub mod actuator;
pub mod client;
pub mod states;

pub use actuator::{
    ComputeClientFactory, NovaClientFactory, OpenStackActuator, CLOUDS_SECRET_KEY,
};
pub use client::{ComputeClient, ComputeError, MockComputeClient, NovaComputeClient};
pub use states::{ServerStateSet, ServerStatus, TaskState};

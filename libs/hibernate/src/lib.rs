//! # stratus-hibernate
//!
//! Cluster hibernation: puts whole clusters to sleep and wakes them back
//! up by reconciling provider power state against the desired state.
//!
//! ## Design principles
//!
//! - Actuators are stateless between calls: every operation re-lists the
//!   cluster's live instances and filters them through typed state sets
//! - Partial failure is the normal case: batch operations attempt every
//!   eligible instance and aggregate whatever failed
//! - State queries fail closed: an instance in an ambiguous state counts
//!   as neither running nor stopped
//! - The actuator registry is plain data, built once by the composition
//!   root and read-only afterwards
//!
//! ## Modules
//!
//! - `actuator`: the [`HibernationActuator`] contract and the registry
//! - `aggregate`: per-instance failure aggregation for batch operations
//! - `cluster`: read-only cluster descriptors
//! - `error`: the actuator error taxonomy
//! - `machine`: instance records and state-set classification primitives
//! - `openstack`: the OpenStack backend (classifier, Nova client, actuator)
//! - `secrets`: the secret-store boundary credentials arrive through

pub mod actuator;
pub mod aggregate;
pub mod cluster;
pub mod error;
pub mod machine;
pub mod openstack;
pub mod secrets;

// Re-export the types most callers need
pub use actuator::{ActuatorRegistry, HibernationActuator};
pub use cluster::{ClusterHandle, Platform, SecretRef};
pub use error::ActuatorError;
pub use machine::{InstanceRecord, PowerCheck, PowerState, StateSet};

//! Instance records and power-state classification primitives.
//!
//! Records are point-in-time observations built fresh from every provider
//! list call; nothing here is cached. Classification happens through
//! [`StateSet`] predicates so backends can define their own state algebra
//! while the actuator logic stays generic.

use serde::{Deserialize, Serialize};

/// Point-in-time record of one provider instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    /// Provider identifier power actions are addressed to.
    pub id: String,

    /// Instance name as the provider reports it. Logs, reports, and
    /// aggregated errors carry names, not ids.
    pub name: String,

    /// Raw provider status string, unmodified.
    pub status: String,

    /// Raw provider task state, present while a transition is in flight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_state: Option<String>,

    /// Host placement identifier, when the provider reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_id: Option<String>,
}

/// Canonical power state of a single instance, shared across providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerState {
    /// Fully running with no transition in flight.
    Running,
    /// Fully stopped with no transition in flight.
    Stopped,
    /// Anything else: powering on or off, erroring, or unrecognized.
    Transitioning,
}

impl std::fmt::Display for PowerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PowerState::Running => write!(f, "running"),
            PowerState::Stopped => write!(f, "stopped"),
            PowerState::Transitioning => write!(f, "transitioning"),
        }
    }
}

/// A named predicate over instance records.
///
/// Sets are pure and total: membership never does I/O and never fails.
/// A record in a state a set does not recognize is simply not a member.
pub trait StateSet {
    /// Set name for logs.
    fn name(&self) -> &'static str;

    /// Whether the record belongs to this set.
    fn contains(&self, record: &InstanceRecord) -> bool;
}

/// Records belonging to `set`, in input order.
pub fn filter_records<'a, S: StateSet>(
    records: &'a [InstanceRecord],
    set: &S,
) -> Vec<&'a InstanceRecord> {
    records.iter().filter(|r| set.contains(r)).collect()
}

/// Names of the records belonging to `set`, in input order.
pub fn member_names<S: StateSet>(records: &[InstanceRecord], set: &S) -> Vec<String> {
    records
        .iter()
        .filter(|r| set.contains(r))
        .map(|r| r.name.clone())
        .collect()
}

/// Result of a power convergence query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerCheck {
    /// True when every instance has reached the target state.
    pub converged: bool,

    /// Names of instances still outside the target state.
    pub pending: Vec<String>,
}

impl PowerCheck {
    /// Build a check from the instances still pending. Convergence is
    /// exactly the absence of pending instances.
    pub fn from_pending(pending: Vec<String>) -> Self {
        Self {
            converged: pending.is_empty(),
            pending,
        }
    }
}

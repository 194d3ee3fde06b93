//! Server power-state classification.
//!
//! Nova reports two fields that matter here: the server status (ACTIVE,
//! SHUTOFF, ...) and the task state (powering-on, powering-off, or none).
//! A server only counts as running or stopped when its status says so
//! AND no task is in flight; everything else is in between. The state
//! sets below encode which servers each power operation touches:
//!
//! - stop targets [`ServerStateSet::StartingOrStarted`]: running servers
//!   plus ones already powering on
//! - start targets [`ServerStateSet::StoppingOrStopped`]: stopped servers
//!   plus ones already powering off
//! - the convergence checks use the complements
//!   [`ServerStateSet::NotYetRunning`] / [`ServerStateSet::NotYetStopped`],
//!   so a server in an unrecognized state blocks convergence but is never
//!   sent a redundant power action
//!
//! Raw strings are compared case-insensitively with `-` and `_` treated
//! as the same character: the API reports lowercase hyphenated task
//! states while operator tooling traditionally writes upper snake case.

use crate::machine::{InstanceRecord, PowerState, StateSet};

/// Nova server status, normalized from the raw wire string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    Active,
    Shutoff,
    Error,
    Build,
    /// Any status this subsystem does not classify.
    Unknown,
}

impl ServerStatus {
    /// Parse a raw status string.
    pub fn parse(raw: &str) -> Self {
        match normalized(raw).as_str() {
            "active" => ServerStatus::Active,
            "shutoff" => ServerStatus::Shutoff,
            "error" => ServerStatus::Error,
            "build" => ServerStatus::Build,
            _ => ServerStatus::Unknown,
        }
    }
}

/// Nova task state, normalized from the raw wire string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// No transition in flight. An absent or empty task field.
    Idle,
    PoweringOn,
    PoweringOff,
    /// Any other in-flight task (rebooting, resizing, ...).
    Unknown,
}

impl TaskState {
    /// Parse the raw task field; absent or empty means idle.
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return TaskState::Idle;
        };
        match normalized(raw).as_str() {
            "" => TaskState::Idle,
            "powering_on" => TaskState::PoweringOn,
            "powering_off" => TaskState::PoweringOff,
            _ => TaskState::Unknown,
        }
    }
}

fn normalized(raw: &str) -> String {
    raw.trim().to_ascii_lowercase().replace('-', "_")
}

fn classify(record: &InstanceRecord) -> (ServerStatus, TaskState) {
    (
        ServerStatus::parse(&record.status),
        TaskState::parse(record.task_state.as_deref()),
    )
}

/// Canonical power state of a single record.
pub fn power_state(record: &InstanceRecord) -> PowerState {
    match classify(record) {
        (ServerStatus::Active, TaskState::Idle) => PowerState::Running,
        (ServerStatus::Shutoff, TaskState::Idle) => PowerState::Stopped,
        _ => PowerState::Transitioning,
    }
}

/// Whether the record falls in any set the power operations act on.
///
/// Records outside every set (ERROR status, unrecognized tasks) are
/// ambiguous: they block convergence but never receive power actions.
/// Callers log them so operators can see what is holding a cluster up.
pub fn is_recognized(record: &InstanceRecord) -> bool {
    ServerStateSet::StartingOrStarted.contains(record)
        || ServerStateSet::StoppingOrStopped.contains(record)
}

/// The server state sets power operations filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStateSet {
    /// Fully running: active with no task in flight.
    Started,
    /// Fully stopped: shut off with no task in flight.
    Stopped,
    /// [`ServerStateSet::Started`] plus servers already powering on.
    /// The stop operation's target set.
    StartingOrStarted,
    /// [`ServerStateSet::Stopped`] plus servers already powering off.
    /// The start operation's target set.
    StoppingOrStopped,
    /// Complement of [`ServerStateSet::Started`].
    NotYetRunning,
    /// Complement of [`ServerStateSet::Stopped`].
    NotYetStopped,
}

impl StateSet for ServerStateSet {
    fn name(&self) -> &'static str {
        match self {
            ServerStateSet::Started => "started",
            ServerStateSet::Stopped => "stopped",
            ServerStateSet::StartingOrStarted => "starting-or-started",
            ServerStateSet::StoppingOrStopped => "stopping-or-stopped",
            ServerStateSet::NotYetRunning => "not-yet-running",
            ServerStateSet::NotYetStopped => "not-yet-stopped",
        }
    }

    fn contains(&self, record: &InstanceRecord) -> bool {
        let (status, task) = classify(record);
        match self {
            ServerStateSet::Started => {
                matches!((status, task), (ServerStatus::Active, TaskState::Idle))
            }
            ServerStateSet::Stopped => {
                matches!((status, task), (ServerStatus::Shutoff, TaskState::Idle))
            }
            ServerStateSet::StartingOrStarted => {
                ServerStateSet::Started.contains(record) || task == TaskState::PoweringOn
            }
            ServerStateSet::StoppingOrStopped => {
                ServerStateSet::Stopped.contains(record) || task == TaskState::PoweringOff
            }
            ServerStateSet::NotYetRunning => !ServerStateSet::Started.contains(record),
            ServerStateSet::NotYetStopped => !ServerStateSet::Stopped.contains(record),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn record(status: &str, task: Option<&str>) -> InstanceRecord {
        InstanceRecord {
            id: "srv-1".to_string(),
            name: "web-1".to_string(),
            status: status.to_string(),
            task_state: task.map(str::to_string),
            host_id: None,
        }
    }

    #[rstest]
    #[case("ACTIVE", None, true)]
    #[case("active", None, true)]
    #[case("Active", Some(""), true)]
    #[case("ACTIVE", Some("powering-off"), false)]
    #[case("ACTIVE", Some("resizing"), false)]
    #[case("SHUTOFF", None, false)]
    #[case("ERROR", None, false)]
    fn test_started_membership(
        #[case] status: &str,
        #[case] task: Option<&str>,
        #[case] expected: bool,
    ) {
        assert_eq!(
            ServerStateSet::Started.contains(&record(status, task)),
            expected
        );
    }

    #[rstest]
    #[case("SHUTOFF", None, true)]
    #[case("shutoff", Some(""), true)]
    #[case("SHUTOFF", Some("powering-on"), false)]
    #[case("ACTIVE", None, false)]
    #[case("ERROR", None, false)]
    fn test_stopped_membership(
        #[case] status: &str,
        #[case] task: Option<&str>,
        #[case] expected: bool,
    ) {
        assert_eq!(
            ServerStateSet::Stopped.contains(&record(status, task)),
            expected
        );
    }

    #[rstest]
    #[case("ACTIVE", None, true)]
    #[case("SHUTOFF", Some("powering-on"), true)]
    #[case("", Some("POWERING_ON"), true)]
    #[case("SHUTOFF", None, false)]
    #[case("ACTIVE", Some("powering-off"), false)]
    #[case("ERROR", None, false)]
    fn test_stop_targets_running_and_powering_on(
        #[case] status: &str,
        #[case] task: Option<&str>,
        #[case] expected: bool,
    ) {
        assert_eq!(
            ServerStateSet::StartingOrStarted.contains(&record(status, task)),
            expected
        );
    }

    #[rstest]
    #[case("SHUTOFF", None, true)]
    #[case("ACTIVE", Some("powering-off"), true)]
    #[case("", Some("POWERING_OFF"), true)]
    #[case("ACTIVE", None, false)]
    #[case("SHUTOFF", Some("powering-on"), false)]
    #[case("ERROR", None, false)]
    fn test_start_targets_stopped_and_powering_off(
        #[case] status: &str,
        #[case] task: Option<&str>,
        #[case] expected: bool,
    ) {
        assert_eq!(
            ServerStateSet::StoppingOrStopped.contains(&record(status, task)),
            expected
        );
    }

    #[test]
    fn test_hyphen_underscore_equivalence() {
        assert!(ServerStateSet::StartingOrStarted.contains(&record("SHUTOFF", Some("POWERING_ON"))));
        assert!(ServerStateSet::StartingOrStarted.contains(&record("SHUTOFF", Some("powering-on"))));
        assert!(ServerStateSet::StoppingOrStopped.contains(&record("ACTIVE", Some("POWERING-OFF"))));
    }

    #[test]
    fn test_power_state_mapping() {
        assert_eq!(power_state(&record("ACTIVE", None)), PowerState::Running);
        assert_eq!(power_state(&record("SHUTOFF", None)), PowerState::Stopped);
        assert_eq!(
            power_state(&record("ACTIVE", Some("powering-off"))),
            PowerState::Transitioning
        );
        assert_eq!(
            power_state(&record("ERROR", None)),
            PowerState::Transitioning
        );
    }

    #[test]
    fn test_error_states_are_unrecognized() {
        assert!(!is_recognized(&record("ERROR", None)));
        assert!(!is_recognized(&record("ACTIVE", Some("resizing"))));
        assert!(is_recognized(&record("ACTIVE", None)));
        assert!(is_recognized(&record("SHUTOFF", Some("powering-on"))));
    }

    #[test]
    fn test_unrecognized_records_fail_closed() {
        let ambiguous = record("ERROR", Some("rebuilding"));
        assert!(ServerStateSet::NotYetRunning.contains(&ambiguous));
        assert!(ServerStateSet::NotYetStopped.contains(&ambiguous));
        assert!(!ServerStateSet::StartingOrStarted.contains(&ambiguous));
        assert!(!ServerStateSet::StoppingOrStopped.contains(&ambiguous));
    }

    fn status_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("ACTIVE".to_string()),
            Just("active".to_string()),
            Just("SHUTOFF".to_string()),
            Just("Shutoff".to_string()),
            Just("ERROR".to_string()),
            Just("BUILD".to_string()),
            Just(String::new()),
            "[A-Z_]{1,12}",
        ]
    }

    fn task_strategy() -> impl Strategy<Value = Option<String>> {
        prop_oneof![
            Just(None),
            Just(Some(String::new())),
            Just(Some("POWERING_ON".to_string())),
            Just(Some("powering-on".to_string())),
            Just(Some("POWERING_OFF".to_string())),
            Just(Some("powering-off".to_string())),
            "[a-z_-]{1,12}".prop_map(Some),
        ]
    }

    proptest! {
        // A server can never be targeted by both stop and start.
        #[test]
        fn prop_target_sets_are_disjoint(status in status_strategy(), task in task_strategy()) {
            let r = record(&status, task.as_deref());
            prop_assert!(
                !(ServerStateSet::StartingOrStarted.contains(&r)
                    && ServerStateSet::StoppingOrStopped.contains(&r))
            );
        }

        // A server is never simultaneously running and stopped.
        #[test]
        fn prop_started_stopped_disjoint(status in status_strategy(), task in task_strategy()) {
            let r = record(&status, task.as_deref());
            prop_assert!(
                !(ServerStateSet::Started.contains(&r) && ServerStateSet::Stopped.contains(&r))
            );
        }

        // The complements partition the record space exactly.
        #[test]
        fn prop_complements_partition(status in status_strategy(), task in task_strategy()) {
            let r = record(&status, task.as_deref());
            prop_assert_ne!(
                ServerStateSet::Started.contains(&r),
                ServerStateSet::NotYetRunning.contains(&r)
            );
            prop_assert_ne!(
                ServerStateSet::Stopped.contains(&r),
                ServerStateSet::NotYetStopped.contains(&r)
            );
        }
    }
}

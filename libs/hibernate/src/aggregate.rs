//! Per-instance failure aggregation for batch power operations.
//!
//! Batch operations never stop at the first failure: every eligible
//! instance is attempted and whatever failed comes back as one
//! [`AggregateError`] that names each instance with its cause, in the
//! order the instances were attempted.

use std::error::Error as StdError;
use std::fmt;

/// Direction of a batch power operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerVerb {
    Stop,
    Start,
}

impl PowerVerb {
    /// Verb as it appears in messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            PowerVerb::Stop => "stop",
            PowerVerb::Start => "start",
        }
    }
}

impl fmt::Display for PowerVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One instance that failed its power call.
#[derive(Debug)]
pub struct InstanceFailure {
    /// Instance name as the provider reports it.
    pub instance: String,

    /// Underlying provider error.
    pub cause: Box<dyn StdError + Send + Sync>,
}

impl InstanceFailure {
    /// Record a failure for the named instance.
    pub fn new(
        instance: impl Into<String>,
        cause: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        Self {
            instance: instance.into(),
            cause: cause.into(),
        }
    }
}

/// Aggregate of the per-instance failures from one batch operation.
///
/// The failure list keeps attempt order, so reading the message top to
/// bottom replays the batch.
#[derive(Debug)]
pub struct AggregateError {
    verb: PowerVerb,
    failures: Vec<InstanceFailure>,
}

impl AggregateError {
    /// Build an aggregate from collected failures.
    ///
    /// Returns `None` when the list is empty: an all-success batch is not
    /// an error.
    pub fn from_failures(verb: PowerVerb, failures: Vec<InstanceFailure>) -> Option<Self> {
        if failures.is_empty() {
            None
        } else {
            Some(Self { verb, failures })
        }
    }

    /// The operation direction the failures came from.
    pub fn verb(&self) -> PowerVerb {
        self.verb
    }

    /// Names of the failed instances, in attempt order.
    pub fn failed_instances(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.instance.as_str()).collect()
    }

    /// The failures themselves, in attempt order.
    pub fn failures(&self) -> &[InstanceFailure] {
        &self.failures
    }

    /// Number of instances that failed.
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to {} {} instance(s): ",
            self.verb,
            self.failures.len()
        )?;
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", failure.instance, failure.cause)?;
        }
        Ok(())
    }
}

impl StdError for AggregateError {}

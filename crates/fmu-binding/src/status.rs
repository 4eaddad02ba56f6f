//! Translated status codes and generation-neutral call results.

use std::fmt;

use crate::abi::{self, RawStatus, RawStatusKind};

/// Status returned by a bound entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Ok,
    Warning,
    Discard,
    Error,
    Fatal,
    /// Asynchronous co-simulation step still running.
    Pending,
}

impl Status {
    /// Translate a raw code. Codes outside the known range are errors.
    pub fn from_raw(raw: RawStatus) -> Self {
        match raw {
            abi::STATUS_OK => Self::Ok,
            abi::STATUS_WARNING => Self::Warning,
            abi::STATUS_DISCARD => Self::Discard,
            abi::STATUS_ERROR => Self::Error,
            abi::STATUS_FATAL => Self::Fatal,
            abi::STATUS_PENDING => Self::Pending,
            other => {
                tracing::warn!(raw = other, "binary returned an unknown status code");
                Self::Error
            }
        }
    }

    pub fn to_raw(self) -> RawStatus {
        match self {
            Self::Ok => abi::STATUS_OK,
            Self::Warning => abi::STATUS_WARNING,
            Self::Discard => abi::STATUS_DISCARD,
            Self::Error => abi::STATUS_ERROR,
            Self::Fatal => abi::STATUS_FATAL,
            Self::Pending => abi::STATUS_PENDING,
        }
    }

    /// `Ok`, `Warning` and `Pending` let the caller carry on.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Ok | Self::Warning | Self::Pending)
    }

    /// Rank used when several calls report one combined status. `Pending`
    /// sits just above `Ok`: the call succeeded but has not finished.
    pub fn severity(self) -> u8 {
        match self {
            Self::Ok => 0,
            Self::Pending => 1,
            Self::Warning => 2,
            Self::Discard => 3,
            Self::Error => 4,
            Self::Fatal => 5,
        }
    }

    /// The more severe of two statuses.
    pub fn worst(self, other: Status) -> Status {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Warning => "warning",
            Self::Discard => "discard",
            Self::Error => "error",
            Self::Fatal => "fatal",
            Self::Pending => "pending",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Selector for the co-simulation status queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusKind {
    DoStepStatus,
    PendingStatus,
    LastSuccessfulTime,
    /// Generation two only.
    Terminated,
}

impl StatusKind {
    pub fn to_raw(self) -> RawStatusKind {
        match self {
            Self::DoStepStatus => 0,
            Self::PendingStatus => 1,
            Self::LastSuccessfulTime => 2,
            Self::Terminated => 3,
        }
    }
}

/// Outcome of an event update, normalized across generations.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EventInfo {
    /// Another event iteration is required.
    pub new_discrete_states_needed: bool,
    pub terminate_simulation: bool,
    pub nominals_of_continuous_states_changed: bool,
    pub values_of_continuous_states_changed: bool,
    pub next_event_time: Option<f64>,
}

impl From<abi::v1::EventInfo> for EventInfo {
    fn from(raw: abi::v1::EventInfo) -> Self {
        Self {
            new_discrete_states_needed: raw.iteration_converged == abi::v1::FALSE,
            terminate_simulation: raw.terminate_simulation != abi::v1::FALSE,
            nominals_of_continuous_states_changed: raw.state_value_references_changed
                != abi::v1::FALSE,
            values_of_continuous_states_changed: raw.state_values_changed != abi::v1::FALSE,
            next_event_time: (raw.upcoming_time_event != abi::v1::FALSE)
                .then_some(raw.next_event_time),
        }
    }
}

impl From<abi::v2::EventInfo> for EventInfo {
    fn from(raw: abi::v2::EventInfo) -> Self {
        Self {
            new_discrete_states_needed: raw.new_discrete_states_needed != abi::v2::FALSE,
            terminate_simulation: raw.terminate_simulation != abi::v2::FALSE,
            nominals_of_continuous_states_changed: raw.nominals_of_continuous_states_changed
                != abi::v2::FALSE,
            values_of_continuous_states_changed: raw.values_of_continuous_states_changed
                != abi::v2::FALSE,
            next_event_time: (raw.next_event_time_defined != abi::v2::FALSE)
                .then_some(raw.next_event_time),
        }
    }
}

/// Result of `completed_integrator_step`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntegratorStep {
    /// The integrator must stop and handle an event.
    pub enter_event_mode: bool,
    pub terminate_simulation: bool,
}

/// Experiment settings used by the generation-neutral `initialize`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExperimentSetup {
    pub start_time: f64,
    pub stop_time: Option<f64>,
    pub tolerance: Option<f64>,
}

impl Default for ExperimentSetup {
    fn default() -> Self {
        Self {
            start_time: 0.0,
            stop_time: None,
            tolerance: None,
        }
    }
}

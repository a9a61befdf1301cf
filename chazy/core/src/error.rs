//! Error types
//!
//! Animation failures never surface to callers: the engine logs them, falls
//! back to a consistent visual state and carries on. The errors here describe
//! *why* a line was refused so the machine can log it and report a
//! [`LineOutcome::Rejected`](crate::state_machine::LineOutcome::Rejected).

use thiserror::Error;

use crate::state_machine::MachineState;

/// Why a line request was refused
#[derive(Clone, Debug, Error, PartialEq)]
pub enum LineError {
    /// Line is empty after trimming (and after removing pause markers)
    #[error("Line is empty")]
    EmptyLine,

    /// Intensity outside `0.0..=1.0` or not a number
    #[error("Intensity {0} is out of range")]
    InvalidIntensity(f64),

    /// Display duration of zero
    #[error("Display duration must be positive")]
    ZeroDisplay,

    /// The machine is not in a state that accepts the request
    #[error("Cannot {action} while {state}")]
    Busy {
        /// Requested action
        action: &'static str,
        /// State at the time of the request
        state: MachineState,
    },
}

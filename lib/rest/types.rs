//! Type definitions for the control service.
//!
//! Request and response bodies of the `/vm/state` and `/vm/inspect` endpoints. The field names
//! are an external contract.

use serde::{Deserialize, Serialize};

use crate::{
    config::VirtioDevice,
    engine::{StateCapabilities, VmState},
    VmkitError, VmkitResult,
};

//-------------------------------------------------------------------------------------------------
// Types
//-------------------------------------------------------------------------------------------------

/// Response body for `GET /vm/state`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateResponse {
    /// Current lifecycle state.
    pub state: VmState,

    /// Whether a start request would be accepted.
    #[serde(rename = "canStart")]
    pub can_start: bool,

    /// Whether a pause request would be accepted.
    #[serde(rename = "canPause")]
    pub can_pause: bool,

    /// Whether a resume request would be accepted.
    #[serde(rename = "canResume")]
    pub can_resume: bool,

    /// Whether a graceful stop request would be accepted.
    #[serde(rename = "canStop")]
    pub can_stop: bool,

    /// Whether an immediate stop request would be accepted.
    #[serde(rename = "canHardStop")]
    pub can_hard_stop: bool,
}

/// Request body for `POST /vm/state`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChangeRequest {
    /// Requested transition, one of `Pause`, `Resume`, `Stop`, `HardStop`.
    pub state: String,
}

/// The transitions a client may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChange {
    /// Suspend the guest in memory.
    Pause,

    /// Resume a paused guest.
    Resume,

    /// Stop gracefully through the guest.
    Stop,

    /// Stop immediately, without guest cooperation.
    HardStop,
}

/// Response body for `GET /vm/inspect`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectResponse {
    /// Number of virtual CPUs.
    pub vcpus: u32,

    /// Guest memory size in bytes.
    #[serde(rename = "memoryBytes")]
    pub memory_bytes: u64,

    /// Attached devices.
    #[serde(default)]
    pub devices: Vec<VirtioDevice>,
}

/// Error body returned when an operation fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong.
    pub error: String,
}

//-------------------------------------------------------------------------------------------------
// Methods
//-------------------------------------------------------------------------------------------------

impl StateResponse {
    /// Combines the engine-reported state and capabilities into a response.
    pub fn new(state: VmState, capabilities: StateCapabilities) -> Self {
        Self {
            state,
            can_start: capabilities.can_start,
            can_pause: capabilities.can_pause,
            can_resume: capabilities.can_resume,
            can_stop: capabilities.can_stop,
            can_hard_stop: capabilities.can_hard_stop,
        }
    }
}

impl StateChangeRequest {
    /// Parses the requested transition against the closed vocabulary.
    pub fn state_change(&self) -> VmkitResult<StateChange> {
        match self.state.as_str() {
            "Pause" => Ok(StateChange::Pause),
            "Resume" => Ok(StateChange::Resume),
            "Stop" => Ok(StateChange::Stop),
            "HardStop" => Ok(StateChange::HardStop),
            other => Err(VmkitError::InvalidStateRequest(other.to_string())),
        }
    }
}

//-------------------------------------------------------------------------------------------------
// Tests
//-------------------------------------------------------------------------------------------------

//! The virtualization engine adapter seam.
//!
//! The engine that actually runs the guest lives outside this crate, behind [`VmHandle`]. The
//! proxy, the control service and timesync only ever talk to that trait, which keeps them
//! testable against an in-memory handle and keeps engine internals out of the core.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{mpsc, watch},
};

use crate::{VmkitError, VmkitResult};

#[cfg(test)]
pub(crate) mod mock;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// How long a single state-change wait polls before reporting a retryable timeout.
pub const STATE_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The lifecycle state of a virtual machine, as reported by the engine.
///
/// `Stopped` and `Error` are terminal. Once the engine reports `Error` the machine is
/// considered lost; no transition out of it is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VmState {
    /// The machine is not running.
    Stopped,

    /// A start request is in flight.
    Starting,

    /// The guest is executing.
    Running,

    /// A pause request is in flight.
    Pausing,

    /// The guest is suspended in memory.
    Paused,

    /// A resume request is in flight.
    Resuming,

    /// A stop request is in flight.
    Stopping,

    /// The engine reported a fault. Terminal.
    Error,
}

/// Which state transitions the engine will currently accept.
///
/// Always engine-reported, never inferred from [`VmState`]; the two can disagree transiently
/// and the engine's answer wins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateCapabilities {
    /// Whether a start request would be accepted.
    pub can_start: bool,

    /// Whether a pause request would be accepted.
    pub can_pause: bool,

    /// Whether a resume request would be accepted.
    pub can_resume: bool,

    /// Whether a graceful stop request would be accepted.
    pub can_stop: bool,

    /// Whether an immediate stop request would be accepted.
    pub can_hard_stop: bool,
}

/// A bidirectional byte stream attached to a guest socket channel.
pub type ChannelStream = Box<dyn ChannelIo>;

/// The I/O bounds a channel stream must satisfy.
pub trait ChannelIo: AsyncRead + AsyncWrite + Send + Unpin {}

/// A running virtual machine as seen through the engine.
#[async_trait]
pub trait VmHandle: Send + Sync {
    /// Returns the current lifecycle state.
    async fn state(&self) -> VmState;

    /// Returns which transitions the engine would currently accept.
    async fn capabilities(&self) -> StateCapabilities;

    /// Requests a transition to `Running`.
    async fn start(&self) -> VmkitResult<()>;

    /// Requests a transition to `Paused`.
    async fn pause(&self) -> VmkitResult<()>;

    /// Requests a transition from `Paused` back to `Running`.
    async fn resume(&self) -> VmkitResult<()>;

    /// Requests a graceful stop through the guest.
    async fn request_stop(&self) -> VmkitResult<()>;

    /// Stops the machine immediately, without guest cooperation.
    async fn force_stop(&self) -> VmkitResult<()>;

    /// Returns a receiver observing every state change the engine publishes.
    fn state_changes(&self) -> watch::Receiver<VmState>;

    /// Returns how many socket channel devices the machine has.
    fn channel_device_count(&self) -> usize;

    /// Connects to a guest channel port. The guest must be listening on it.
    async fn dial_channel(&self, port: u32) -> VmkitResult<ChannelStream>;

    /// Starts accepting guest-initiated connections on a channel port.
    ///
    /// Each accepted connection (or accept failure) is delivered on the returned receiver; an
    /// error terminates only that connection, not the acceptor.
    async fn listen_channel(
        &self,
        port: u32,
    ) -> VmkitResult<mpsc::Receiver<VmkitResult<ChannelStream>>>;
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Waits until the engine reports `target`, polling for at most `timeout`.
///
/// A timeout is reported as the retryable [`VmkitError::StateWaitTimeout`]; a closed engine
/// channel means the machine is gone and is fatal.
pub async fn wait_for_state(
    rx: &mut watch::Receiver<VmState>,
    target: VmState,
    timeout: Duration,
) -> VmkitResult<()> {
    let wait = async {
        loop {
            if *rx.borrow() == target {
                return Ok(());
            }
            rx.changed()
                .await
                .map_err(|_| VmkitError::Engine("state channel closed".to_string()))?;
        }
    };
    match tokio::time::timeout(timeout, wait).await {
        Result::Ok(result) => result,
        Err(_) => Err(VmkitError::StateWaitTimeout(target)),
    }
}

/// Blocks until the machine reaches `Stopped`, retrying across poll timeouts.
pub async fn wait_until_stopped(rx: &mut watch::Receiver<VmState>) -> VmkitResult<()> {
    loop {
        match wait_for_state(rx, VmState::Stopped, STATE_WAIT_TIMEOUT).await {
            Result::Ok(()) => return Ok(()),
            Err(VmkitError::StateWaitTimeout(_)) => continue,
            Err(err) => return Err(err),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl fmt::Display for VmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stopped => "Stopped",
            Self::Starting => "Starting",
            Self::Running => "Running",
            Self::Pausing => "Pausing",
            Self::Paused => "Paused",
            Self::Resuming => "Resuming",
            Self::Stopping => "Stopping",
            Self::Error => "Error",
        };
        write!(f, "{name}")
    }
}

impl VmState {
    /// Whether no further transitions can leave this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Error)
    }
}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> ChannelIo for T {}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

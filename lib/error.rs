use std::{
    error::Error,
    fmt::{self, Display},
    path::PathBuf,
};
use thiserror::Error;

use crate::engine::VmState;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of a vmkit-related operation.
pub type VmkitResult<T> = Result<T, VmkitError>;

/// An error that occurred while configuring, proxying for, or controlling a virtual machine.
#[derive(Debug, Error)]
pub enum VmkitError {
    /// An I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An error that can represent any error.
    #[error(transparent)]
    Custom(#[from] AnyError),

    /// An error that occurred while encoding or decoding a JSON document.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The leading token of a `--device` argument did not name a known device kind.
    #[error("unknown device type: {0}")]
    UnknownDeviceKind(String),

    /// An option key was not recognized by the device kind it was given to.
    #[error("unknown option for {kind} device: {key}")]
    UnknownOption {
        /// The device kind that rejected the option.
        kind: &'static str,

        /// The offending option key.
        key: String,
    },

    /// An option key was recognized but its value was not.
    #[error("invalid value for {key} option on {kind} device: '{value}' (expected {expected})")]
    InvalidOptionValue {
        /// The device kind that rejected the value.
        kind: &'static str,

        /// The option key.
        key: &'static str,

        /// The offending value.
        value: String,

        /// A short description of the accepted values.
        expected: &'static str,
    },

    /// A device was asked to render itself without one of its mandatory fields.
    #[error("missing mandatory '{field}' option for {kind} device")]
    MissingMandatoryField {
        /// The device kind.
        kind: &'static str,

        /// The missing field.
        field: &'static str,
    },

    /// A storage device was given a backend type outside the closed vocabulary.
    #[error("unknown storage backend type: {0} (expected image/dev)")]
    UnknownStorageBackend(String),

    /// A device option list was structurally invalid (e.g. mutually exclusive flags).
    #[error("invalid options for {kind} device: {reason}")]
    InvalidDeviceOptions {
        /// The device kind.
        kind: &'static str,

        /// Why the combination was rejected.
        reason: String,
    },

    /// A MAC address string could not be parsed.
    #[error("invalid MAC address: {0}")]
    InvalidMacAddress(String),

    /// The virtual machine configuration has no bootloader.
    #[error("missing bootloader configuration")]
    MissingBootloader,

    /// The timesync parameter was missing its mandatory vsock port.
    #[error("missing 'vsockPort' option for timesync parameter")]
    MissingTimesyncPort,

    /// A control-plane endpoint URI was rejected at startup.
    #[error("invalid restful uri: {0}")]
    InvalidRestfulUri(String),

    /// The engine reported a number of socket channel devices the proxy cannot work with.
    #[error("VM has too many/not enough socket channel devices ({0})")]
    TooManyChannelDevices(usize),

    /// A proxy route failed to bind its host-side listening socket.
    #[error("failed to listen on {}: {source}", path.display())]
    ListenError {
        /// The host socket path that could not be bound.
        path: PathBuf,

        /// The underlying bind failure.
        #[source]
        source: std::io::Error,
    },

    /// A guest channel dial failed for a proxy route.
    #[error("failed to dial channel port {port}: {source}")]
    ChannelDialError {
        /// The channel port that was dialed.
        port: u32,

        /// The underlying dial failure.
        #[source]
        source: std::io::Error,
    },

    /// A control-plane request named a state change outside the known vocabulary.
    #[error("invalid state change request: {0}")]
    InvalidStateRequest(String),

    /// The engine rejected a state transition that is illegal in the current state.
    #[error("state transition rejected: {0}")]
    StateTransitionRejected(String),

    /// A state-change wait hit its poll timeout without the target state arriving.
    #[error("timeout waiting for VM state {0}")]
    StateWaitTimeout(VmState),

    /// The external virtualization engine reported a fault. The VM is considered lost.
    #[error("engine error: {0}")]
    Engine(String),

    /// The guest agent answered a time-sync command with something unexpected.
    #[error("unexpected response from guest agent: {0}")]
    GuestAgentProtocol(String),
}

/// An error that can represent any error.
#[derive(Debug)]
pub struct AnyError {
    error: anyhow::Error,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl VmkitError {
    /// Creates a new `Err` result.
    pub fn custom(error: impl Into<anyhow::Error>) -> VmkitError {
        VmkitError::Custom(AnyError {
            error: error.into(),
        })
    }
}

impl AnyError {
    /// Downcasts the error to a `T`.
    pub fn downcast<T>(&self) -> Option<&T>
    where
        T: Display + fmt::Debug + Send + Sync + 'static,
    {
        self.error.downcast_ref::<T>()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Creates an `Ok` `VmkitResult`.
#[allow(non_snake_case)]
pub fn Ok<T>(value: T) -> VmkitResult<T> {
    Result::Ok(value)
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl PartialEq for AnyError {
    fn eq(&self, other: &Self) -> bool {
        self.error.to_string() == other.error.to_string()
    }
}

impl Display for AnyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl Error for AnyError {}

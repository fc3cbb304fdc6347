//! Shared state for the control service.

use std::sync::Arc;

use getset::Getters;

use crate::{config::VirtualMachine, engine::VmHandle};

use super::types::InspectResponse;

//-------------------------------------------------------------------------------------------------
// Types
//-------------------------------------------------------------------------------------------------

/// State shared across all control-service handlers.
///
/// Holds the engine handle and an immutable snapshot of the configuration taken at startup;
/// `/vm/inspect` answers from the snapshot, so the service never observes (or causes)
/// configuration mutation.
#[derive(Clone, Getters)]
#[getset(get = "pub with_prefix")]
pub struct ServiceState {
    /// The engine handle.
    handle: Arc<dyn VmHandle>,

    /// The configuration snapshot.
    snapshot: Arc<InspectResponse>,
}

//-------------------------------------------------------------------------------------------------
// Methods
//-------------------------------------------------------------------------------------------------

impl ServiceState {
    /// Creates the service state, snapshotting `vm` as it is now.
    pub fn new(handle: Arc<dyn VmHandle>, vm: &VirtualMachine) -> Self {
        Self {
            handle,
            snapshot: Arc::new(InspectResponse {
                vcpus: vm.vcpus,
                memory_bytes: vm.memory_bytes,
                devices: vm.devices.clone(),
            }),
        }
    }
}

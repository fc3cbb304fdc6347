//! An in-memory engine for unit tests.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use tokio::{
    io::DuplexStream,
    sync::{mpsc, watch},
};

use crate::{VmkitError, VmkitResult};

use super::{ChannelStream, StateCapabilities, VmHandle, VmState};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A scriptable [`VmHandle`] backed by in-memory duplex streams.
///
/// Channel dials hand one half of a duplex pair to the caller and queue the peer half for the
/// test to pick up with [`take_dialed_peer`](Self::take_dialed_peer). Guest-initiated
/// connections are injected with [`push_guest_connection`](Self::push_guest_connection).
pub(crate) struct MockVmHandle {
    state_tx: watch::Sender<VmState>,
    capabilities: Mutex<StateCapabilities>,
    channel_devices: usize,
    reject_transitions: AtomicBool,
    calls: Mutex<Vec<&'static str>>,
    dialed_peers: Mutex<Vec<(u32, DuplexStream)>>,
    listeners: Mutex<HashMap<u32, mpsc::Sender<VmkitResult<ChannelStream>>>>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl MockVmHandle {
    pub(crate) fn new(channel_devices: usize) -> Self {
        let (state_tx, _) = watch::channel(VmState::Stopped);
        Self {
            state_tx,
            capabilities: Mutex::new(StateCapabilities::default()),
            channel_devices,
            reject_transitions: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
            dialed_peers: Mutex::new(Vec::new()),
            listeners: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn set_state(&self, state: VmState) {
        self.state_tx.send_replace(state);
    }

    pub(crate) fn set_capabilities(&self, capabilities: StateCapabilities) {
        *self.capabilities.lock().unwrap() = capabilities;
    }

    /// Makes every subsequent transition request fail.
    pub(crate) fn reject_transitions(&self, reject: bool) {
        self.reject_transitions.store(reject, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    /// Returns the guest half of the most recent channel dial on `port`.
    pub(crate) fn take_dialed_peer(&self, port: u32) -> Option<DuplexStream> {
        let mut dialed = self.dialed_peers.lock().unwrap();
        let index = dialed.iter().position(|(p, _)| *p == port)?;
        Some(dialed.remove(index).1)
    }

    /// Injects a guest-initiated connection and returns its guest half.
    pub(crate) async fn push_guest_connection(&self, port: u32) -> DuplexStream {
        let tx = self
            .listeners
            .lock()
            .unwrap()
            .get(&port)
            .cloned()
            .expect("no listener registered on port");
        let (host, guest) = tokio::io::duplex(64 * 1024);
        tx.send(Ok(Box::new(host))).await.expect("listener gone");
        guest
    }

    /// Injects an accept failure on `port`.
    pub(crate) async fn push_guest_error(&self, port: u32, err: VmkitError) {
        let tx = self
            .listeners
            .lock()
            .unwrap()
            .get(&port)
            .cloned()
            .expect("no listener registered on port");
        tx.send(Err(err)).await.expect("listener gone");
    }

    fn transition(&self, call: &'static str, next: VmState) -> VmkitResult<()> {
        self.calls.lock().unwrap().push(call);
        if self.reject_transitions.load(Ordering::SeqCst) {
            return Err(VmkitError::StateTransitionRejected(format!(
                "engine rejected {call} in state {}",
                *self.state_tx.borrow()
            )));
        }
        self.state_tx.send_replace(next);
        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl VmHandle for MockVmHandle {
    async fn state(&self) -> VmState {
        *self.state_tx.borrow()
    }

    async fn capabilities(&self) -> StateCapabilities {
        *self.capabilities.lock().unwrap()
    }

    async fn start(&self) -> VmkitResult<()> {
        self.transition("start", VmState::Running)
    }

    async fn pause(&self) -> VmkitResult<()> {
        self.transition("pause", VmState::Paused)
    }

    async fn resume(&self) -> VmkitResult<()> {
        self.transition("resume", VmState::Running)
    }

    async fn request_stop(&self) -> VmkitResult<()> {
        self.transition("request_stop", VmState::Stopping)
    }

    async fn force_stop(&self) -> VmkitResult<()> {
        self.transition("force_stop", VmState::Stopped)
    }

    fn state_changes(&self) -> watch::Receiver<VmState> {
        self.state_tx.subscribe()
    }

    fn channel_device_count(&self) -> usize {
        self.channel_devices
    }

    async fn dial_channel(&self, port: u32) -> VmkitResult<ChannelStream> {
        let (host, guest) = tokio::io::duplex(64 * 1024);
        self.dialed_peers.lock().unwrap().push((port, guest));
        Ok(Box::new(host))
    }

    async fn listen_channel(
        &self,
        port: u32,
    ) -> VmkitResult<mpsc::Receiver<VmkitResult<ChannelStream>>> {
        let (tx, rx) = mpsc::channel(16);
        self.listeners.lock().unwrap().insert(port, tx);
        Ok(rx)
    }
}

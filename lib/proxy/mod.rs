//! Relays between host UNIX sockets and guest socket channels.
//!
//! Each configured socket channel device with a host socket path gets one proxy route. In
//! `Connect` direction the host side listens on the UNIX socket and dials the guest port per
//! accepted connection; in `Listen` direction guest-initiated connections are accepted from the
//! engine and bridged to the UNIX socket as a client. Bytes are spliced both ways until either
//! half closes.

use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
};

use tokio::{
    net::{UnixListener, UnixStream},
    sync::mpsc,
    task::JoinHandle,
};
use tracing::{debug, warn};

use crate::{
    config::VirtioVsock,
    engine::{ChannelStream, VmHandle},
    VmkitError, VmkitResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Which side initiates connections on a proxy route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyDirection {
    /// The guest initiates; accepted channel connections are bridged to the UNIX socket.
    Listen,

    /// The host initiates; accepted UNIX socket connections are bridged to the channel port.
    Connect,
}

/// A single bridged channel port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRoute {
    /// Guest channel port.
    pub port: u32,

    /// Host UNIX socket path.
    pub host_socket_path: PathBuf,

    /// Which side initiates.
    pub direction: ProxyDirection,
}

/// Tears down a running proxy route.
///
/// Closing is idempotent and never errors after the machine has stopped; dropping the closer
/// closes the route.
pub struct ProxyCloser {
    inner: Mutex<Option<ProxyCloserInner>>,
}

struct ProxyCloserInner {
    task: JoinHandle<()>,
    bound_socket: Option<PathBuf>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ProxyRoute {
    /// Derives the proxy route for a socket channel device.
    ///
    /// Devices without a host socket path are internal-use channels and are never proxied.
    pub fn from_vsock(vsock: &VirtioVsock) -> Option<Self> {
        if vsock.socket_url.is_empty() {
            return None;
        }
        Some(Self {
            port: vsock.port,
            host_socket_path: PathBuf::from(&vsock.socket_url),
            direction: if vsock.listen {
                ProxyDirection::Listen
            } else {
                ProxyDirection::Connect
            },
        })
    }
}

impl ProxyCloser {
    /// Stops the route, releases its listener and removes the bound socket file.
    pub fn close(&self) {
        let Some(inner) = self.inner.lock().ok().and_then(|mut guard| guard.take()) else {
            return;
        };
        inner.task.abort();
        if let Some(path) = inner.bound_socket {
            if let Err(err) = std::fs::remove_file(&path) {
                debug!("could not remove proxy socket {}: {err}", path.display());
            }
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Starts proxying one channel route.
///
/// Fails fast when the machine does not have exactly one socket channel device, when the host
/// socket cannot be bound, or when the channel acceptor cannot be registered. Individual relay
/// failures after that only terminate their own relay.
pub async fn expose_channel(
    handle: Arc<dyn VmHandle>,
    route: ProxyRoute,
) -> VmkitResult<ProxyCloser> {
    let channel_devices = handle.channel_device_count();
    if channel_devices != 1 {
        return Err(VmkitError::TooManyChannelDevices(channel_devices));
    }

    debug!(
        port = route.port,
        socket = %route.host_socket_path.display(),
        direction = ?route.direction,
        "exposing channel"
    );

    match route.direction {
        ProxyDirection::Connect => {
            let listener =
                UnixListener::bind(&route.host_socket_path).map_err(|source| {
                    VmkitError::ListenError {
                        path: route.host_socket_path.clone(),
                        source,
                    }
                })?;
            let bound_socket = route.host_socket_path.clone();
            let task = tokio::spawn(accept_host_connections(handle, listener, route.port));
            Ok(ProxyCloser {
                inner: Mutex::new(Some(ProxyCloserInner {
                    task,
                    bound_socket: Some(bound_socket),
                })),
            })
        }
        ProxyDirection::Listen => {
            let connections = handle.listen_channel(route.port).await?;
            let task = tokio::spawn(accept_guest_connections(
                connections,
                route.host_socket_path,
                route.port,
            ));
            Ok(ProxyCloser {
                inner: Mutex::new(Some(ProxyCloserInner {
                    task,
                    bound_socket: None,
                })),
            })
        }
    }
}

/// Dials a guest channel port once.
pub async fn connect_channel(handle: &dyn VmHandle, port: u32) -> VmkitResult<ChannelStream> {
    debug!(port, "dialing channel");
    handle.dial_channel(port).await
}

async fn accept_host_connections(handle: Arc<dyn VmHandle>, listener: UnixListener, port: u32) {
    loop {
        let stream = match listener.accept().await {
            Result::Ok((stream, _)) => stream,
            Err(err) => {
                warn!(port, "host socket accept failed: {err}");
                return;
            }
        };
        let handle = handle.clone();
        tokio::spawn(async move {
            match handle.dial_channel(port).await {
                Result::Ok(channel) => relay(stream, channel, port).await,
                Err(err) => warn!(port, "channel dial failed: {err}"),
            }
        });
    }
}

async fn accept_guest_connections(
    mut connections: mpsc::Receiver<VmkitResult<ChannelStream>>,
    socket_path: PathBuf,
    port: u32,
) {
    while let Some(accepted) = connections.recv().await {
        let channel = match accepted {
            Result::Ok(channel) => channel,
            Err(err) => {
                warn!(port, "channel accept failed: {err}");
                continue;
            }
        };
        let socket_path = socket_path.clone();
        tokio::spawn(async move {
            match UnixStream::connect(&socket_path).await {
                Result::Ok(stream) => relay(stream, channel, port).await,
                Err(err) => warn!(
                    port,
                    "could not connect to {}: {err}",
                    socket_path.display()
                ),
            }
        });
    }
}

async fn relay(mut host: UnixStream, mut channel: ChannelStream, port: u32) {
    match tokio::io::copy_bidirectional(&mut host, &mut channel).await {
        Result::Ok((to_guest, to_host)) => {
            debug!(port, to_guest, to_host, "relay finished");
        }
        Err(err) => debug!(port, "relay terminated: {err}"),
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Drop for ProxyCloser {
    fn drop(&mut self) {
        self.close();
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

//! Guest clock resynchronization.
//!
//! After the host sleeps, the guest clock lags behind until something fixes it. This module
//! pushes the host's wall clock into the guest over a socket channel, speaking the
//! qemu-guest-agent line protocol: one `guest-set-time` command per sync, answered by an empty
//! `return` object.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    sync::mpsc,
};
use tracing::{info, warn};

use crate::{
    engine::{ChannelStream, VmHandle},
    proxy::connect_channel,
    VmkitError, VmkitResult,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const GUEST_AGENT_OK: &[u8] = b"{\"return\": {}}\n";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Pushes the host clock into the guest on demand.
///
/// The channel connection is dialed lazily on the first sync and redialed after any failure,
/// so a restarted guest agent only costs one failed sync.
pub struct TimeSynchronizer {
    handle: Arc<dyn VmHandle>,
    port: u32,
    conn: Option<ChannelStream>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl TimeSynchronizer {
    /// Creates a synchronizer for the guest agent listening on `port`.
    pub fn new(handle: Arc<dyn VmHandle>, port: u32) -> Self {
        Self {
            handle,
            port,
            conn: None,
        }
    }

    /// Sets the guest clock to the host's current wall clock.
    pub async fn sync_now(&mut self) -> VmkitResult<()> {
        let mut conn = match self.conn.take() {
            Some(conn) => conn,
            None => connect_channel(self.handle.as_ref(), self.port).await?,
        };

        match set_guest_time(&mut conn, Utc::now()).await {
            Result::Ok(()) => {
                info!(port = self.port, "synchronized guest time");
                self.conn = Some(conn);
                Ok(())
            }
            // The connection stays dropped, so the next attempt redials.
            Err(err) => Err(err),
        }
    }

    /// Consumes wake events, syncing the guest clock once per event.
    ///
    /// The event source (host sleep/wake notifications, a timer, a signal) is up to the
    /// caller. Sync failures are logged and do not stop the loop.
    pub async fn run(mut self, mut events: mpsc::Receiver<()>) {
        while events.recv().await.is_some() {
            if let Err(err) = self.sync_now().await {
                warn!(port = self.port, "guest time sync failed: {err}");
            }
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Sets the guest clock to `time` over an established guest-agent stream.
pub async fn set_guest_time<S>(stream: &mut S, time: DateTime<Utc>) -> VmkitResult<()>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    let nanos = time.timestamp_nanos_opt().ok_or_else(|| {
        VmkitError::GuestAgentProtocol(format!("time {time} is out of range"))
    })?;

    let command = format!("{{\"execute\": \"guest-set-time\", \"arguments\":{{\"time\": {nanos}}}}}\n");
    stream.write_all(command.as_bytes()).await?;
    stream.flush().await?;

    let response = read_line(stream).await?;
    if response != GUEST_AGENT_OK {
        return Err(VmkitError::GuestAgentProtocol(
            String::from_utf8_lossy(&response).trim_end().to_string(),
        ));
    }
    Ok(())
}

async fn read_line<S: AsyncRead + Unpin>(stream: &mut S) -> VmkitResult<Vec<u8>> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let read = stream.read(&mut byte).await?;
        if read == 0 {
            break;
        }
        line.push(byte[0]);
        if byte[0] == b'\n' {
            break;
        }
    }
    Ok(line)
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

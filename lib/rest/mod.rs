//! The control-plane service.
//!
//! A small REST API wrapping the engine's lifecycle primitives: `GET /vm/state` reports the
//! current state and capabilities, `POST /vm/state` requests a transition, `GET /vm/inspect`
//! returns the configuration snapshot. The service runs in its own task and never mutates the
//! configuration.

use std::path::PathBuf;

use tokio::{
    net::{TcpListener, UnixListener},
    task::JoinHandle,
};
use tracing::{error, info};
use url::Url;

use crate::{VmkitError, VmkitResult};

use self::{routes::create_router, state::ServiceState};

mod handlers;
mod routes;
mod state;
mod types;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use state::*;
pub use types::*;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Where the control service listens.
///
/// Parsed from a `--restful-uri` style URI; `none://` disables the service and is the default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestEndpoint {
    /// The service is disabled.
    Disabled,

    /// Listen on a UNIX socket.
    Unix(PathBuf),

    /// Listen on a TCP host and port.
    Tcp(String, u16),
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl RestEndpoint {
    /// Parses and validates an endpoint URI.
    ///
    /// Accepted forms are `unix://<path>`, `tcp://<host>:<port>` and `none://`. Anything else
    /// is rejected here, at startup, rather than at bind time.
    pub fn parse(uri: &str) -> VmkitResult<Self> {
        let parsed =
            Url::parse(uri).map_err(|_| VmkitError::InvalidRestfulUri(uri.to_string()))?;
        let host = parsed.host_str().unwrap_or_default();

        match parsed.scheme() {
            "none" => Ok(Self::Disabled),
            "unix" => {
                if !host.is_empty() {
                    return Err(VmkitError::InvalidRestfulUri(uri.to_string()));
                }
                let path = parsed.path();
                if path.is_empty() || path == "/" {
                    return Err(VmkitError::InvalidRestfulUri(uri.to_string()));
                }
                Ok(Self::Unix(PathBuf::from(path)))
            }
            "tcp" => {
                if host.is_empty() {
                    return Err(VmkitError::InvalidRestfulUri(uri.to_string()));
                }
                let Some(port) = parsed.port() else {
                    return Err(VmkitError::InvalidRestfulUri(uri.to_string()));
                };
                let path = parsed.path();
                if !path.is_empty() && path != "/" {
                    return Err(VmkitError::InvalidRestfulUri(uri.to_string()));
                }
                Ok(Self::Tcp(host.to_string(), port))
            }
            _ => Err(VmkitError::InvalidRestfulUri(uri.to_string())),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Starts the control service on `endpoint`.
///
/// Returns the server task, or `None` when the endpoint is disabled.
pub async fn serve(
    endpoint: &RestEndpoint,
    state: ServiceState,
) -> VmkitResult<Option<JoinHandle<()>>> {
    let app = create_router(state);
    match endpoint {
        RestEndpoint::Disabled => Ok(None),
        RestEndpoint::Unix(path) => {
            let listener = UnixListener::bind(path).map_err(|source| VmkitError::ListenError {
                path: path.clone(),
                source,
            })?;
            info!("control service listening on {}", path.display());
            let task = tokio::spawn(async move {
                if let Err(err) = axum::serve(listener, app.into_make_service()).await {
                    error!("control service terminated: {err}");
                }
            });
            Ok(Some(task))
        }
        RestEndpoint::Tcp(host, port) => {
            let listener = TcpListener::bind((host.as_str(), *port)).await?;
            info!("control service listening on {host}:{port}");
            let task = tokio::spawn(async move {
                if let Err(err) = axum::serve(listener, app.into_make_service()).await {
                    error!("control service terminated: {err}");
                }
            });
            Ok(Some(task))
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

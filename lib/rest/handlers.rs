//! HTTP request handlers for the control service.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use tracing::info;

use crate::VmkitError;

use super::{
    state::ServiceState,
    types::{ErrorResponse, StateChange, StateChangeRequest, StateResponse},
};

//-------------------------------------------------------------------------------------------------
// Functions: Handlers
//-------------------------------------------------------------------------------------------------

/// Handler for the GET /vm/state endpoint.
///
/// Reports the engine's current state and which transitions it would accept.
pub async fn get_state_handler(State(state): State<ServiceState>) -> impl IntoResponse {
    let handle = state.get_handle();
    let response = StateResponse::new(handle.state().await, handle.capabilities().await);
    (StatusCode::OK, Json(response))
}

/// Handler for the POST /vm/state endpoint.
///
/// Requests a state transition. Accepted requests answer `202 Accepted` immediately; the
/// transition itself completes asynchronously.
pub async fn set_state_handler(
    State(state): State<ServiceState>,
    Json(request): Json<StateChangeRequest>,
) -> impl IntoResponse {
    let change = match request.state_change() {
        Ok(change) => change,
        Err(err) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: err.to_string(),
                }),
            )
                .into_response()
        }
    };

    info!("requested state change: {change:?}");
    let handle = state.get_handle();
    let result = match change {
        StateChange::Pause => handle.pause().await,
        StateChange::Resume => handle.resume().await,
        StateChange::Stop => handle.request_stop().await,
        StateChange::HardStop => handle.force_stop().await,
    };

    match result {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(err @ VmkitError::InvalidStateRequest(_)) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: err.to_string(),
            }),
        )
            .into_response(),
        // Engine rejections surface verbatim.
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: err.to_string(),
            }),
        )
            .into_response(),
    }
}

/// Handler for the GET /vm/inspect endpoint.
///
/// Returns the configuration snapshot taken at startup; stable across calls.
pub async fn inspect_handler(State(state): State<ServiceState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.get_snapshot().as_ref().clone()))
}

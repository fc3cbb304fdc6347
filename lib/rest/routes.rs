//! Route definitions for the control service.

use axum::{routing::get, Router};

use super::{handlers, state::ServiceState};

//-------------------------------------------------------------------------------------------------
// Functions
//-------------------------------------------------------------------------------------------------

/// Creates the control-service router.
pub fn create_router(state: ServiceState) -> Router {
    Router::new()
        .route(
            "/vm/state",
            get(handlers::get_state_handler).post(handlers::set_state_handler),
        )
        .route("/vm/inspect", get(handlers::inspect_handler))
        .with_state(state)
}

//! Agent-facing WebSocket endpoint.
//!
//! Agents open a WebSocket at `/` and identify themselves with the
//! `Agent-ID` header. Each connection is registered with the controller as an
//! agent link; its close is reported exactly once.

mod agent_socket;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub use agent_socket::{agent_id_from_headers, serve_agent};

/// Create the router served on the agent listen address.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(agent_socket::upgrade))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

//! HTTP routes of the mock device.

use axum::{
    Router,
    routing::{delete, get, post},
};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub mod auth;
pub mod virtual_server;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Authentication
        .route("/mgmt/shared/authn/login", post(auth::login))
        .route("/mgmt/shared/authz/tokens/{token}", delete(auth::delete_token))
        // LTM virtual servers
        .route(
            "/mgmt/tm/ltm/virtual",
            get(virtual_server::list_virtuals).post(virtual_server::create_virtual),
        )
        .route(
            "/mgmt/tm/ltm/virtual/{name}",
            get(virtual_server::get_virtual)
                .patch(virtual_server::modify_virtual)
                .delete(virtual_server::delete_virtual),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

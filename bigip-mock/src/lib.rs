//! bigip-mock: in-memory stand-in for the BIG-IP iControl REST endpoints
//! that manage LTM virtual servers.
//!
//! Used by the bigip-vs integration tests and runnable as a local server.

pub mod error;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;

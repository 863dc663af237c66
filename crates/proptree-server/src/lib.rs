//! HTTP server for proptree.
//!
//! Exposes Get/Put/Rm/Mv as JSON-over-HTTP endpoints behind bearer-token
//! authentication, plus an unauthenticated health check.

pub mod auth;
pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;
pub mod state;

pub use auth::{Claims, Credentials, Identity, IdentityGate, SharedSecretGate, TRACE_ID_HEADER};
pub use config::ServerConfig;
pub use error::{ErrorResponse, ServerError, ServerResult};
pub use server::PropServer;
pub use state::AppState;

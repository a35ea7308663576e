//! HTTP gateway for the interview service.
//!
//! Serves the question-generation endpoint, a health check, and a WebSocket
//! bridge that runs a call [`prepwise_call::Agent`] for a browser-hosted
//! voice session.

pub mod call_ws;
pub mod error;
pub mod generate;
pub mod prompt;
pub mod questions;
pub mod server;
pub mod state;

pub use server::{router, start_gateway};
pub use state::AppState;

//! HTTP API for controlling the conversation from other local tools
//!
//! - POST /conversation/turn/start - Begin a turn (only when idle)
//! - POST /conversation/turn/stop - End the current utterance
//! - POST /conversation/stop - End the conversation and clear history
//! - GET /conversation/status - Current state, turn and partial transcript
//! - GET /conversation/history - Committed turns so far
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;

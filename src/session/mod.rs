//! Conversation session management
//!
//! This module provides the `Session` actor that manages:
//! - The turn state machine (Idle, Recording, AwaitingResponse, Speaking, Error)
//! - Capture start/stop and frame forwarding to the transport
//! - Dispatch of agent messages into history and playback
//! - Auto-resume of capture after the agent finishes speaking

pub mod config;
pub mod dispatcher;
pub mod handle;
pub mod history;
mod session;
pub mod state;
pub mod timer;

pub use config::SessionConfig;
pub use dispatcher::{Directive, Dispatcher};
pub use handle::{Command, Notice, SessionHandle, SessionSnapshot};
pub use history::{HistoryStore, Speaker, Turn};
pub use session::{Session, SessionParts};
pub use state::SessionState;
pub use timer::SessionTimer;

use super::state::AppState;
use crate::session::{Command, SessionState, Turn};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use tracing::{error, info};

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub session_id: String,
    /// State at the time the command was accepted
    pub state: SessionState,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub session_id: String,
    pub state: SessionState,
    pub turn_index: u64,
    pub partial: Option<String>,
    pub last_error: Option<String>,
    pub turns: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: String) -> axum::response::Response {
    (status, Json(ErrorResponse { error })).into_response()
}

fn send_command(state: &AppState, command: Command, message: &str) -> axum::response::Response {
    let snapshot = state.session.snapshot();
    match state.session.send(command) {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(CommandResponse {
                session_id: snapshot.session_id,
                state: snapshot.state,
                message: message.to_string(),
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to send {:?}: {}", command, e);
            error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /conversation/turn/start
/// Begin a new turn; rejected while a turn is in progress
pub async fn start_turn(State(state): State<AppState>) -> impl IntoResponse {
    let current = state.session.state();
    if current.is_busy() {
        return error_response(
            StatusCode::CONFLICT,
            format!("A turn is already in progress ({})", current),
        );
    }

    info!("Turn start requested over HTTP");
    send_command(&state, Command::StartTurn, "Turn starting")
}

/// POST /conversation/turn/stop
/// End the current utterance
pub async fn stop_turn(State(state): State<AppState>) -> impl IntoResponse {
    let current = state.session.state();
    if current != SessionState::Recording {
        return error_response(
            StatusCode::CONFLICT,
            format!("Not recording ({})", current),
        );
    }

    info!("Turn stop requested over HTTP");
    send_command(&state, Command::StopTurn, "Turn stopping")
}

/// POST /conversation/stop
/// End the conversation and clear its history
pub async fn stop_conversation(State(state): State<AppState>) -> impl IntoResponse {
    info!("Conversation stop requested over HTTP");
    send_command(&state, Command::StopConversation, "Conversation stopping")
}

/// GET /conversation/status
pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.session.snapshot();
    Json(StatusResponse {
        session_id: snapshot.session_id,
        state: snapshot.state,
        turn_index: snapshot.turn_index,
        partial: snapshot.partial,
        last_error: snapshot.last_error,
        turns: snapshot.history.len(),
    })
}

/// GET /conversation/history
pub async fn get_history(State(state): State<AppState>) -> impl IntoResponse {
    let history: Vec<Turn> = state.session.snapshot().history;
    Json(history)
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

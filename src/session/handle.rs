use super::history::Turn;
use super::state::SessionState;
use anyhow::{anyhow, Result};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};

/// User commands accepted by the session loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Begin a turn; ignored unless the session is idle
    StartTurn,
    /// End the current utterance
    StopTurn,
    /// End the whole conversation: tear down everything, clear history
    StopConversation,
    /// Stop the conversation and exit the session loop
    Shutdown,
}

/// User-visible notifications for presentation layers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    StateChanged(SessionState),
    /// Transient recognition text, never part of history
    Partial(String),
    TurnAppended(Turn),
    Error(String),
    ConversationStopped,
}

/// Point-in-time view of the session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub state: SessionState,
    pub turn_index: u64,
    pub partial: Option<String>,
    pub history: Vec<Turn>,
    pub last_error: Option<String>,
}

impl SessionSnapshot {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            state: SessionState::Idle,
            turn_index: 0,
            partial: None,
            history: Vec::new(),
            last_error: None,
        }
    }
}

/// Cloneable handle for driving a running session
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<SessionSnapshot>,
    notices: broadcast::Sender<Notice>,
}

impl SessionHandle {
    pub(crate) fn new(
        commands: mpsc::UnboundedSender<Command>,
        snapshot: watch::Receiver<SessionSnapshot>,
        notices: broadcast::Sender<Notice>,
    ) -> Self {
        Self {
            commands,
            snapshot,
            notices,
        }
    }

    pub fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| anyhow!("session is no longer running"))
    }

    pub fn start_turn(&self) -> Result<()> {
        self.send(Command::StartTurn)
    }

    pub fn stop_turn(&self) -> Result<()> {
        self.send(Command::StopTurn)
    }

    pub fn stop_conversation(&self) -> Result<()> {
        self.send(Command::StopConversation)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown)
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn state(&self) -> SessionState {
        self.snapshot.borrow().state
    }

    /// Receiver woken whenever the published snapshot changes
    pub fn changes(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    /// Subscribe to notices published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// Wait until a snapshot satisfies `predicate`
    pub async fn wait_for<F>(&self, mut predicate: F) -> Result<SessionSnapshot>
    where
        F: FnMut(&SessionSnapshot) -> bool,
    {
        let mut rx = self.snapshot.clone();
        let snapshot = rx
            .wait_for(|s| predicate(s))
            .await
            .map_err(|_| anyhow!("session ended"))?;
        Ok(snapshot.clone())
    }
}

use super::player::{AudioPlayer, PlayableAudio};
use crate::error::PlaybackError;
use crate::session::history::{HistoryStore, Speaker};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Playback request handed over by the dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentResponse {
    pub audio: PlayableAudio,
    /// Agent text appended to history once playback completes
    pub agent_text: Option<String>,
    /// Set for error replies carrying a spoken error message
    pub error_message: Option<String>,
}

impl AgentResponse {
    pub fn new(audio: PlayableAudio) -> Self {
        Self {
            audio,
            agent_text: None,
            error_message: None,
        }
    }

    /// Normal replies resume capture afterwards; error replies do not
    pub fn resumes_capture(&self) -> bool {
        self.error_message.is_none()
    }
}

struct ActivePlayback {
    turn: u64,
    task: JoinHandle<Result<(), PlaybackError>>,
    agent_text: Option<String>,
    resume: bool,
}

/// Result of a finished playback, as seen by the session
#[derive(Debug)]
pub struct PlaybackOutcome {
    pub turn: u64,
    pub result: Result<(), PlaybackError>,
    agent_text: Option<String>,
    resume: bool,
}

/// What the session should do after playback settles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterPlayback {
    /// Schedule the next Recording phase
    Resume,
    /// Return to Idle and wait for the user
    Rest,
}

/// Owns the single in-progress playback
pub struct PlaybackController {
    player: Arc<dyn AudioPlayer>,
    active: Option<ActivePlayback>,
}

impl PlaybackController {
    pub fn new(player: Arc<dyn AudioPlayer>) -> Self {
        Self {
            player,
            active: None,
        }
    }

    /// Start playing; any previous playback is stopped first
    pub fn start(&mut self, turn: u64, response: AgentResponse) {
        self.stop();

        let resume = response.resumes_capture();
        let player = Arc::clone(&self.player);
        let audio = response.audio;
        info!("Playing agent response for turn {} via {}", turn, player.name());

        let task = tokio::spawn(async move { player.play(audio).await });
        self.active = Some(ActivePlayback {
            turn,
            task,
            agent_text: response.agent_text,
            resume,
        });
    }

    /// Abort playback in progress. Returns true if something was playing.
    pub fn stop(&mut self) -> bool {
        match self.active.take() {
            Some(active) => {
                active.task.abort();
                info!("Stopped playback for turn {}", active.turn);
                true
            }
            None => false,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.active.is_some()
    }

    /// Wait for the active playback to end; pending forever when idle
    ///
    /// Cancel safe: dropping this future leaves the playback running.
    pub async fn finished(&mut self) -> PlaybackOutcome {
        let joined = match self.active.as_mut() {
            Some(active) => (&mut active.task).await,
            None => std::future::pending().await,
        };

        let result = joined.unwrap_or_else(|e| {
            Err(PlaybackError::Play(format!("playback task failed: {}", e)))
        });

        match self.active.take() {
            Some(active) => PlaybackOutcome {
                turn: active.turn,
                result,
                agent_text: active.agent_text,
                resume: active.resume,
            },
            None => PlaybackOutcome {
                turn: 0,
                result,
                agent_text: None,
                resume: false,
            },
        }
    }

    /// Apply a finished playback: release it, record the agent turn, decide
    /// whether capture should resume
    pub fn settle(
        &self,
        outcome: PlaybackOutcome,
        history: &mut HistoryStore,
    ) -> Result<AfterPlayback, PlaybackError> {
        match outcome.result {
            Ok(()) => {
                if let Some(text) = outcome.agent_text.filter(|t| !t.trim().is_empty()) {
                    history.append(Speaker::Agent, text);
                }
                info!("Playback complete for turn {}", outcome.turn);
                if outcome.resume {
                    Ok(AfterPlayback::Resume)
                } else {
                    Ok(AfterPlayback::Rest)
                }
            }
            Err(e) => {
                warn!("Playback failed for turn {}: {}", outcome.turn, e);
                Err(e)
            }
        }
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.task.abort();
        }
    }
}

//! Reduces inbound agent messages into history updates and directives for
//! the session state machine.

use super::history::{HistoryStore, Speaker};
use crate::error::TurnError;
use crate::playback::{AgentResponse, PlayableAudio};
use crate::transport::{BatchReply, InboundMessage};
use tracing::{debug, info, warn};

/// What the session should do after a message was dispatched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Nothing beyond the state already updated here
    Continue,
    /// The server decided the utterance is over
    EndOfUtterance,
    /// Response audio is ready for the playback controller
    Play(AgentResponse),
    /// The turn cannot produce a response
    Fail(TurnError),
}

/// Ordered accumulation of base64 audio chunks for one turn
#[derive(Debug, Default)]
struct ChunkAssembler {
    data: String,
    ends: Vec<usize>,
    declared_bytes: usize,
}

impl ChunkAssembler {
    fn push(&mut self, data: &str, size: usize) {
        self.data.push_str(data);
        self.ends.push(self.data.len());
        self.declared_bytes += size;
    }

    fn len(&self) -> usize {
        self.ends.len()
    }

    /// Joined base64 text and the end offset of every chunk
    fn take(&mut self) -> (String, Vec<usize>) {
        self.declared_bytes = 0;
        (std::mem::take(&mut self.data), std::mem::take(&mut self.ends))
    }
}

/// Interprets streaming messages and batch replies
///
/// History is passed in rather than owned so the session keeps a single
/// store shared with the playback controller.
#[derive(Debug, Default)]
pub struct Dispatcher {
    turn: u64,
    partial: Option<String>,
    chunks: ChunkAssembler,
    last_user: Option<(u64, String)>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset per-turn state for a new turn
    pub fn begin_turn(&mut self, turn: u64) {
        self.turn = turn;
        self.partial = None;
        self.chunks = ChunkAssembler::default();
        self.last_user = None;
    }

    /// Drop any partially received response
    pub fn abandon_turn(&mut self) {
        if !self.chunks.ends.is_empty() {
            debug!(
                "Discarding {} buffered audio chunks for turn {}",
                self.chunks.len(),
                self.turn
            );
        }
        self.chunks = ChunkAssembler::default();
        self.partial = None;
    }

    /// Transient display text from the latest partial transcript
    pub fn partial(&self) -> Option<&str> {
        self.partial.as_deref()
    }

    pub fn buffered_chunks(&self) -> usize {
        self.chunks.len()
    }

    pub fn dispatch(&mut self, message: InboundMessage, history: &mut HistoryStore) -> Directive {
        match message {
            InboundMessage::PartialTranscript { text } => {
                debug!("Partial transcript: {}", text);
                self.partial = Some(text);
                Directive::Continue
            }
            InboundMessage::FinalTranscript { text, turn_order } => {
                self.record_user(text, turn_order, history);
                Directive::Continue
            }
            InboundMessage::TurnComplete { text, turn_order } => {
                self.record_user(text, turn_order, history);
                Directive::EndOfUtterance
            }
            InboundMessage::AudioChunk { data, size } => {
                self.chunks.push(&data, size);
                debug!(
                    "Buffered audio chunk {} for turn {} ({} bytes)",
                    self.chunks.len(),
                    self.turn,
                    size
                );
                Directive::Continue
            }
            InboundMessage::AudioComplete { total_chunks } => {
                let declared_bytes = self.chunks.declared_bytes;
                let (data, chunk_ends) = self.chunks.take();
                let received = chunk_ends.len();
                if received != total_chunks {
                    warn!(
                        "Audio complete for turn {}: expected {} chunks, received {}",
                        self.turn, total_chunks, received
                    );
                }
                if data.is_empty() {
                    return Directive::Fail(TurnError::NoAudioResponse);
                }
                info!(
                    "Agent audio ready for turn {} ({} chunks, {} bytes)",
                    self.turn, received, declared_bytes
                );
                Directive::Play(AgentResponse::new(PlayableAudio::Inline {
                    base64: data,
                    chunk_ends,
                }))
            }
            InboundMessage::Unknown { tag } => {
                warn!("Ignoring inbound message with unknown type: {}", tag);
                Directive::Continue
            }
        }
    }

    /// Interpret a batch reply
    pub fn dispatch_reply(&mut self, reply: BatchReply, history: &mut HistoryStore) -> Directive {
        let audio_url = reply.audio_url.filter(|url| !url.is_empty());

        if reply.error.is_some() {
            let message = reply
                .message
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "The agent could not process your request.".to_string());
            warn!("Agent reported an error for turn {}: {}", self.turn, message);
            return match audio_url {
                // Spoken error message: play it, but the turn still failed
                Some(url) => Directive::Play(AgentResponse {
                    audio: PlayableAudio::Url(url),
                    agent_text: None,
                    error_message: Some(message),
                }),
                None => Directive::Fail(TurnError::Server { message }),
            };
        }

        let query = reply.query.trim();
        if !query.is_empty() {
            history.append(Speaker::User, query);
        }
        self.partial = None;

        match audio_url {
            Some(url) => Directive::Play(AgentResponse {
                audio: PlayableAudio::Url(url),
                agent_text: Some(reply.response).filter(|r| !r.trim().is_empty()),
                error_message: None,
            }),
            None => Directive::Fail(TurnError::NoAudioResponse),
        }
    }

    fn record_user(&mut self, text: String, turn_order: u64, history: &mut HistoryStore) {
        self.partial = None;
        // FinalTranscript and TurnComplete may both announce the same utterance
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if let Some((order, recorded)) = &self.last_user {
            if *order == turn_order && recorded == text {
                debug!("Turn order {} already recorded", turn_order);
                return;
            }
        }
        self.last_user = Some((turn_order, text.to_string()));
        history.append(Speaker::User, text);
    }
}

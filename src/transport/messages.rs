use serde::{Deserialize, Serialize};
use tracing::warn;

/// Message received from the agent over the streaming channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    PartialTranscript {
        text: String,
    },
    FinalTranscript {
        text: String,
        turn_order: u64,
    },
    TurnComplete {
        text: String,
        turn_order: u64,
    },
    AudioChunk {
        /// Base64-encoded audio bytes
        data: String,
        size: usize,
    },
    AudioComplete {
        total_chunks: usize,
    },
    /// Tag this client does not know; logged and ignored
    #[serde(skip)]
    Unknown {
        tag: String,
    },
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireMessage {
    PartialTranscript {
        #[serde(default)]
        text: String,
    },
    FinalTranscript {
        #[serde(default)]
        text: String,
        #[serde(default, alias = "turnOrder")]
        turn_order: u64,
    },
    TurnComplete {
        #[serde(default)]
        text: String,
        #[serde(default, alias = "turnOrder")]
        turn_order: u64,
    },
    AudioChunk {
        data: String,
        #[serde(default)]
        size: usize,
    },
    AudioComplete {
        #[serde(default, alias = "totalChunks")]
        total_chunks: usize,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize)]
struct Tag {
    #[serde(rename = "type")]
    kind: String,
}

impl InboundMessage {
    /// Parse one JSON message
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let message = match serde_json::from_str::<WireMessage>(text)? {
            WireMessage::PartialTranscript { text } => InboundMessage::PartialTranscript { text },
            WireMessage::FinalTranscript { text, turn_order } => {
                InboundMessage::FinalTranscript { text, turn_order }
            }
            WireMessage::TurnComplete { text, turn_order } => {
                InboundMessage::TurnComplete { text, turn_order }
            }
            WireMessage::AudioChunk { data, size } => InboundMessage::AudioChunk { data, size },
            WireMessage::AudioComplete { total_chunks } => {
                InboundMessage::AudioComplete { total_chunks }
            }
            WireMessage::Unknown => InboundMessage::Unknown {
                tag: serde_json::from_str::<Tag>(text)?.kind,
            },
        };
        Ok(message)
    }

    /// Parse a text frame that may carry several newline-delimited messages
    ///
    /// Lines that fail to parse are logged and skipped.
    pub fn parse_frame(frame: &str) -> Vec<Self> {
        frame
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter_map(|line| match Self::parse(line) {
                Ok(message) => Some(message),
                Err(e) => {
                    warn!("Failed to parse inbound message: {}", e);
                    None
                }
            })
            .collect()
    }
}

/// Control message sent when the outbound audio half closes
#[derive(Debug, Serialize)]
pub struct EndOfAudioMessage {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub session_id: String,
    pub frames: u64,
}

impl EndOfAudioMessage {
    pub fn new(session_id: impl Into<String>, frames: u64) -> Self {
        Self {
            kind: "end_of_audio",
            session_id: session_id.into(),
            frames,
        }
    }
}

/// Agent reply to a batch turn submission
///
/// Error replies still carry an `audio_url` for a spoken error message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReply {
    /// User's transcribed message
    #[serde(default)]
    pub query: String,
    /// Agent's response text
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub audio_url: Option<String>,
    /// Error type, present only on error replies
    #[serde(default)]
    pub error: Option<String>,
    /// Human-readable error message
    #[serde(default)]
    pub message: Option<String>,
}

impl BatchReply {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

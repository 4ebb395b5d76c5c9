//! Transports to the remote agent
//!
//! Two interchangeable strategies:
//! - Batch: one multipart upload per turn, wrapped in the retry policy
//! - Streaming: a duplex channel per Recording phase, raw PCM frames out and
//!   JSON messages in

pub mod batch;
pub mod messages;
pub mod retry;
pub mod streaming;

use std::sync::Arc;

pub use batch::{BatchTransport, HttpBatchTransport, RetryableRequest, TurnSubmission};
pub use messages::{BatchReply, EndOfAudioMessage, InboundMessage};
pub use retry::RetryPolicy;
pub use streaming::{
    ChannelEvent, StreamChannel, StreamEndpoint, StreamingTransport, WebSocketTransport,
};

/// Transport strategy used by a session
#[derive(Clone)]
pub enum Transport {
    Batch(Arc<dyn BatchTransport>),
    Streaming(Arc<dyn StreamingTransport>),
}

impl Transport {
    pub fn mode(&self) -> TransportMode {
        match self {
            Transport::Batch(_) => TransportMode::Batch,
            Transport::Streaming(_) => TransportMode::Streaming,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    Batch,
    Streaming,
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportMode::Batch => write!(f, "batch"),
            TransportMode::Streaming => write!(f, "streaming"),
        }
    }
}

pub mod audio;
pub mod config;
pub mod error;
pub mod http;
pub mod playback;
pub mod services;
pub mod session;
pub mod transport;

pub use audio::{
    AudioFrame, CaptureBackend, CaptureBackendFactory, CaptureBuffer, CaptureConfig, CaptureEvent,
    CaptureSource, ClipEncoder, EncodedClip, FrameEncoder,
};
pub use config::Config;
pub use error::{CaptureError, PlaybackError, TransportError, TransportErrorKind, TurnError};
pub use http::{create_router, AppState};
pub use playback::{AudioPlayer, CommandPlayer, PlayableAudio};
pub use services::SpeechServices;
pub use session::{
    Command, Notice, Session, SessionConfig, SessionHandle, SessionParts, SessionSnapshot,
    SessionState, Speaker, Turn,
};
pub use transport::{
    BatchReply, BatchTransport, HttpBatchTransport, InboundMessage, RetryPolicy, StreamChannel,
    StreamingTransport, Transport, TransportMode, WebSocketTransport,
};

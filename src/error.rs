//! Error kinds for the conversation core
//!
//! Every failure is classified where it happens. Nothing downstream inspects
//! message text to decide what went wrong.

use thiserror::Error;

/// Failure acquiring or reading the microphone
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),

    #[error("no capture device found: {0}")]
    NoDevice(String),

    #[error("audio capture not supported: {0}")]
    Unsupported(String),

    #[error("capture stream failed: {0}")]
    Stream(String),
}

/// What kind of transport failure occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Could not reach the service (DNS, refused, reset)
    Connectivity,
    /// Request did not complete in time
    Timeout,
    /// Service answered with a non-2xx status
    Status,
    /// Response body could not be understood
    Decode,
    /// Streaming channel dropped or refused a message
    Channel,
}

/// Failure talking to the remote agent
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out")]
    Timeout,

    #[error("server returned HTTP {status}")]
    Status {
        status: u16,
        /// Error message embedded in the response payload, if any
        message: Option<String>,
    },

    #[error("invalid response: {0}")]
    Decode(String),

    #[error("streaming channel error: {0}")]
    Channel(String),
}

impl TransportError {
    pub fn kind(&self) -> TransportErrorKind {
        match self {
            TransportError::Connect(_) => TransportErrorKind::Connectivity,
            TransportError::Timeout => TransportErrorKind::Timeout,
            TransportError::Status { .. } => TransportErrorKind::Status,
            TransportError::Decode(_) => TransportErrorKind::Decode,
            TransportError::Channel(_) => TransportErrorKind::Channel,
        }
    }

    /// Whether the retry policy may try the same request again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            TransportErrorKind::Connectivity | TransportErrorKind::Timeout | TransportErrorKind::Status
        )
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_decode() {
            TransportError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            TransportError::Status {
                status: status.as_u16(),
                message: None,
            }
        } else {
            TransportError::Connect(err.to_string())
        }
    }
}

/// Failure decoding or playing the agent's audio
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("could not decode agent audio: {0}")]
    Decode(String),

    #[error("audio playback failed: {0}")]
    Play(String),

    #[error("no audio player available")]
    Unavailable,
}

/// Why a turn was abandoned
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TurnError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("recording produced no audio data")]
    EmptyCapture,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("agent error: {message}")]
    Server { message: String },

    #[error("no audio response received")]
    NoAudioResponse,

    #[error("timed out waiting for the agent response")]
    ResponseTimeout,

    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

impl TurnError {
    /// Message shown to the person talking
    pub fn user_message(&self) -> String {
        match self {
            TurnError::Capture(CaptureError::PermissionDenied(_)) => {
                "Could not access your microphone. Please allow microphone access and try again."
                    .to_string()
            }
            TurnError::Capture(CaptureError::NoDevice(_)) => {
                "Could not access your microphone. No microphone found. Please connect a microphone."
                    .to_string()
            }
            TurnError::Capture(CaptureError::Unsupported(_)) => {
                "Audio recording is not supported on this system.".to_string()
            }
            TurnError::Capture(CaptureError::Stream(_)) => {
                "Recording failed. Please check your microphone settings.".to_string()
            }
            TurnError::EmptyCapture => {
                "Failed to process your recording. Please try again.".to_string()
            }
            TurnError::Transport(TransportError::Status {
                message: Some(message),
                ..
            }) => message.clone(),
            TurnError::Transport(TransportError::Status { status: 503, .. }) => {
                "The agent service is temporarily unavailable. Please try again shortly.".to_string()
            }
            TurnError::Transport(TransportError::Status { status, .. }) if *status >= 500 => {
                "The agent ran into a server error. Please try again.".to_string()
            }
            TurnError::Transport(TransportError::Connect(_) | TransportError::Timeout) => {
                "Could not reach the agent. Please check your connection.".to_string()
            }
            TurnError::Transport(TransportError::Channel(_)) => {
                "The connection to the agent was interrupted.".to_string()
            }
            TurnError::Transport(_) => {
                "Failed to process your request. Please try again.".to_string()
            }
            TurnError::Server { message } => message.clone(),
            TurnError::NoAudioResponse => "No audio response received.".to_string(),
            TurnError::ResponseTimeout => "The agent took too long to respond.".to_string(),
            TurnError::Playback(_) => "Audio playback failed.".to_string(),
        }
    }
}

use crate::transport::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a conversation session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session identifier sent to the agent (e.g., "conversation-<uuid>")
    pub session_id: String,

    /// Sample rate for capture and streaming frames (16kHz)
    pub sample_rate: u32,

    /// Samples per capture buffer / streaming frame
    /// Default: 4096 (256ms at 16kHz)
    pub frame_samples: usize,

    /// Delay between the end of playback and the next Recording phase
    pub resume_delay: Duration,

    /// Whether to start the next turn automatically after playback
    pub auto_resume: bool,

    /// Streaming mode: how long to wait for the reply after the utterance ends
    pub response_timeout: Duration,

    /// Batch mode: retry budget and initial backoff
    pub max_retries: u32,
    pub initial_retry_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("conversation-{}", uuid::Uuid::new_v4()),
            sample_rate: 16000,                        // Streaming wire format is 16kHz
            frame_samples: 4096,                       // ~256ms per frame
            resume_delay: Duration::from_millis(500),
            auto_resume: true,
            response_timeout: Duration::from_secs(30),
            max_retries: 2,                            // 3 tries in total
            initial_retry_delay: Duration::from_millis(1000),
        }
    }
}

impl SessionConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.initial_retry_delay)
    }
}

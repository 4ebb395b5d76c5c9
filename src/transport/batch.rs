use super::messages::BatchReply;
use super::retry::RetryPolicy;
use crate::audio::EncodedClip;
use crate::error::TransportError;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// One turn's payload for the batch endpoint
#[derive(Debug, Clone)]
pub struct TurnSubmission {
    pub session_id: String,
    pub turn_index: u64,
    pub clip: EncodedClip,
}

/// Request/response transport: one upload per turn
///
/// Submissions must be safe to resend; the retry policy may call `submit`
/// several times with the same payload.
#[async_trait::async_trait]
pub trait BatchTransport: Send + Sync {
    async fn submit(&self, submission: &TurnSubmission) -> Result<BatchReply, TransportError>;

    /// Endpoint description for logging
    fn endpoint(&self, session_id: &str) -> String;
}

/// A batch call wrapped in the retry policy, consumed by `execute`
pub struct RetryableRequest {
    transport: Arc<dyn BatchTransport>,
    submission: TurnSubmission,
    policy: RetryPolicy,
}

impl RetryableRequest {
    pub fn new(
        transport: Arc<dyn BatchTransport>,
        submission: TurnSubmission,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            submission,
            policy,
        }
    }

    pub fn endpoint(&self) -> String {
        self.transport.endpoint(&self.submission.session_id)
    }

    pub async fn execute(self) -> Result<BatchReply, TransportError> {
        let label = format!("Turn {} submission", self.submission.turn_index);
        info!(
            "Submitting turn {} to {} ({} bytes)",
            self.submission.turn_index,
            self.endpoint(),
            self.submission.clip.bytes.len()
        );

        let transport = self.transport;
        let submission = self.submission;
        self.policy
            .run(&label, |attempt| {
                let transport = Arc::clone(&transport);
                let submission = &submission;
                async move {
                    debug!(attempt, "Sending turn {}", submission.turn_index);
                    transport.submit(submission).await
                }
            })
            .await
    }
}

/// Batch transport over HTTP multipart
///
/// `POST {base_url}/agent/chat/{session_id}` with the clip in `audioFile`.
pub struct HttpBatchTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBatchTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Connect(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait::async_trait]
impl BatchTransport for HttpBatchTransport {
    async fn submit(&self, submission: &TurnSubmission) -> Result<BatchReply, TransportError> {
        let part = reqwest::multipart::Part::bytes(submission.clip.bytes.clone())
            .file_name(submission.clip.file_name)
            .mime_str(submission.clip.mime_type)
            .map_err(|e| TransportError::Decode(format!("invalid clip MIME type: {}", e)))?;
        let form = reqwest::multipart::Form::new().part("audioFile", part);

        let response = self
            .client
            .post(self.endpoint(&submission.session_id))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            // Error payloads still carry a message worth showing
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<BatchReply>(&body)
                .ok()
                .and_then(|reply| reply.message.filter(|m| !m.is_empty()));
            return Err(TransportError::Status {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<BatchReply>()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }

    fn endpoint(&self, session_id: &str) -> String {
        format!("{}/agent/chat/{}", self.base_url, session_id)
    }
}

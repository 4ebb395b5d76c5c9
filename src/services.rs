//! Single-shot speech endpoints of the agent API
//!
//! Text-to-speech and one-off transcription. These calls are stateless: no
//! retry, no session, no history.

use crate::audio::EncodedClip;
use crate::error::TransportError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct SynthesizeResponse {
    audio_url: String,
}

#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    transcript: String,
}

/// Client for `POST /tts` and `POST /transcribe/file`
pub struct SpeechServices {
    client: reqwest::Client,
    base_url: String,
}

impl SpeechServices {
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

    /// Synthesize `text`; returns the URL of the generated audio
    pub async fn synthesize(&self, text: &str) -> Result<String, TransportError> {
        info!("Requesting speech for {} characters", text.chars().count());

        let response = self
            .client
            .post(format!("{}/tts", self.base_url))
            .json(&SynthesizeRequest { text })
            .send()
            .await?;
        let response = check_status(response).await?;

        let body: SynthesizeResponse = response
            .json()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))?;
        if body.audio_url.is_empty() {
            return Err(TransportError::Decode("empty audio_url in TTS reply".to_string()));
        }
        Ok(body.audio_url)
    }

    /// Transcribe a clip without involving the agent
    pub async fn transcribe(&self, clip: &EncodedClip) -> Result<String, TransportError> {
        info!("Requesting transcription ({} bytes)", clip.bytes.len());

        let part = reqwest::multipart::Part::bytes(clip.bytes.clone())
            .file_name(clip.file_name)
            .mime_str(clip.mime_type)
            .map_err(|e| TransportError::Decode(format!("invalid clip MIME type: {}", e)))?;
        let form = reqwest::multipart::Form::new().part("audioFile", part);

        let response = self
            .client
            .post(format!("{}/transcribe/file", self.base_url))
            .multipart(form)
            .send()
            .await?;
        let response = check_status(response).await?;

        let body: TranscribeResponse = response
            .json()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))?;
        Ok(body.transcript)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .filter(|m| !m.is_empty());
    Err(TransportError::Status {
        status: status.as_u16(),
        message,
    })
}

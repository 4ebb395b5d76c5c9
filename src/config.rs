use crate::audio::{CaptureConfig, CaptureSource};
use crate::session::SessionConfig;
use crate::transport::TransportMode;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub agent: AgentConfig,
    pub audio: AudioConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct AgentConfig {
    /// Base URL of the agent API (batch uploads and speech endpoints)
    pub base_url: String,
    /// WebSocket URL for streaming turns
    pub streaming_url: Option<String>,
    /// Fixed session id; generated per run when absent
    pub session_id: Option<String>,
    pub transport: TransportMode,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub frame_samples: usize,
    /// "microphone" or "file"
    #[serde(default = "default_capture_source")]
    pub source: String,
    /// WAV file replayed when `source = "file"`
    pub input_file: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PlaybackConfig {
    /// afplay, play or aplay; detected when absent
    pub player: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ConversationConfig {
    pub resume_delay_ms: u64,
    pub auto_resume: bool,
    pub response_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            resume_delay_ms: 500,
            auto_resume: true,
            response_timeout_ms: 30_000,
            request_timeout_ms: 60_000,
        }
    }
}

fn default_capture_source() -> String {
    "microphone".to_string()
}

impl Config {
    /// Load from a config file, overlaid with `VOICE_TURNS__SECTION__KEY` env vars
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(
                config::Environment::with_prefix("VOICE_TURNS")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("Failed to read config: {}", path))?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }

    pub fn session_config(&self) -> SessionConfig {
        let mut session = SessionConfig {
            sample_rate: self.audio.sample_rate,
            frame_samples: self.audio.frame_samples,
            resume_delay: Duration::from_millis(self.conversation.resume_delay_ms),
            auto_resume: self.conversation.auto_resume,
            response_timeout: Duration::from_millis(self.conversation.response_timeout_ms),
            max_retries: self.retry.max_retries,
            initial_retry_delay: Duration::from_millis(self.retry.initial_delay_ms),
            ..SessionConfig::default()
        };
        if let Some(id) = self.agent.session_id.as_ref().filter(|id| !id.is_empty()) {
            session.session_id = id.clone();
        }
        session
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            sample_rate: self.audio.sample_rate,
            buffer_samples: self.audio.frame_samples,
        }
    }

    pub fn capture_source(&self) -> Result<CaptureSource> {
        match self.audio.source.as_str() {
            "microphone" => Ok(CaptureSource::Microphone),
            "file" => {
                let path = self
                    .audio
                    .input_file
                    .as_ref()
                    .context("audio.input_file is required when audio.source = \"file\"")?;
                Ok(CaptureSource::File(PathBuf::from(path)))
            }
            other => anyhow::bail!("Unknown audio source: {}", other),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.conversation.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    const MINIMAL: &str = r#"
[service]
name = "voice-turns"

[service.http]
bind = "127.0.0.1"
port = 3100

[agent]
base_url = "http://localhost:8000"
transport = "batch"

[audio]
sample_rate = 16000
frame_samples = 4096
"#;

    #[test]
    fn test_defaults_fill_optional_sections() {
        let file = write_config(MINIMAL);
        let config = Config::load(file.path().to_str().unwrap()).unwrap();

        assert_eq!(config.agent.transport, TransportMode::Batch);
        assert_eq!(config.retry.max_retries, 2);

        let session = config.session_config();
        assert_eq!(session.resume_delay, Duration::from_millis(500));
        assert_eq!(session.initial_retry_delay, Duration::from_millis(1000));
        assert!(session.session_id.starts_with("conversation-"));
        assert!(matches!(
            config.capture_source().unwrap(),
            CaptureSource::Microphone
        ));
    }

    #[test]
    fn test_file_source_requires_input_file() {
        let file = write_config(&MINIMAL.replace(
            "frame_samples = 4096",
            "frame_samples = 4096\nsource = \"file\"",
        ));
        let config = Config::load(file.path().to_str().unwrap()).unwrap();
        assert!(config.capture_source().is_err());
    }
}

use crate::error::PlaybackError;
use base64::Engine;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Agent audio ready to be played
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayableAudio {
    /// Reference returned by the batch endpoint or TTS service
    Url(String),
    /// Reassembled base64 audio from streaming chunks, in arrival order.
    /// `chunk_ends` holds the end offset of each chunk within `base64`.
    Inline {
        base64: String,
        chunk_ends: Vec<usize>,
    },
}

impl PlayableAudio {
    /// Decode inline audio to bytes
    ///
    /// The joined text is tried first. Servers that encode every chunk on its
    /// own leave `=` padding inside the joined text, so on failure each chunk
    /// is decoded separately and the bytes are concatenated.
    pub fn decode_inline(base64: &str, chunk_ends: &[usize]) -> Result<Vec<u8>, PlaybackError> {
        let engine = &base64::engine::general_purpose::STANDARD;
        let joined_err = match engine.decode(base64.trim()) {
            Ok(bytes) => return Ok(bytes),
            Err(e) => PlaybackError::Decode(e.to_string()),
        };
        if chunk_ends.len() < 2 {
            return Err(joined_err);
        }

        let mut bytes = Vec::new();
        let mut start = 0;
        for &end in chunk_ends {
            let chunk = base64.get(start..end).ok_or_else(|| {
                PlaybackError::Decode(format!("chunk boundary {} outside {} bytes", end, base64.len()))
            })?;
            engine
                .decode_vec(chunk.trim(), &mut bytes)
                .map_err(|e| PlaybackError::Decode(e.to_string()))?;
            start = end;
        }
        Ok(bytes)
    }
}

/// Something that can play agent audio to completion
#[async_trait::async_trait]
pub trait AudioPlayer: Send + Sync {
    /// Play until finished. Dropping the future must stop playback.
    async fn play(&self, audio: PlayableAudio) -> Result<(), PlaybackError>;

    fn name(&self) -> &str;
}

/// Available audio playback program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerCommand {
    /// macOS `afplay`
    Afplay,
    /// SoX `play`
    SoxPlay,
    /// Linux ALSA `aplay`
    Aplay,
}

impl PlayerCommand {
    pub fn program(&self) -> &'static str {
        match self {
            PlayerCommand::Afplay => "afplay",
            PlayerCommand::SoxPlay => "play",
            PlayerCommand::Aplay => "aplay",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "afplay" => Some(PlayerCommand::Afplay),
            "play" | "sox" => Some(PlayerCommand::SoxPlay),
            "aplay" => Some(PlayerCommand::Aplay),
            _ => None,
        }
    }
}

/// Detect which playback program is available
pub async fn detect_player() -> Option<PlayerCommand> {
    for candidate in [PlayerCommand::Afplay, PlayerCommand::SoxPlay, PlayerCommand::Aplay] {
        let found = Command::new("which")
            .arg(candidate.program())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false);
        if found {
            return Some(candidate);
        }
    }
    None
}

/// Plays audio through a system command, via a temporary file
pub struct CommandPlayer {
    command: PlayerCommand,
    client: reqwest::Client,
}

impl CommandPlayer {
    pub fn new(command: PlayerCommand) -> Self {
        Self {
            command,
            client: reqwest::Client::new(),
        }
    }

    pub async fn auto_detect() -> Result<Self, PlaybackError> {
        detect_player()
            .await
            .map(Self::new)
            .ok_or(PlaybackError::Unavailable)
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, PlaybackError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| PlaybackError::Play(format!("failed to fetch audio: {}", e)))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| PlaybackError::Play(format!("failed to read audio: {}", e)))?;
        Ok(bytes.to_vec())
    }

    async fn play_file(&self, path: &Path) -> Result<(), PlaybackError> {
        let program = self.command.program();
        debug!(player = program, path = %path.display(), "playing audio");

        let status = Command::new(program)
            .arg(path)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| PlaybackError::Play(format!("failed to run {}: {}", program, e)))?;

        if !status.success() {
            return Err(PlaybackError::Play(format!(
                "{} exited with status: {}",
                program, status
            )));
        }
        Ok(())
    }
}

/// Removes the temporary audio file when playback ends or is cancelled
struct TempAudio(std::path::PathBuf);

impl Drop for TempAudio {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

#[async_trait::async_trait]
impl AudioPlayer for CommandPlayer {
    async fn play(&self, audio: PlayableAudio) -> Result<(), PlaybackError> {
        let bytes = match &audio {
            PlayableAudio::Url(url) if Path::new(url).exists() => {
                return self.play_file(Path::new(url)).await;
            }
            PlayableAudio::Url(url) => self.fetch(url).await?,
            PlayableAudio::Inline { base64, chunk_ends } => {
                PlayableAudio::decode_inline(base64, chunk_ends)?
            }
        };

        let temp = TempAudio(std::env::temp_dir().join(format!(
            "voice_turns_{}.audio",
            uuid::Uuid::new_v4()
        )));
        tokio::fs::write(&temp.0, &bytes)
            .await
            .map_err(|e| PlaybackError::Play(format!("failed to write temp audio file: {}", e)))?;

        self.play_file(&temp.0).await
    }

    fn name(&self) -> &str {
        self.command.program()
    }
}

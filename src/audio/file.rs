use super::backend::{pcm_to_f32, CaptureBackend, CaptureBuffer, CaptureConfig, CaptureEvent};
use crate::error::CaptureError;
use hound::WavReader;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

/// Replays a 16-bit mono WAV file as if it were the microphone
///
/// Buffers are emitted at the real-time cadence of the configured buffer
/// size; end of file closes the channel (natural stop).
pub struct WavFileBackend {
    path: PathBuf,
    config: CaptureConfig,
    task: Option<JoinHandle<()>>,
}

impl WavFileBackend {
    pub fn new(path: impl Into<PathBuf>, config: CaptureConfig) -> Self {
        Self {
            path: path.into(),
            config,
            task: None,
        }
    }

    fn read_samples(path: &Path, sample_rate: u32) -> Result<Vec<i16>, CaptureError> {
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).map_err(|e| match e {
            hound::Error::IoError(io) if io.kind() == std::io::ErrorKind::NotFound => {
                CaptureError::NoDevice(format!("{}: {}", path.display(), io))
            }
            hound::Error::IoError(io) if io.kind() == std::io::ErrorKind::PermissionDenied => {
                CaptureError::PermissionDenied(format!("{}: {}", path.display(), io))
            }
            other => CaptureError::Stream(format!("failed to open WAV file: {}", other)),
        })?;

        let spec = reader.spec();
        if spec.channels != 1 || spec.sample_rate != sample_rate || spec.bits_per_sample != 16 {
            return Err(CaptureError::Unsupported(format!(
                "expected 16-bit mono {}Hz WAV, got {}-bit {}ch {}Hz",
                sample_rate, spec.bits_per_sample, spec.channels, spec.sample_rate
            )));
        }

        let samples = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CaptureError::Stream(format!("failed to read audio samples: {}", e)))?;

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} samples",
            samples.len() as f64 / sample_rate as f64,
            sample_rate,
            samples.len()
        );

        Ok(samples)
    }
}

#[async_trait::async_trait]
impl CaptureBackend for WavFileBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<CaptureEvent>, CaptureError> {
        self.stop().await;

        let samples = Self::read_samples(&self.path, self.config.sample_rate)?;
        let (tx, rx) = mpsc::channel(32);
        let buffer_samples = self.config.buffer_samples.max(1);
        let sample_rate = self.config.sample_rate;
        let cadence = Duration::from_millis(self.config.buffer_duration_ms().max(1));

        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cadence);
            for chunk in samples.chunks(buffer_samples) {
                ticker.tick().await;
                let buffer = CaptureBuffer {
                    samples: pcm_to_f32(chunk),
                    sample_rate,
                };
                if tx.send(CaptureEvent::Buffer(buffer)).await.is_err() {
                    break;
                }
            }
        }));

        Ok(rx)
    }

    async fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn is_capturing(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn name(&self) -> &str {
        "wav-file"
    }
}

impl Drop for WavFileBackend {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

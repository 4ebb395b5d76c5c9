use crate::error::CaptureError;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Capture buffer of normalized samples in [-1, 1], mono
#[derive(Debug, Clone)]
pub struct CaptureBuffer {
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

/// Events produced by a running capture backend
///
/// The receiver closing without a `Failed` event is a natural stop
/// (end of input).
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    Buffer(CaptureBuffer),
    Failed(CaptureError),
}

/// Configuration for capture backends
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Sample rate in Hz (16kHz for streaming)
    pub sample_rate: u32,
    /// Samples per capture buffer (4096 = 256ms at 16kHz)
    pub buffer_samples: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            buffer_samples: 4096,
        }
    }
}

impl CaptureConfig {
    pub fn buffer_duration_ms(&self) -> u64 {
        (self.buffer_samples as u64 * 1000) / self.sample_rate.max(1) as u64
    }
}

/// Audio capture backend trait
///
/// Implementations:
/// - Command: `arecord` / SoX `rec` piping raw PCM from the microphone
/// - File: replay a WAV file at real-time cadence
#[async_trait::async_trait]
pub trait CaptureBackend: Send {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive capture events
    async fn start(&mut self) -> Result<mpsc::Receiver<CaptureEvent>, CaptureError>;

    /// Stop capturing and release the device. Calling it when idle is a no-op.
    ///
    /// Audio captured before the call, including a partly filled buffer, is
    /// sent on the event channel before this returns.
    async fn stop(&mut self);

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Capture source type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureSource {
    /// Microphone through a system recorder command
    Microphone,
    /// WAV file replay
    File(PathBuf),
}

/// Capture backend factory
pub struct CaptureBackendFactory;

impl CaptureBackendFactory {
    pub async fn create(
        source: CaptureSource,
        config: CaptureConfig,
    ) -> Result<Box<dyn CaptureBackend>, CaptureError> {
        match source {
            CaptureSource::Microphone => {
                let backend = super::command::CommandCaptureBackend::auto_detect(config).await?;
                Ok(Box::new(backend))
            }
            CaptureSource::File(path) => Ok(Box::new(super::file::WavFileBackend::new(path, config))),
        }
    }
}

/// Convert i16 PCM to normalized f32
pub fn pcm_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / 32768.0).collect()
}

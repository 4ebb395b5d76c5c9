use crate::error::{CaptureError, TurnError};
use std::io::Cursor;

/// One streaming frame of 16-bit PCM, mono
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Emission order within the Recording phase, starting at 0
    pub sequence: u64,
}

impl AudioFrame {
    /// Wire representation: little-endian i16 samples, no header
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}

/// Convert one normalized sample to i16
///
/// Negative values scale by 32768 and positive by 32767 so both ends of
/// [-1, 1] map onto the full i16 range.
pub fn float_to_pcm16(sample: f32) -> i16 {
    let s = if sample.is_nan() { 0.0 } else { sample.clamp(-1.0, 1.0) };
    if s < 0.0 {
        (s * 32768.0).round() as i16
    } else {
        (s * 32767.0).round() as i16
    }
}

/// Streaming-mode encoder: one frame per capture callback, never buffered
#[derive(Debug)]
pub struct FrameEncoder {
    sample_rate: u32,
    next_sequence: u64,
}

impl FrameEncoder {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            next_sequence: 0,
        }
    }

    pub fn encode(&mut self, samples: &[f32]) -> AudioFrame {
        let frame = AudioFrame {
            samples: samples.iter().copied().map(float_to_pcm16).collect(),
            sample_rate: self.sample_rate,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;
        frame
    }

    pub fn frames_encoded(&self) -> u64 {
        self.next_sequence
    }
}

/// Encoded audio for one batch turn
#[derive(Debug, Clone)]
pub struct EncodedClip {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
    pub file_name: &'static str,
}

/// Batch-mode encoder: accumulates a whole turn, produces one WAV blob at stop
#[derive(Debug)]
pub struct ClipEncoder {
    sample_rate: u32,
    samples: Vec<i16>,
}

impl ClipEncoder {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            samples: Vec::new(),
        }
    }

    pub fn push(&mut self, samples: &[f32]) {
        self.samples.extend(samples.iter().copied().map(float_to_pcm16));
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Finish the turn; fails with `EmptyCapture` if nothing was captured
    pub fn finish(self) -> Result<EncodedClip, TurnError> {
        if self.samples.is_empty() {
            return Err(TurnError::EmptyCapture);
        }

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let wav_err = |e: hound::Error| TurnError::Capture(CaptureError::Stream(e.to_string()));
        let mut cursor = Cursor::new(Vec::with_capacity(44 + self.samples.len() * 2));
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(wav_err)?;
            for &sample in &self.samples {
                writer.write_sample(sample).map_err(wav_err)?;
            }
            writer.finalize().map_err(wav_err)?;
        }

        Ok(EncodedClip {
            bytes: cursor.into_inner(),
            mime_type: "audio/wav",
            file_name: "agent_chat_audio.wav",
        })
    }
}

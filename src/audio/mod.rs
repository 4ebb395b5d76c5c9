pub mod backend;
pub mod command;
pub mod encoder;
pub mod file;

pub use backend::{
    CaptureBackend, CaptureBackendFactory, CaptureBuffer, CaptureConfig, CaptureEvent,
    CaptureSource,
};
pub use command::{CommandCaptureBackend, RecorderCommand};
pub use encoder::{float_to_pcm16, AudioFrame, ClipEncoder, EncodedClip, FrameEncoder};
pub use file::WavFileBackend;

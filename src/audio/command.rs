// Microphone capture through a system recorder command
//
// `arecord` (ALSA) or SoX `rec` write raw signed 16-bit little-endian mono
// PCM to stdout. The reader task slices stdout into fixed-size buffers and
// forwards them as they fill, so capture latency stays at one buffer. On stop
// the recorder is killed and its remaining output, down to a partly filled
// buffer, is still forwarded.

use super::backend::{pcm_to_f32, CaptureBackend, CaptureBuffer, CaptureConfig, CaptureEvent};
use crate::error::CaptureError;
use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long `stop` waits for the recorder's last output before aborting
const STOP_GRACE: Duration = Duration::from_millis(500);

/// Recorder program used for capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderCommand {
    /// Linux ALSA `arecord`
    Arecord,
    /// SoX `rec`
    SoxRec,
}

impl RecorderCommand {
    pub fn program(&self) -> &'static str {
        match self {
            RecorderCommand::Arecord => "arecord",
            RecorderCommand::SoxRec => "rec",
        }
    }

    pub fn args(&self, sample_rate: u32) -> Vec<String> {
        let rate = sample_rate.to_string();
        match self {
            RecorderCommand::Arecord => vec![
                "-q".into(),
                "-f".into(),
                "S16_LE".into(),
                "-r".into(),
                rate,
                "-c".into(),
                "1".into(),
                "-t".into(),
                "raw".into(),
                "-".into(),
            ],
            RecorderCommand::SoxRec => vec![
                "-q".into(),
                "-t".into(),
                "raw".into(),
                "-b".into(),
                "16".into(),
                "-e".into(),
                "signed-integer".into(),
                "-r".into(),
                rate,
                "-c".into(),
                "1".into(),
                "-".into(),
            ],
        }
    }
}

/// Detect which recorder command is available
pub async fn detect_recorder() -> Option<RecorderCommand> {
    if command_exists("arecord").await {
        return Some(RecorderCommand::Arecord);
    }
    if command_exists("rec").await {
        return Some(RecorderCommand::SoxRec);
    }
    None
}

async fn command_exists(cmd: &str) -> bool {
    Command::new("which")
        .arg(cmd)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

fn classify_spawn_error(program: &str, err: std::io::Error) -> CaptureError {
    match err.kind() {
        ErrorKind::PermissionDenied => {
            CaptureError::PermissionDenied(format!("{}: {}", program, err))
        }
        ErrorKind::NotFound => CaptureError::Unsupported(format!("{} not found", program)),
        _ => CaptureError::Stream(format!("failed to start {}: {}", program, err)),
    }
}

/// Microphone capture backend driving a recorder subprocess
pub struct CommandCaptureBackend {
    recorder: RecorderCommand,
    config: CaptureConfig,
    task: Option<JoinHandle<()>>,
    stop_tx: Option<oneshot::Sender<()>>,
}

impl CommandCaptureBackend {
    pub fn new(recorder: RecorderCommand, config: CaptureConfig) -> Self {
        Self {
            recorder,
            config,
            task: None,
            stop_tx: None,
        }
    }

    /// Create a backend using the first recorder found on PATH
    pub async fn auto_detect(config: CaptureConfig) -> Result<Self, CaptureError> {
        let recorder = detect_recorder().await.ok_or_else(|| {
            CaptureError::Unsupported("neither arecord nor rec is installed".to_string())
        })?;
        info!("Using {} for microphone capture", recorder.program());
        Ok(Self::new(recorder, config))
    }

    async fn pump(
        mut child: Child,
        program: &'static str,
        config: CaptureConfig,
        tx: mpsc::Sender<CaptureEvent>,
        stop_rx: oneshot::Receiver<()>,
    ) {
        let Some(mut stdout) = child.stdout.take() else {
            let _ = tx
                .send(CaptureEvent::Failed(CaptureError::Stream(
                    "recorder stdout unavailable".to_string(),
                )))
                .await;
            return;
        };

        let mut bytes = vec![0u8; config.buffer_samples.max(1) * 2];
        let mut total_bytes = 0usize;
        let mut stop_rx = Some(stop_rx);

        loop {
            let mut filled = 0;
            while filled < bytes.len() {
                let read = match stop_rx.as_mut() {
                    Some(signal) => tokio::select! {
                        read = stdout.read(&mut bytes[filled..]) => Some(read),
                        _ = signal => None,
                    },
                    None => Some(stdout.read(&mut bytes[filled..]).await),
                };
                let Some(read) = read else {
                    // Keep reading: the pipe reaches EOF once the recorder is gone
                    stop_rx = None;
                    if let Err(e) = child.start_kill() {
                        debug!("Failed to kill {}: {}", program, e);
                    }
                    continue;
                };
                match read {
                    Ok(0) => break,
                    Ok(n) => filled += n,
                    Err(e) => {
                        let _ = tx
                            .send(CaptureEvent::Failed(CaptureError::Stream(e.to_string())))
                            .await;
                        return;
                    }
                }
            }

            // Drop a trailing odd byte, it cannot form a sample
            let usable = filled - filled % 2;
            if usable > 0 {
                total_bytes += usable;
                let samples: Vec<i16> = bytes[..usable]
                    .chunks_exact(2)
                    .map(|b| i16::from_le_bytes([b[0], b[1]]))
                    .collect();
                let buffer = CaptureBuffer {
                    samples: pcm_to_f32(&samples),
                    sample_rate: config.sample_rate,
                };
                if tx.send(CaptureEvent::Buffer(buffer)).await.is_err() {
                    debug!("Capture receiver dropped, stopping {}", program);
                    return;
                }
            }

            if filled < bytes.len() {
                break;
            }
        }

        let stopped = stop_rx.is_none();
        match child.wait().await {
            Ok(status) if !status.success() && total_bytes == 0 && !stopped => {
                warn!("{} exited with {} before producing audio", program, status);
                let _ = tx
                    .send(CaptureEvent::Failed(CaptureError::NoDevice(format!(
                        "{} exited with {}",
                        program, status
                    ))))
                    .await;
            }
            Ok(status) => debug!("{} exited with {}", program, status),
            Err(e) => warn!("Failed to wait for {}: {}", program, e),
        }
    }
}

#[async_trait::async_trait]
impl CaptureBackend for CommandCaptureBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<CaptureEvent>, CaptureError> {
        self.stop().await;

        let program = self.recorder.program();
        let child = Command::new(program)
            .args(self.recorder.args(self.config.sample_rate))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| classify_spawn_error(program, e))?;

        info!(
            "Microphone capture started via {} ({}Hz, {} samples per buffer)",
            program, self.config.sample_rate, self.config.buffer_samples
        );

        let (tx, rx) = mpsc::channel(32);
        let (stop_tx, stop_rx) = oneshot::channel();
        self.stop_tx = Some(stop_tx);
        self.task = Some(tokio::spawn(Self::pump(
            child,
            program,
            self.config.clone(),
            tx,
            stop_rx,
        )));

        Ok(rx)
    }

    async fn stop(&mut self) {
        let Some(mut task) = self.task.take() else {
            return;
        };
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        if tokio::time::timeout(STOP_GRACE, &mut task).await.is_err() {
            warn!(
                "{} did not finish within {:?}, aborting capture",
                self.recorder.program(),
                STOP_GRACE
            );
            // Aborting drops the child, which kills the recorder
            task.abort();
        }
        info!("Microphone capture stopped");
    }

    fn is_capturing(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn name(&self) -> &str {
        self.recorder.program()
    }
}

impl Drop for CommandCaptureBackend {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// Test doubles for the session's collaborators
//
// Each fake records what the session asked of it and lets the test drive
// the far side (capture buffers, agent replies, streaming messages).

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use voice_turns::error::{CaptureError, PlaybackError, TransportError};
use voice_turns::transport::{StreamEndpoint, TurnSubmission};
use voice_turns::{
    AudioPlayer, BatchReply, BatchTransport, CaptureBackend, CaptureBuffer, CaptureEvent,
    PlayableAudio, SessionConfig, StreamChannel, StreamingTransport,
};

// ============================================================================
// Capture
// ============================================================================

#[derive(Default)]
struct CaptureShared {
    feed: Mutex<Option<mpsc::Sender<CaptureEvent>>>,
    fail_start: Mutex<Option<CaptureError>>,
    tail: Mutex<Option<Vec<f32>>>,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

/// Capture backend fed by the test through a [`CaptureControl`]
pub struct FakeCapture {
    shared: Arc<CaptureShared>,
    capturing: bool,
}

#[derive(Clone)]
pub struct CaptureControl {
    shared: Arc<CaptureShared>,
}

pub fn fake_capture() -> (FakeCapture, CaptureControl) {
    let shared = Arc::new(CaptureShared::default());
    (
        FakeCapture {
            shared: Arc::clone(&shared),
            capturing: false,
        },
        CaptureControl { shared },
    )
}

impl CaptureControl {
    /// Deliver one buffer as if the device produced it
    pub async fn push(&self, samples: Vec<f32>) -> bool {
        let feed = self.shared.feed.lock().unwrap().clone();
        match feed {
            Some(tx) => tx
                .send(CaptureEvent::Buffer(CaptureBuffer {
                    samples,
                    sample_rate: 16000,
                }))
                .await
                .is_ok(),
            None => false,
        }
    }

    pub async fn fail(&self, error: CaptureError) {
        let feed = self.shared.feed.lock().unwrap().clone();
        if let Some(tx) = feed {
            let _ = tx.send(CaptureEvent::Failed(error)).await;
        }
    }

    /// End of input: close the event channel
    pub fn finish(&self) {
        self.shared.feed.lock().unwrap().take();
    }

    /// Samples the device still holds; they are delivered when capture stops
    pub fn hold_tail(&self, samples: Vec<f32>) {
        *self.shared.tail.lock().unwrap() = Some(samples);
    }

    pub fn fail_next_start(&self, error: CaptureError) {
        *self.shared.fail_start.lock().unwrap() = Some(error);
    }

    pub fn starts(&self) -> usize {
        self.shared.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.shared.stops.load(Ordering::SeqCst)
    }

    pub fn is_live(&self) -> bool {
        self.shared.feed.lock().unwrap().is_some()
    }
}

#[async_trait::async_trait]
impl CaptureBackend for FakeCapture {
    async fn start(&mut self) -> Result<mpsc::Receiver<CaptureEvent>, CaptureError> {
        if let Some(error) = self.shared.fail_start.lock().unwrap().take() {
            return Err(error);
        }
        let (tx, rx) = mpsc::channel(64);
        *self.shared.feed.lock().unwrap() = Some(tx);
        self.shared.starts.fetch_add(1, Ordering::SeqCst);
        self.capturing = true;
        Ok(rx)
    }

    async fn stop(&mut self) {
        if self.capturing {
            self.shared.stops.fetch_add(1, Ordering::SeqCst);
        }
        self.capturing = false;
        let feed = self.shared.feed.lock().unwrap().take();
        let tail = self.shared.tail.lock().unwrap().take();
        if let (Some(tx), Some(samples)) = (feed, tail) {
            let _ = tx
                .send(CaptureEvent::Buffer(CaptureBuffer {
                    samples,
                    sample_rate: 16000,
                }))
                .await;
        }
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "fake-capture"
    }
}

// ============================================================================
// Batch transport
// ============================================================================

/// Batch transport answering from a scripted queue
#[derive(Default)]
pub struct FakeBatch {
    replies: Mutex<VecDeque<Result<BatchReply, TransportError>>>,
    submissions: Mutex<Vec<TurnSubmission>>,
    latency: Mutex<Duration>,
}

impl FakeBatch {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, reply: Result<BatchReply, TransportError>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn submissions(&self) -> Vec<TurnSubmission> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl BatchTransport for FakeBatch {
    async fn submit(&self, submission: &TurnSubmission) -> Result<BatchReply, TransportError> {
        self.submissions.lock().unwrap().push(submission.clone());
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Connect("no scripted reply".to_string())))
    }

    fn endpoint(&self, session_id: &str) -> String {
        format!("fake://agent/chat/{}", session_id)
    }
}

pub fn spoken_reply(query: &str, response: &str, audio_url: &str) -> BatchReply {
    BatchReply {
        query: query.to_string(),
        response: response.to_string(),
        audio_url: Some(audio_url.to_string()),
        ..BatchReply::default()
    }
}

// ============================================================================
// Streaming transport
// ============================================================================

/// Streaming transport handing each opened endpoint to the test
pub struct FakeStreaming {
    endpoints: mpsc::UnboundedSender<StreamEndpoint>,
    opens: AtomicUsize,
}

pub fn fake_streaming() -> (Arc<FakeStreaming>, mpsc::UnboundedReceiver<StreamEndpoint>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        Arc::new(FakeStreaming {
            endpoints: tx,
            opens: AtomicUsize::new(0),
        }),
        rx,
    )
}

impl FakeStreaming {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl StreamingTransport for FakeStreaming {
    async fn open(&self, _session_id: &str) -> Result<StreamChannel, TransportError> {
        let (channel, endpoint) = StreamChannel::pair();
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.endpoints
            .send(endpoint)
            .map_err(|_| TransportError::Connect("test dropped endpoints".to_string()))?;
        Ok(channel)
    }

    fn name(&self) -> &str {
        "fake-streaming"
    }
}

// ============================================================================
// Player
// ============================================================================

/// Player that "plays" for a fixed duration
#[derive(Default)]
pub struct FakePlayer {
    played: Mutex<Vec<PlayableAudio>>,
    duration: Mutex<Duration>,
    failure: Mutex<Option<PlaybackError>>,
}

impl FakePlayer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_duration(&self, duration: Duration) {
        *self.duration.lock().unwrap() = duration;
    }

    pub fn fail_with(&self, error: PlaybackError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    pub fn played(&self) -> Vec<PlayableAudio> {
        self.played.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl AudioPlayer for FakePlayer {
    async fn play(&self, audio: PlayableAudio) -> Result<(), PlaybackError> {
        self.played.lock().unwrap().push(audio);
        let duration = *self.duration.lock().unwrap();
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
        match self.failure.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "fake-player"
    }
}

// ============================================================================
// Helpers
// ============================================================================

pub fn test_config() -> SessionConfig {
    SessionConfig {
        session_id: "conversation-test".to_string(),
        auto_resume: false,
        ..SessionConfig::default()
    }
}

pub fn tone(len: usize) -> Vec<f32> {
    (0..len).map(|i| if i % 2 == 0 { 0.25 } else { -0.25 }).collect()
}

/// Let the session loop drain everything that is ready
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

// Conversation sessions over the streaming transport, driven with fakes

mod common;

use anyhow::{Context, Result};
use common::*;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use voice_turns::error::TransportError;
use voice_turns::transport::{ChannelEvent, StreamEndpoint};
use voice_turns::{
    InboundMessage, Notice, PlayableAudio, Session, SessionConfig, SessionHandle, SessionParts,
    SessionState, Speaker, Transport,
};

struct Harness {
    handle: SessionHandle,
    capture: CaptureControl,
    endpoints: mpsc::UnboundedReceiver<StreamEndpoint>,
    player: std::sync::Arc<FakePlayer>,
}

fn start_session(config: SessionConfig) -> Harness {
    let (capture, control) = fake_capture();
    let (streaming, endpoints) = fake_streaming();
    let player = FakePlayer::new();
    let (handle, _task) = Session::spawn(
        config,
        SessionParts {
            capture: Box::new(capture),
            transport: Transport::Streaming(streaming),
            player: player.clone(),
        },
    );
    Harness {
        handle,
        capture: control,
        endpoints,
        player,
    }
}

impl Harness {
    /// Start a turn and return the server side of its channel
    async fn begin(&mut self) -> Result<StreamEndpoint> {
        self.handle.start_turn()?;
        self.handle
            .wait_for(|s| s.state == SessionState::Recording)
            .await?;
        self.endpoints.recv().await.context("no channel opened")
    }
}

fn send(endpoint: &StreamEndpoint, message: InboundMessage) {
    endpoint
        .events
        .send(ChannelEvent::Message(message))
        .expect("session dropped the channel");
}

#[tokio::test(start_paused = true)]
async fn test_frames_reach_transport_in_capture_order() -> Result<()> {
    let mut h = start_session(test_config());
    let mut endpoint = h.begin().await?;

    for level in [0.1f32, 0.2, 0.3] {
        assert!(h.capture.push(vec![level; 4096]).await);
    }
    h.handle.stop_turn()?;

    let mut frames = Vec::new();
    while let Some(frame) = endpoint.frames.recv().await {
        frames.push(frame);
    }

    let sequences: Vec<u64> = frames.iter().map(|f| f.sequence).collect();
    assert_eq!(sequences, vec![0, 1, 2]);
    assert_eq!(frames[0].samples[0], 3277);
    assert_eq!(frames[2].samples[0], 9830);
    assert!(frames.iter().all(|f| f.samples.len() == 4096));

    let snapshot = h.handle.snapshot();
    assert_eq!(snapshot.state, SessionState::AwaitingResponse);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_samples_held_at_stop_are_sent_as_final_frame() -> Result<()> {
    let mut h = start_session(test_config());
    let mut endpoint = h.begin().await?;

    assert!(h.capture.push(tone(4096)).await);
    h.capture.hold_tail(vec![0.5; 1000]);
    h.handle.stop_turn()?;

    let mut frames = Vec::new();
    while let Some(frame) = endpoint.frames.recv().await {
        frames.push(frame);
    }
    let lengths: Vec<usize> = frames.iter().map(|f| f.samples.len()).collect();
    assert_eq!(lengths, vec![4096, 1000]);
    assert_eq!(frames[1].sequence, 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_audio_chunks_are_played_once_in_order() -> Result<()> {
    let mut h = start_session(test_config());
    let mut notices = h.handle.subscribe();
    let mut endpoint = h.begin().await?;

    assert!(h.capture.push(tone(4096)).await);
    h.handle.stop_turn()?;
    h.handle
        .wait_for(|s| s.state == SessionState::AwaitingResponse)
        .await?;

    send(&endpoint, InboundMessage::PartialTranscript { text: "what".into() });
    send(
        &endpoint,
        InboundMessage::FinalTranscript {
            text: "what time is it".into(),
            turn_order: 1,
        },
    );
    send(&endpoint, InboundMessage::AudioChunk { data: "AAA".into(), size: 3 });
    send(&endpoint, InboundMessage::AudioChunk { data: "BBB".into(), size: 3 });
    send(&endpoint, InboundMessage::AudioComplete { total_chunks: 2 });

    let snapshot = h
        .handle
        .wait_for(|s| s.state == SessionState::Idle && s.history.len() == 1)
        .await?;

    assert_eq!(
        h.player.played(),
        vec![PlayableAudio::Inline {
            base64: "AAABBB".to_string(),
            chunk_ends: vec![3, 6],
        }]
    );
    assert_eq!(snapshot.history[0].speaker, Speaker::User);
    assert_eq!(snapshot.history[0].text, "what time is it");
    assert_eq!(snapshot.partial, None);

    // The channel is torn down once the response arrived
    assert!(endpoint.shutdown.try_recv().is_ok());

    let mut partials = Vec::new();
    while let Ok(notice) = notices.try_recv() {
        if let Notice::Partial(text) = notice {
            partials.push(text);
        }
    }
    assert_eq!(partials, vec!["what".to_string()]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_separately_padded_chunks_play_as_one_clip() -> Result<()> {
    let mut h = start_session(test_config());
    let endpoint = h.begin().await?;

    h.handle.stop_turn()?;
    h.handle
        .wait_for(|s| s.state == SessionState::AwaitingResponse)
        .await?;
    send(&endpoint, InboundMessage::AudioChunk { data: "UklGRjE=".into(), size: 5 });
    send(&endpoint, InboundMessage::AudioChunk { data: "V0FWRWRhdGE=".into(), size: 8 });
    send(&endpoint, InboundMessage::AudioComplete { total_chunks: 2 });

    let snapshot = h
        .handle
        .wait_for(|s| s.state == SessionState::Idle && h.player.played().len() == 1)
        .await?;
    assert_eq!(snapshot.last_error, None);

    let played = h.player.played();
    let PlayableAudio::Inline { base64, chunk_ends } = &played[0] else {
        panic!("expected inline audio, got {:?}", played[0]);
    };
    assert_eq!(
        PlayableAudio::decode_inline(base64, chunk_ends)?,
        b"RIFF1WAVEdata".to_vec()
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_partials_never_enter_history() -> Result<()> {
    let mut h = start_session(test_config());
    let endpoint = h.begin().await?;

    send(&endpoint, InboundMessage::PartialTranscript { text: "hel".into() });
    send(&endpoint, InboundMessage::PartialTranscript { text: "hello th".into() });
    let snapshot = h
        .handle
        .wait_for(|s| s.partial.as_deref() == Some("hello th"))
        .await?;
    assert!(snapshot.history.is_empty());

    send(
        &endpoint,
        InboundMessage::FinalTranscript {
            text: "hello there".into(),
            turn_order: 1,
        },
    );
    send(
        &endpoint,
        InboundMessage::TurnComplete {
            text: "hello there".into(),
            turn_order: 1,
        },
    );
    let snapshot = h
        .handle
        .wait_for(|s| s.state == SessionState::AwaitingResponse)
        .await?;

    let texts: Vec<&str> = snapshot.history.iter().map(|t| t.text.as_str()).collect();
    assert_eq!(texts, vec!["hello there"]);
    assert_eq!(snapshot.partial, None);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_turn_complete_ends_utterance_and_drops_later_frames() -> Result<()> {
    let mut h = start_session(test_config());
    let mut endpoint = h.begin().await?;

    assert!(h.capture.push(tone(4096)).await);
    settle().await;
    send(
        &endpoint,
        InboundMessage::TurnComplete {
            text: "stop here".into(),
            turn_order: 1,
        },
    );
    h.handle
        .wait_for(|s| s.state == SessionState::AwaitingResponse)
        .await?;

    // Capture is released; nothing more can be pushed
    assert!(!h.capture.push(tone(4096)).await);

    let mut frames = 0;
    while endpoint.frames.recv().await.is_some() {
        frames += 1;
    }
    assert_eq!(frames, 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_unknown_messages_are_ignored() -> Result<()> {
    let mut h = start_session(test_config());
    let endpoint = h.begin().await?;

    send(&endpoint, InboundMessage::Unknown { tag: "vad_event".into() });
    settle().await;

    let snapshot = h.handle.snapshot();
    assert_eq!(snapshot.state, SessionState::Recording);
    assert!(snapshot.history.is_empty());
    assert_eq!(snapshot.last_error, None);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_missing_response_times_out() -> Result<()> {
    let mut config = test_config();
    config.response_timeout = Duration::from_secs(2);
    let mut h = start_session(config);
    let _endpoint = h.begin().await?;

    h.handle.stop_turn()?;
    h.handle
        .wait_for(|s| s.state == SessionState::AwaitingResponse)
        .await?;
    let waiting_since = Instant::now();

    let snapshot = h.handle.wait_for(|s| s.last_error.is_some()).await?;
    assert!(waiting_since.elapsed() >= Duration::from_secs(2));
    assert_eq!(snapshot.state, SessionState::Idle);
    assert_eq!(
        snapshot.last_error.as_deref(),
        Some("The agent took too long to respond.")
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_dropped_channel_ends_turn() -> Result<()> {
    let mut h = start_session(test_config());
    let endpoint = h.begin().await?;

    endpoint
        .events
        .send(ChannelEvent::Failed(TransportError::Channel(
            "connection reset".into(),
        )))
        .expect("session dropped the channel");

    let snapshot = h.handle.wait_for(|s| s.last_error.is_some()).await?;
    assert_eq!(snapshot.state, SessionState::Idle);
    assert_eq!(
        snapshot.last_error.as_deref(),
        Some("The connection to the agent was interrupted.")
    );
    assert!(!h.capture.is_live());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_complete_without_chunks_is_no_audio() -> Result<()> {
    let mut h = start_session(test_config());
    let endpoint = h.begin().await?;

    h.handle.stop_turn()?;
    h.handle
        .wait_for(|s| s.state == SessionState::AwaitingResponse)
        .await?;
    send(&endpoint, InboundMessage::AudioComplete { total_chunks: 0 });

    let snapshot = h.handle.wait_for(|s| s.last_error.is_some()).await?;
    assert_eq!(snapshot.state, SessionState::Idle);
    assert_eq!(
        snapshot.last_error.as_deref(),
        Some("No audio response received.")
    );
    assert!(h.player.played().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_each_turn_opens_a_fresh_channel() -> Result<()> {
    let mut config = test_config();
    config.auto_resume = true;
    let mut h = start_session(config);
    let endpoint = h.begin().await?;

    h.handle.stop_turn()?;
    h.handle
        .wait_for(|s| s.state == SessionState::AwaitingResponse)
        .await?;
    send(&endpoint, InboundMessage::AudioChunk { data: "AAAA".into(), size: 3 });
    send(&endpoint, InboundMessage::AudioComplete { total_chunks: 1 });

    // Playback ends, capture resumes on a new channel
    let second = h.endpoints.recv().await.context("no second channel")?;
    let snapshot = h
        .handle
        .wait_for(|s| s.state == SessionState::Recording && s.turn_index == 2)
        .await?;
    assert_eq!(snapshot.turn_index, 2);
    drop(second);
    Ok(())
}

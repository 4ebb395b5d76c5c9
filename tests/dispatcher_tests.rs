// Dispatcher: inbound messages and batch replies into history and directives

use voice_turns::error::TurnError;
use voice_turns::playback::AgentResponse;
use voice_turns::session::{Directive, Dispatcher, HistoryStore};
use voice_turns::{BatchReply, InboundMessage, PlayableAudio, Speaker};

fn chunk(data: &str) -> InboundMessage {
    InboundMessage::AudioChunk {
        data: data.to_string(),
        size: data.len(),
    }
}

#[test]
fn test_chunks_concatenate_in_arrival_order() {
    let mut dispatcher = Dispatcher::new();
    let mut history = HistoryStore::new();
    dispatcher.begin_turn(1);

    assert_eq!(dispatcher.dispatch(chunk("AAA"), &mut history), Directive::Continue);
    assert_eq!(dispatcher.dispatch(chunk("BBB"), &mut history), Directive::Continue);
    assert_eq!(dispatcher.buffered_chunks(), 2);

    let directive = dispatcher.dispatch(
        InboundMessage::AudioComplete { total_chunks: 2 },
        &mut history,
    );
    assert_eq!(
        directive,
        Directive::Play(AgentResponse::new(PlayableAudio::Inline {
            base64: "AAABBB".to_string(),
            chunk_ends: vec![3, 6],
        }))
    );

    // The buffer is released: a second completion has nothing to play
    assert_eq!(dispatcher.buffered_chunks(), 0);
    assert_eq!(
        dispatcher.dispatch(
            InboundMessage::AudioComplete { total_chunks: 2 },
            &mut history
        ),
        Directive::Fail(TurnError::NoAudioResponse)
    );
}

#[test]
fn test_separately_padded_chunks_decode_to_joined_bytes() {
    let mut dispatcher = Dispatcher::new();
    let mut history = HistoryStore::new();
    dispatcher.begin_turn(1);

    // base64("RIFF1") and base64("WAVEdata"), each carrying its own padding
    dispatcher.dispatch(chunk("UklGRjE="), &mut history);
    dispatcher.dispatch(chunk("V0FWRWRhdGE="), &mut history);

    let directive = dispatcher.dispatch(
        InboundMessage::AudioComplete { total_chunks: 2 },
        &mut history,
    );
    let Directive::Play(response) = directive else {
        panic!("expected Play, got {:?}", directive);
    };
    let PlayableAudio::Inline { base64, chunk_ends } = response.audio else {
        panic!("expected inline audio");
    };
    assert_eq!(base64, "UklGRjE=V0FWRWRhdGE=");
    assert_eq!(
        PlayableAudio::decode_inline(&base64, &chunk_ends).unwrap(),
        b"RIFF1WAVEdata".to_vec()
    );
}

#[test]
fn test_chunk_count_mismatch_still_plays() {
    let mut dispatcher = Dispatcher::new();
    let mut history = HistoryStore::new();
    dispatcher.begin_turn(1);

    dispatcher.dispatch(chunk("AAA"), &mut history);
    let directive = dispatcher.dispatch(
        InboundMessage::AudioComplete { total_chunks: 5 },
        &mut history,
    );
    assert!(matches!(directive, Directive::Play(_)));
}

#[test]
fn test_partial_transcripts_stay_out_of_history() {
    let mut dispatcher = Dispatcher::new();
    let mut history = HistoryStore::new();
    dispatcher.begin_turn(1);

    dispatcher.dispatch(
        InboundMessage::PartialTranscript { text: "good".into() },
        &mut history,
    );
    assert_eq!(dispatcher.partial(), Some("good"));
    assert!(history.is_empty());

    dispatcher.dispatch(
        InboundMessage::FinalTranscript {
            text: "good morning".into(),
            turn_order: 1,
        },
        &mut history,
    );
    assert_eq!(dispatcher.partial(), None);
    assert_eq!(history.len(), 1);
    assert_eq!(history.turns()[0].text, "good morning");
}

#[test]
fn test_turn_complete_signals_end_of_utterance_once_recorded() {
    let mut dispatcher = Dispatcher::new();
    let mut history = HistoryStore::new();
    dispatcher.begin_turn(1);

    dispatcher.dispatch(
        InboundMessage::FinalTranscript {
            text: "book a table".into(),
            turn_order: 3,
        },
        &mut history,
    );
    let directive = dispatcher.dispatch(
        InboundMessage::TurnComplete {
            text: "book a table".into(),
            turn_order: 3,
        },
        &mut history,
    );

    assert_eq!(directive, Directive::EndOfUtterance);
    assert_eq!(history.len(), 1, "same utterance is recorded once");
}

#[test]
fn test_distinct_finals_append_in_order() {
    let mut dispatcher = Dispatcher::new();
    let mut history = HistoryStore::new();
    dispatcher.begin_turn(1);

    for (order, text) in [(1, "first"), (2, "second")] {
        dispatcher.dispatch(
            InboundMessage::FinalTranscript {
                text: text.into(),
                turn_order: order,
            },
            &mut history,
        );
        dispatcher.dispatch(
            InboundMessage::PartialTranscript { text: "noise".into() },
            &mut history,
        );
    }

    let texts: Vec<&str> = history.turns().iter().map(|t| t.text.as_str()).collect();
    assert_eq!(texts, vec!["first", "second"]);
    assert!(history.turns().iter().all(|t| t.speaker == Speaker::User));
}

#[test]
fn test_unknown_message_changes_nothing() {
    let mut dispatcher = Dispatcher::new();
    let mut history = HistoryStore::new();
    dispatcher.begin_turn(1);

    let directive = dispatcher.dispatch(
        InboundMessage::Unknown {
            tag: "speech_started".into(),
        },
        &mut history,
    );
    assert_eq!(directive, Directive::Continue);
    assert!(history.is_empty());
    assert_eq!(dispatcher.partial(), None);
}

#[test]
fn test_abandoned_turn_drops_buffered_audio() {
    let mut dispatcher = Dispatcher::new();
    let mut history = HistoryStore::new();
    dispatcher.begin_turn(1);

    dispatcher.dispatch(chunk("AAA"), &mut history);
    dispatcher.abandon_turn();
    assert_eq!(dispatcher.buffered_chunks(), 0);
}

#[test]
fn test_batch_reply_appends_query_and_defers_agent_text() {
    let mut dispatcher = Dispatcher::new();
    let mut history = HistoryStore::new();
    dispatcher.begin_turn(1);

    let directive = dispatcher.dispatch_reply(
        BatchReply {
            query: "what's the weather".into(),
            response: "Sunny.".into(),
            audio_url: Some("http://agent/audio/7.wav".into()),
            ..BatchReply::default()
        },
        &mut history,
    );

    assert_eq!(history.len(), 1);
    assert_eq!(history.turns()[0].speaker, Speaker::User);
    match directive {
        Directive::Play(response) => {
            assert_eq!(
                response.audio,
                PlayableAudio::Url("http://agent/audio/7.wav".into())
            );
            assert_eq!(response.agent_text.as_deref(), Some("Sunny."));
            assert!(response.resumes_capture());
        }
        other => panic!("expected Play, got {:?}", other),
    }
}

#[test]
fn test_batch_error_reply() {
    let mut dispatcher = Dispatcher::new();
    let mut history = HistoryStore::new();
    dispatcher.begin_turn(1);

    let spoken = dispatcher.dispatch_reply(
        BatchReply {
            error: Some("rate_limited".into()),
            message: Some("Slow down.".into()),
            audio_url: Some("http://agent/audio/err.wav".into()),
            ..BatchReply::default()
        },
        &mut history,
    );
    match spoken {
        Directive::Play(response) => {
            assert_eq!(response.error_message.as_deref(), Some("Slow down."));
            assert_eq!(response.agent_text, None);
            assert!(!response.resumes_capture());
        }
        other => panic!("expected Play, got {:?}", other),
    }

    let silent = dispatcher.dispatch_reply(
        BatchReply {
            error: Some("internal".into()),
            ..BatchReply::default()
        },
        &mut history,
    );
    assert!(matches!(silent, Directive::Fail(TurnError::Server { .. })));
    assert!(history.is_empty());
}

use super::config::SessionConfig;
use super::dispatcher::{Directive, Dispatcher};
use super::handle::{Command, Notice, SessionHandle, SessionSnapshot};
use super::history::HistoryStore;
use super::state::SessionState;
use super::timer::SessionTimer;
use crate::audio::{CaptureBackend, CaptureBuffer, CaptureEvent, ClipEncoder, FrameEncoder};
use crate::error::{TransportError, TurnError};
use crate::playback::{AfterPlayback, AgentResponse, AudioPlayer, PlaybackController, PlaybackOutcome};
use crate::transport::{
    BatchReply, ChannelEvent, RetryableRequest, StreamChannel, Transport, TurnSubmission,
};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Collaborators a session drives
pub struct SessionParts {
    pub capture: Box<dyn CaptureBackend>,
    pub transport: Transport,
    pub player: Arc<dyn AudioPlayer>,
}

/// Batch submission in flight for one turn
struct InFlight {
    turn: u64,
    task: JoinHandle<Result<BatchReply, TransportError>>,
}

/// One reaction's worth of input
enum Event {
    Command(Option<Command>),
    Capture(Option<CaptureEvent>),
    Channel(Option<ChannelEvent>),
    BatchDone {
        turn: u64,
        result: Result<BatchReply, TurnError>,
    },
    PlaybackDone(PlaybackOutcome),
    ResumeDue,
    ResponseTimeout,
}

/// A turn-based voice conversation with the remote agent
///
/// The session exclusively owns the capture backend, the live transport,
/// playback and the history. It runs as a single task: each event is fully
/// handled before the next one is polled, so no field needs a lock. Outside
/// code interacts only through a [`SessionHandle`].
pub struct Session {
    config: SessionConfig,
    state: SessionState,
    turn_index: u64,

    capture: Box<dyn CaptureBackend>,
    capture_rx: Option<mpsc::Receiver<CaptureEvent>>,

    transport: Transport,
    /// Live streaming channel (streaming mode)
    stream: Option<StreamChannel>,
    frame_encoder: FrameEncoder,
    /// Turn audio being accumulated (batch mode)
    clip: Option<ClipEncoder>,
    in_flight: Option<InFlight>,

    dispatcher: Dispatcher,
    history: HistoryStore,
    playback: PlaybackController,

    resume_timer: SessionTimer,
    response_timer: SessionTimer,

    last_error: Option<String>,
    announced_turns: usize,
    announced_partial: Option<String>,
    /// History revision last copied into the snapshot
    published_history: u64,

    commands: mpsc::UnboundedReceiver<Command>,
    snapshot: watch::Sender<SessionSnapshot>,
    notices: broadcast::Sender<Notice>,
}

impl Session {
    /// Create a session and the handle used to drive it
    pub fn new(config: SessionConfig, parts: SessionParts) -> (Self, SessionHandle) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::new(&config.session_id));
        let (notice_tx, _) = broadcast::channel(256);

        let handle = SessionHandle::new(command_tx, snapshot_rx, notice_tx.clone());
        let session = Self {
            frame_encoder: FrameEncoder::new(config.sample_rate),
            config,
            state: SessionState::Idle,
            turn_index: 0,
            capture: parts.capture,
            capture_rx: None,
            transport: parts.transport,
            stream: None,
            clip: None,
            in_flight: None,
            dispatcher: Dispatcher::new(),
            history: HistoryStore::new(),
            playback: PlaybackController::new(parts.player),
            resume_timer: SessionTimer::new(),
            response_timer: SessionTimer::new(),
            last_error: None,
            announced_turns: 0,
            announced_partial: None,
            published_history: 0,
            commands: command_rx,
            snapshot: snapshot_tx,
            notices: notice_tx,
        };

        (session, handle)
    }

    /// Create a session and run it on its own task
    pub fn spawn(config: SessionConfig, parts: SessionParts) -> (SessionHandle, JoinHandle<Result<()>>) {
        let (session, handle) = Self::new(config, parts);
        (handle, tokio::spawn(session.run()))
    }

    /// Run the event loop until shutdown or until every handle is dropped
    pub async fn run(mut self) -> Result<()> {
        info!(
            "Starting conversation session: {} ({} transport)",
            self.config.session_id,
            self.transport.mode()
        );
        self.publish();

        loop {
            // Commands first so a stop wins over anything else ready
            let event = tokio::select! {
                biased;
                command = self.commands.recv() => Event::Command(command),
                event = next_capture(&mut self.capture_rx) => Event::Capture(event),
                event = next_channel(&mut self.stream) => Event::Channel(event),
                (turn, result) = batch_done(&mut self.in_flight) => Event::BatchDone { turn, result },
                outcome = self.playback.finished() => Event::PlaybackDone(outcome),
                _ = self.resume_timer.fired() => Event::ResumeDue,
                _ = self.response_timer.fired() => Event::ResponseTimeout,
            };

            let keep_running = self.handle(event).await;
            self.publish();
            if !keep_running {
                break;
            }
        }

        self.release_turn().await;
        self.set_state(SessionState::Idle);
        self.publish();
        info!("Conversation session ended: {}", self.config.session_id);
        Ok(())
    }

    async fn handle(&mut self, event: Event) -> bool {
        match event {
            Event::Command(None) | Event::Command(Some(Command::Shutdown)) => {
                info!("Session shutdown requested");
                return false;
            }
            Event::Command(Some(Command::StartTurn)) => self.start_turn().await,
            Event::Command(Some(Command::StopTurn)) => self.stop_turn().await,
            Event::Command(Some(Command::StopConversation)) => self.stop_conversation().await,
            Event::Capture(event) => self.on_capture(event).await,
            Event::Channel(event) => self.on_channel(event).await,
            Event::BatchDone { turn, result } => self.on_batch_done(turn, result).await,
            Event::PlaybackDone(outcome) => self.on_playback_done(outcome).await,
            Event::ResumeDue => {
                if self.state == SessionState::Idle {
                    info!("Resuming capture for the next turn");
                    self.start_turn().await;
                }
            }
            Event::ResponseTimeout => {
                if self.state == SessionState::AwaitingResponse {
                    self.fail_turn(TurnError::ResponseTimeout).await;
                }
            }
        }
        true
    }

    async fn start_turn(&mut self) {
        if self.state != SessionState::Idle {
            debug!("Ignoring start-turn while {}", self.state);
            return;
        }

        self.resume_timer.cancel();
        self.turn_index += 1;
        self.dispatcher.begin_turn(self.turn_index);
        self.last_error = None;
        self.set_state(SessionState::Recording);

        match &self.transport {
            Transport::Streaming(transport) => {
                let transport = Arc::clone(transport);
                match transport.open(&self.config.session_id).await {
                    Ok(channel) => {
                        self.stream = Some(channel);
                        self.frame_encoder = FrameEncoder::new(self.config.sample_rate);
                    }
                    Err(e) => {
                        self.fail_turn(e.into()).await;
                        return;
                    }
                }
            }
            Transport::Batch(_) => {
                self.clip = Some(ClipEncoder::new(self.config.sample_rate));
            }
        }

        match self.capture.start().await {
            Ok(rx) => {
                info!("Turn {} recording via {}", self.turn_index, self.capture.name());
                self.capture_rx = Some(rx);
            }
            Err(e) => self.fail_turn(e.into()).await,
        }
    }

    async fn stop_turn(&mut self) {
        if self.state == SessionState::Recording {
            self.finish_recording().await;
        } else {
            debug!("Ignoring stop-turn while {}", self.state);
        }
    }

    async fn stop_conversation(&mut self) {
        info!("Stopping conversation {}", self.config.session_id);
        self.release_turn().await;
        self.history.clear();
        self.announced_turns = 0;
        self.last_error = None;
        self.set_state(SessionState::Idle);
        self.notify(Notice::ConversationStopped);
    }

    async fn on_capture(&mut self, event: Option<CaptureEvent>) {
        match event {
            Some(CaptureEvent::Buffer(buffer)) => self.consume_buffer(buffer),
            Some(CaptureEvent::Failed(e)) => {
                if self.state == SessionState::Recording {
                    self.fail_turn(e.into()).await;
                }
            }
            None => {
                // Backend finished on its own: natural stop
                self.capture_rx = None;
                if self.state == SessionState::Recording {
                    info!("Capture ended for turn {}", self.turn_index);
                    self.finish_recording().await;
                }
            }
        }
    }

    fn consume_buffer(&mut self, buffer: CaptureBuffer) {
        if self.state != SessionState::Recording {
            debug!("Dropping capture buffer while {}", self.state);
            return;
        }

        if let Some(stream) = self.stream.as_mut() {
            let frame = self.frame_encoder.encode(&buffer.samples);
            stream.send_frame(frame);
        } else if let Some(clip) = self.clip.as_mut() {
            clip.push(&buffer.samples);
        }
    }

    /// Leave Recording: every way out of an utterance ends up here
    async fn finish_recording(&mut self) {
        if self.state != SessionState::Recording {
            return;
        }

        // Flush what the backend already captured, then release the device
        self.capture.stop().await;
        if let Some(mut rx) = self.capture_rx.take() {
            while let Ok(event) = rx.try_recv() {
                if let CaptureEvent::Buffer(buffer) = event {
                    self.consume_buffer(buffer);
                }
            }
        }

        match &self.transport {
            Transport::Streaming(_) => {
                if let Some(stream) = self.stream.as_mut() {
                    stream.close_outbound();
                    info!(
                        "Turn {} utterance sent ({} frames)",
                        self.turn_index,
                        stream.frames_sent()
                    );
                }
                self.set_state(SessionState::AwaitingResponse);
                self.response_timer.arm(self.config.response_timeout);
            }
            Transport::Batch(transport) => {
                let transport = Arc::clone(transport);
                let clip = match self.clip.take() {
                    Some(encoder) => encoder.finish(),
                    None => Err(TurnError::EmptyCapture),
                };
                match clip {
                    Ok(clip) => {
                        let submission = TurnSubmission {
                            session_id: self.config.session_id.clone(),
                            turn_index: self.turn_index,
                            clip,
                        };
                        let request =
                            RetryableRequest::new(transport, submission, self.config.retry_policy());
                        self.in_flight = Some(InFlight {
                            turn: self.turn_index,
                            task: tokio::spawn(request.execute()),
                        });
                        self.set_state(SessionState::AwaitingResponse);
                    }
                    Err(e) => self.fail_turn(e).await,
                }
            }
        }
    }

    async fn on_channel(&mut self, event: Option<ChannelEvent>) {
        match event {
            Some(ChannelEvent::Message(message)) => {
                let directive = self.dispatcher.dispatch(message, &mut self.history);
                self.apply(directive).await;
            }
            Some(ChannelEvent::Failed(e)) => {
                self.close_stream();
                if matches!(
                    self.state,
                    SessionState::Recording | SessionState::AwaitingResponse
                ) {
                    self.fail_turn(e.into()).await;
                }
            }
            Some(ChannelEvent::Closed) | None => {
                self.close_stream();
                if matches!(
                    self.state,
                    SessionState::Recording | SessionState::AwaitingResponse
                ) {
                    let error = TransportError::Channel("streaming channel closed".to_string());
                    self.fail_turn(error.into()).await;
                }
            }
        }
    }

    async fn on_batch_done(&mut self, turn: u64, result: Result<BatchReply, TurnError>) {
        if turn != self.turn_index || self.state != SessionState::AwaitingResponse {
            info!(
                "Discarding reply for turn {} (now turn {}, {})",
                turn, self.turn_index, self.state
            );
            return;
        }

        match result {
            Ok(reply) => {
                let directive = self.dispatcher.dispatch_reply(reply, &mut self.history);
                self.apply(directive).await;
            }
            Err(e) => self.fail_turn(e).await,
        }
    }

    async fn apply(&mut self, directive: Directive) {
        match directive {
            Directive::Continue => {}
            Directive::EndOfUtterance => {
                if self.state == SessionState::Recording {
                    info!("Server detected end of utterance for turn {}", self.turn_index);
                    self.finish_recording().await;
                }
            }
            Directive::Play(response) => {
                if self.state == SessionState::Recording {
                    self.finish_recording().await;
                }
                if self.state == SessionState::AwaitingResponse {
                    self.start_speaking(response);
                } else {
                    debug!("Discarding agent audio while {}", self.state);
                }
            }
            Directive::Fail(error) => {
                if matches!(
                    self.state,
                    SessionState::Recording | SessionState::AwaitingResponse
                ) {
                    self.fail_turn(error).await;
                }
            }
        }
    }

    fn start_speaking(&mut self, response: AgentResponse) {
        self.response_timer.cancel();
        self.close_stream();
        if let Some(message) = &response.error_message {
            self.surface_error(message.clone());
        }
        self.set_state(SessionState::Speaking);
        self.playback.start(self.turn_index, response);
    }

    async fn on_playback_done(&mut self, outcome: PlaybackOutcome) {
        if self.state != SessionState::Speaking || outcome.turn != self.turn_index {
            debug!("Ignoring stale playback result for turn {}", outcome.turn);
            return;
        }

        match self.playback.settle(outcome, &mut self.history) {
            Ok(after) => {
                self.set_state(SessionState::Idle);
                if after == AfterPlayback::Resume && self.config.auto_resume {
                    debug!("Next turn in {:?}", self.config.resume_delay);
                    self.resume_timer.arm(self.config.resume_delay);
                }
            }
            Err(e) => {
                self.resume_timer.cancel();
                self.fail_turn(e.into()).await;
            }
        }
    }

    /// Abandon the current turn: release everything, pass through Error
    async fn fail_turn(&mut self, error: TurnError) {
        warn!(
            turn = self.turn_index,
            state = %self.state,
            "Turn failed: {}",
            error
        );
        self.release_turn().await;
        self.set_state(SessionState::Error);
        self.surface_error(error.user_message());
        self.set_state(SessionState::Idle);
    }

    /// Release every per-turn resource; safe to call in any state
    async fn release_turn(&mut self) {
        self.resume_timer.cancel();
        self.response_timer.cancel();

        self.capture.stop().await;
        self.capture_rx = None;
        self.clip = None;

        self.close_stream();

        if let Some(in_flight) = self.in_flight.take() {
            // Detached, not aborted: the request may finish, its reply is dropped
            debug!("Detaching in-flight submission for turn {}", in_flight.turn);
        }

        self.playback.stop();
        self.dispatcher.abandon_turn();
    }

    fn close_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if stream.close() {
                debug!(
                    "Streaming channel closed ({} frames sent, {} dropped)",
                    stream.frames_sent(),
                    stream.frames_dropped()
                );
            }
        }
    }

    fn set_state(&mut self, next: SessionState) {
        if self.state == next {
            return;
        }
        if !self.state.permits(next) {
            warn!("Unexpected transition {} -> {}", self.state, next);
        }
        info!(turn = self.turn_index, "Session state: {} -> {}", self.state, next);
        self.state = next;
        self.notify(Notice::StateChanged(next));
    }

    fn surface_error(&mut self, message: String) {
        self.last_error = Some(message.clone());
        self.notify(Notice::Error(message));
    }

    fn notify(&self, notice: Notice) {
        // No subscribers is fine
        let _ = self.notices.send(notice);
    }

    /// Announce new history entries and partial text, refresh the snapshot
    /// when anything it shows changed
    fn publish(&mut self) {
        let turns = self.history.turns();
        if turns.len() > self.announced_turns {
            for turn in &turns[self.announced_turns..] {
                self.notify(Notice::TurnAppended(turn.clone()));
            }
        }
        self.announced_turns = turns.len();

        let partial = self.dispatcher.partial().map(str::to_string);
        if partial != self.announced_partial {
            if let Some(text) = &partial {
                self.notify(Notice::Partial(text.clone()));
            }
            self.announced_partial = partial.clone();
        }

        // History is only copied when it changed; capture buffers arrive every
        // few hundred milliseconds and leave the snapshot as it was
        let history = (self.history.revision() != self.published_history)
            .then(|| self.history.turns().to_vec());
        self.published_history = self.history.revision();

        let (state, turn_index, last_error) = (self.state, self.turn_index, &self.last_error);
        self.snapshot.send_if_modified(|snapshot| {
            let mut changed = false;
            if let Some(history) = history {
                snapshot.history = history;
                changed = true;
            }
            if snapshot.state != state || snapshot.turn_index != turn_index {
                snapshot.state = state;
                snapshot.turn_index = turn_index;
                changed = true;
            }
            if snapshot.partial != partial {
                snapshot.partial = partial;
                changed = true;
            }
            if snapshot.last_error != *last_error {
                snapshot.last_error = last_error.clone();
                changed = true;
            }
            changed
        });
    }
}

async fn next_capture(rx: &mut Option<mpsc::Receiver<CaptureEvent>>) -> Option<CaptureEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_channel(stream: &mut Option<StreamChannel>) -> Option<ChannelEvent> {
    match stream {
        Some(stream) => stream.next_event().await,
        None => std::future::pending().await,
    }
}

async fn batch_done(in_flight: &mut Option<InFlight>) -> (u64, Result<BatchReply, TurnError>) {
    let (turn, joined) = match in_flight.as_mut() {
        Some(pending) => (pending.turn, (&mut pending.task).await),
        None => std::future::pending().await,
    };
    *in_flight = None;

    let result = match joined {
        Ok(reply) => reply.map_err(TurnError::from),
        Err(e) => Err(TurnError::Transport(TransportError::Channel(format!(
            "submission task failed: {}",
            e
        )))),
    };
    (turn, result)
}

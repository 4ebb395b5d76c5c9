use super::messages::{EndOfAudioMessage, InboundMessage};
use crate::audio::AudioFrame;
use crate::error::TransportError;
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Event delivered from the far end of a streaming channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Message(InboundMessage),
    /// Remote side closed the channel
    Closed,
    Failed(TransportError),
}

/// Session-side half of one duplex streaming channel
///
/// Frames go out in the order `send_frame` is called. Once the outbound half
/// starts closing, further frames are dropped. Both close operations are
/// idempotent.
pub struct StreamChannel {
    outbound: Option<mpsc::UnboundedSender<AudioFrame>>,
    inbound: mpsc::UnboundedReceiver<ChannelEvent>,
    shutdown: Option<oneshot::Sender<()>>,
    frames_sent: u64,
    frames_dropped: u64,
}

/// Transport-side half of a streaming channel
pub struct StreamEndpoint {
    /// Frames in emission order; ends when the session closes the outbound half
    pub frames: mpsc::UnboundedReceiver<AudioFrame>,
    /// Events to deliver to the session
    pub events: mpsc::UnboundedSender<ChannelEvent>,
    /// Resolves when the session fully closes (or drops) the channel
    pub shutdown: oneshot::Receiver<()>,
}

impl StreamChannel {
    /// Create a connected channel/endpoint pair
    pub fn pair() -> (StreamChannel, StreamEndpoint) {
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let channel = StreamChannel {
            outbound: Some(frame_tx),
            inbound: event_rx,
            shutdown: Some(shutdown_tx),
            frames_sent: 0,
            frames_dropped: 0,
        };
        let endpoint = StreamEndpoint {
            frames: frame_rx,
            events: event_tx,
            shutdown: shutdown_rx,
        };
        (channel, endpoint)
    }

    /// Queue a frame for immediate transmission
    ///
    /// Returns false if the frame was dropped because the outbound half is
    /// closing or gone.
    pub fn send_frame(&mut self, frame: AudioFrame) -> bool {
        let sent = match &self.outbound {
            Some(tx) => tx.send(frame).is_ok(),
            None => false,
        };
        if sent {
            self.frames_sent += 1;
        } else {
            self.frames_dropped += 1;
            debug!("Dropping audio frame: outbound channel closed");
        }
        sent
    }

    /// Close the outbound audio half; inbound messages keep flowing
    ///
    /// Returns true only for the call that actually closed it.
    pub fn close_outbound(&mut self) -> bool {
        if self.outbound.take().is_some() {
            debug!("Outbound audio closed after {} frames", self.frames_sent);
            true
        } else {
            false
        }
    }

    /// Close the whole channel. Closing twice is a no-op.
    ///
    /// Returns true only for the call that actually tore it down.
    pub fn close(&mut self) -> bool {
        let outbound = self.close_outbound();
        let shutdown = match self.shutdown.take() {
            Some(tx) => {
                let _ = tx.send(());
                true
            }
            None => false,
        };
        self.inbound.close();
        outbound || shutdown
    }

    pub fn is_outbound_open(&self) -> bool {
        self.outbound.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.is_none() && self.shutdown.is_none()
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }

    /// Next inbound event; `None` once the far end is gone
    pub async fn next_event(&mut self) -> Option<ChannelEvent> {
        self.inbound.recv().await
    }
}

/// Duplex transport opened once per Recording phase
#[async_trait::async_trait]
pub trait StreamingTransport: Send + Sync {
    async fn open(&self, session_id: &str) -> Result<StreamChannel, TransportError>;

    /// Transport name for logging
    fn name(&self) -> &str;
}

/// Streaming transport over a WebSocket
///
/// Outbound audio frames are binary messages of little-endian i16 PCM.
/// Inbound text messages carry one JSON message per line.
pub struct WebSocketTransport {
    url: String,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    fn session_url(&self, session_id: &str) -> String {
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{}session_id={}", self.url, separator, session_id)
    }
}

#[async_trait::async_trait]
impl StreamingTransport for WebSocketTransport {
    async fn open(&self, session_id: &str) -> Result<StreamChannel, TransportError> {
        let url = self.session_url(session_id);
        info!("Connecting to streaming endpoint at {}", url);

        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::Connect(format!("WebSocket connect failed: {}", e)))?;

        info!("Streaming channel open");

        let (mut sink, mut stream) = ws_stream.split();
        let (channel, endpoint) = StreamChannel::pair();
        let StreamEndpoint {
            mut frames,
            events,
            shutdown,
        } = endpoint;
        let session_id = session_id.to_string();

        // Writer: frames in order, end-of-audio marker, then close on shutdown
        let writer_events = events.clone();
        tokio::spawn(async move {
            let mut count = 0u64;
            while let Some(frame) = frames.recv().await {
                if let Err(e) = sink.send(Message::Binary(frame.to_le_bytes().into())).await {
                    error!("Failed to send audio frame {}: {}", frame.sequence, e);
                    let _ = writer_events.send(ChannelEvent::Failed(TransportError::Channel(
                        e.to_string(),
                    )));
                    return;
                }
                count += 1;
            }

            match serde_json::to_string(&EndOfAudioMessage::new(session_id, count)) {
                Ok(marker) => {
                    if let Err(e) = sink.send(Message::Text(marker.into())).await {
                        warn!("Failed to send end-of-audio marker: {}", e);
                    }
                }
                Err(e) => warn!("Failed to encode end-of-audio marker: {}", e),
            }

            // Sender dropped counts as shutdown too
            let _ = shutdown.await;
            if let Err(e) = sink.close().await {
                debug!("WebSocket close: {}", e);
            }
            info!("Streaming channel closed ({} frames sent)", count);
        });

        // Reader: forward parsed messages in arrival order
        tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                let delivered = match message {
                    Ok(Message::Text(text)) => InboundMessage::parse_frame(text.as_str())
                        .into_iter()
                        .all(|m| events.send(ChannelEvent::Message(m)).is_ok()),
                    Ok(Message::Close(frame)) => {
                        debug!("Server closed streaming channel: {:?}", frame);
                        let _ = events.send(ChannelEvent::Closed);
                        return;
                    }
                    Ok(Message::Binary(bytes)) => {
                        debug!("Ignoring {} byte binary message from server", bytes.len());
                        true
                    }
                    Ok(_) => true,
                    Err(e) => {
                        let _ = events.send(ChannelEvent::Failed(TransportError::Channel(
                            e.to_string(),
                        )));
                        return;
                    }
                };
                if !delivered {
                    // Session side is gone
                    return;
                }
            }
            let _ = events.send(ChannelEvent::Closed);
        });

        Ok(channel)
    }

    fn name(&self) -> &str {
        "websocket"
    }
}

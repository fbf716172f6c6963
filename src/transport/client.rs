//! WebSocket duplex transport for synthesis and conversion services.
//!
//! One connection per active stage. Sends are async and may suspend on I/O.
//! A spawned receive loop turns inbound messages into [`TransportEvent`]s:
//! binary messages become [`AudioFrame`]s, text messages are parsed as
//! [`ControlEvent`]s, and the loop always ends with exactly one
//! [`TransportEvent::Disconnected`].

use crate::audio::codec::AudioFrame;
use crate::defaults;
use crate::error::{Result, VoxchainError};
use crate::transport::protocol::{ClientMessage, ControlEvent, SynthesisRequest};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Receiver half of a connection's event stream.
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Something that happened on a connection.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A whole binary message, decoded as PCM16.
    Audio(AudioFrame),
    /// A parsed control message.
    Control(ControlEvent),
    /// The receive loop ended. Emitted exactly once per connection.
    Disconnected(DisconnectReason),
}

/// Why a receive loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The peer sent a close frame or the stream ended.
    Closed,
    /// The connection was closed or dropped locally.
    Cancelled,
    /// A read failed.
    Failed(String),
}

/// Connection settings.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Sample rate of inbound PCM16 audio.
    pub sample_rate: u32,
    /// Upper bound on the WebSocket handshake.
    pub connect_timeout: Duration,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            connect_timeout: Duration::from_millis(defaults::CONNECT_TIMEOUT_MS),
        }
    }
}

/// An open duplex connection.
///
/// Dropping the transport cancels its receive loop.
pub struct DuplexTransport {
    endpoint: String,
    writer: Mutex<SplitSink<WsStream, Message>>,
    open: Arc<AtomicBool>,
    cancel: CancellationToken,
    receiver: JoinHandle<()>,
}

impl DuplexTransport {
    /// Opens a connection to `endpoint` and starts its receive loop.
    ///
    /// # Errors
    /// Returns `VoxchainError::Connection` if the handshake fails or times out.
    pub async fn connect(
        endpoint: &str,
        options: &TransportOptions,
    ) -> Result<(Self, EventReceiver)> {
        debug!(endpoint, "connecting");
        let (stream, _response) =
            tokio::time::timeout(options.connect_timeout, tokio_tungstenite::connect_async(endpoint))
                .await
                .map_err(|_| {
                    VoxchainError::connection(
                        endpoint,
                        format!("timed out after {}ms", options.connect_timeout.as_millis()),
                    )
                })?
                .map_err(|e| VoxchainError::connection(endpoint, e))?;

        let (writer, reader) = stream.split();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(true));
        let cancel = CancellationToken::new();

        let receiver = tokio::spawn(receive_loop(
            reader,
            events_tx,
            cancel.clone(),
            Arc::clone(&open),
            options.sample_rate,
        ));

        debug!(endpoint, "connected");
        Ok((
            Self {
                endpoint: endpoint.to_string(),
                writer: Mutex::new(writer),
                open,
                cancel,
                receiver,
            },
            events_rx,
        ))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns true until the peer disconnects, a send fails or `close` runs.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Sends a raw text payload.
    pub async fn send_text(&self, payload: String) -> Result<()> {
        self.send(Message::Text(payload)).await
    }

    /// Serializes and sends a control message.
    pub async fn send_message(&self, message: &ClientMessage) -> Result<()> {
        let payload = message.to_json().map_err(|e| VoxchainError::Protocol {
            message: format!("Failed to serialize {:?}: {}", message, e),
        })?;
        self.send_text(payload).await
    }

    /// Serializes and sends a whole-text synthesis request.
    pub async fn send_request(&self, request: &SynthesisRequest) -> Result<()> {
        let payload = request.to_json().map_err(|e| VoxchainError::Protocol {
            message: format!("Failed to serialize synthesis request: {}", e),
        })?;
        self.send_text(payload).await
    }

    /// Sends a binary audio payload.
    pub async fn send_binary(&self, bytes: Vec<u8>) -> Result<()> {
        self.send(Message::Binary(bytes)).await
    }

    async fn send(&self, message: Message) -> Result<()> {
        if !self.is_open() {
            return Err(VoxchainError::connection(&self.endpoint, "connection closed"));
        }
        let mut writer = self.writer.lock().await;
        writer.send(message).await.map_err(|e| {
            self.open.store(false, Ordering::SeqCst);
            VoxchainError::connection(&self.endpoint, e)
        })
    }

    /// Closes the connection and stops the receive loop.
    pub async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        self.cancel.cancel();
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.close().await {
            debug!(endpoint = %self.endpoint, error = %e, "close frame not delivered");
        }
    }

    /// Returns true once the receive loop has exited.
    pub fn is_finished(&self) -> bool {
        self.receiver.is_finished()
    }
}

impl Drop for DuplexTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn receive_loop(
    mut reader: SplitStream<WsStream>,
    events: mpsc::UnboundedSender<TransportEvent>,
    cancel: CancellationToken,
    open: Arc<AtomicBool>,
    sample_rate: u32,
) {
    let reason = loop {
        let message = tokio::select! {
            biased;
            _ = cancel.cancelled() => break DisconnectReason::Cancelled,
            message = reader.next() => message,
        };

        let event = match message {
            Some(Ok(Message::Binary(bytes))) => {
                let frame = AudioFrame::from_pcm16(&bytes, sample_rate);
                if frame.is_empty() {
                    continue;
                }
                TransportEvent::Audio(frame)
            }
            Some(Ok(Message::Text(text))) => match ControlEvent::from_json(&text) {
                Ok(event) => TransportEvent::Control(event),
                Err(e) => {
                    warn!(error = %e, payload = %text, "ignoring malformed control message");
                    continue;
                }
            },
            Some(Ok(Message::Close(frame))) => {
                debug!(?frame, "peer closed connection");
                break DisconnectReason::Closed;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => break DisconnectReason::Failed(e.to_string()),
            None => break DisconnectReason::Closed,
        };

        if events.send(event).is_err() {
            // Nobody is listening anymore.
            break DisconnectReason::Cancelled;
        }
    };

    open.store(false, Ordering::SeqCst);
    if events.send(TransportEvent::Disconnected(reason)).is_err() {
        debug!("disconnect not delivered, receiver dropped");
    }
}

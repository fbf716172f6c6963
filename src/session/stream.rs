//! Per-utterance stream session.
//!
//! A [`StreamSession`] owns the sample ring for one logical exchange and is
//! shared between two execution contexts:
//!
//! - the network side (transport pump and senders) drives
//!   `Connecting → Streaming → Draining` and `Errored`;
//! - the audio render callback drives `Draining → Finished` by calling
//!   [`StreamSession::poll_drain`] once per tick.
//!
//! State lives in atomics so neither side blocks the other. Completion is
//! flagged once per utterance and wakes the owner through a [`Notify`];
//! network-side notifications travel over the [`SessionEvent`] channel.

use crate::audio::codec::AudioFrame;
use crate::audio::ring::SampleRing;
use crate::error::VoxchainError;
use crate::session::state::SessionState;
use crate::transport::{ControlEvent, DisconnectReason, EventReceiver, TransportEvent};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use tokio::sync::{Notify, mpsc};
use tracing::{debug, info, warn};

/// Notifications from a session to its owner.
///
/// `generation` identifies the utterance; it changes on every
/// [`StreamSession::reset`] so owners can ignore events from a superseded turn.
#[derive(Debug)]
pub enum SessionEvent {
    /// The peer accepted the connection.
    Ready { generation: u64 },
    /// Transport failure or peer-reported error.
    Failed {
        generation: u64,
        error: VoxchainError,
    },
}

impl SessionEvent {
    pub fn generation(&self) -> u64 {
        match self {
            Self::Ready { generation } | Self::Failed { generation, .. } => *generation,
        }
    }
}

/// Receiver for a session's notifications.
pub type SessionEvents = mpsc::UnboundedReceiver<SessionEvent>;

/// One streamed exchange: ring buffer plus lifecycle state.
pub struct StreamSession {
    ring: SampleRing,
    sample_rate: u32,
    state: AtomicU8,
    end_received: AtomicBool,
    completion_fired: AtomicBool,
    generation: AtomicU64,
    drained: Notify,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl StreamSession {
    /// Creates a session whose ring holds `buffer_secs` of audio.
    pub fn new(sample_rate: u32, buffer_secs: u32) -> (Arc<Self>, SessionEvents) {
        Self::with_ring(SampleRing::for_duration(sample_rate, buffer_secs), sample_rate)
    }

    /// Creates a session around an existing ring.
    pub fn with_ring(ring: SampleRing, sample_rate: u32) -> (Arc<Self>, SessionEvents) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let session = Arc::new(Self {
            ring,
            sample_rate,
            state: AtomicU8::new(SessionState::Idle.as_u8()),
            end_received: AtomicBool::new(false),
            completion_fired: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            drained: Notify::new(),
            events,
        });
        (session, events_rx)
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn ring(&self) -> &SampleRing {
        &self.ring
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn end_received(&self) -> bool {
        self.end_received.load(Ordering::SeqCst)
    }

    pub fn completion_fired(&self) -> bool {
        self.completion_fired.load(Ordering::SeqCst)
    }

    fn transition(&self, from: SessionState, to: SessionState) -> bool {
        self.state
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn notify(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!("session event dropped, owner gone");
        }
    }

    /// Marks that a transport connect has been initiated.
    ///
    /// Only fresh (`Idle`) or failed (`Errored`) sessions move to
    /// `Connecting`; a draining or finished session reconnecting for its next
    /// utterance keeps its state until content is sent.
    pub fn begin_connect(&self) {
        if !self.transition(SessionState::Idle, SessionState::Connecting) {
            self.transition(SessionState::Errored, SessionState::Connecting);
        }
    }

    /// Records a successful send of request content.
    ///
    /// Moves a connecting session to `Streaming`, and re-arms a draining or
    /// finished one: its end/completion flags are cleared so the next
    /// utterance can complete on the same connection.
    pub fn mark_sent(&self) {
        loop {
            let current = self.state();
            match current {
                SessionState::Idle | SessionState::Connecting => {
                    if self.transition(current, SessionState::Streaming) {
                        return;
                    }
                }
                SessionState::Draining | SessionState::Finished => {
                    if self.transition(current, SessionState::Streaming) {
                        // Cleared after leaving Draining so the render side
                        // cannot re-set them for the old utterance.
                        self.end_received.store(false, Ordering::SeqCst);
                        self.completion_fired.store(false, Ordering::SeqCst);
                        debug!(from = %current, "session re-armed");
                        return;
                    }
                }
                SessionState::Streaming | SessionState::Errored => return,
            }
        }
    }

    /// Appends a decoded inbound frame to the ring.
    pub fn push_frame(&self, frame: &AudioFrame) {
        let mut samples = Vec::with_capacity(frame.samples.len());
        frame.extend_f32(&mut samples);
        self.push_samples(&samples);
    }

    /// Appends normalized samples to the ring.
    ///
    /// Audio arriving while idle (after a reset) or after an error belongs to
    /// a superseded utterance and is dropped.
    pub fn push_samples(&self, samples: &[f32]) {
        match self.state() {
            SessionState::Idle | SessionState::Errored => {
                debug!(samples = samples.len(), state = %self.state(), "dropping stale audio");
            }
            _ => self.ring.push(samples),
        }
    }

    /// Applies a control event from the peer.
    pub fn handle_control(&self, event: ControlEvent) {
        match event {
            ControlEvent::Ready { speaker } => {
                info!(?speaker, "stream ready");
                self.notify(SessionEvent::Ready {
                    generation: self.generation(),
                });
            }
            ControlEvent::End => self.mark_end(),
            ControlEvent::Error { detail } => {
                self.fail(VoxchainError::Remote { detail });
            }
        }
    }

    /// Records that no more audio will arrive for the current utterance.
    pub fn mark_end(&self) {
        self.end_received.store(true, Ordering::SeqCst);
        let moved = self.transition(SessionState::Streaming, SessionState::Draining)
            || self.transition(SessionState::Connecting, SessionState::Draining);
        if moved {
            debug!(buffered = self.ring.len(), "end received, draining");
        } else {
            debug!(state = %self.state(), "end received outside streaming");
        }
    }

    /// Handles the end of the transport's receive loop.
    ///
    /// Losing the connection before `end` fails the session; afterwards it is
    /// the normal way a peer finishes (the conversion service closes after
    /// replying `end`).
    pub fn handle_disconnect(&self, endpoint: &str, reason: DisconnectReason) {
        match self.state() {
            SessionState::Connecting | SessionState::Streaming => {
                let message = match reason {
                    DisconnectReason::Closed => "closed by peer before end".to_string(),
                    DisconnectReason::Cancelled => "closed locally before end".to_string(),
                    DisconnectReason::Failed(e) => e,
                };
                self.fail(VoxchainError::connection(endpoint, message));
            }
            state => debug!(%state, ?reason, "transport disconnected"),
        }
    }

    /// Moves to `Errored` and reports the error upward.
    pub fn fail(&self, error: VoxchainError) {
        let previous = SessionState::from_u8(
            self.state
                .swap(SessionState::Errored.as_u8(), Ordering::SeqCst),
        );
        warn!(from = %previous, error = %error, "stream session failed");
        self.notify(SessionEvent::Failed {
            generation: self.generation(),
            error,
        });
    }

    /// Drain check, called from the render callback once per tick.
    ///
    /// Fires completion when `end` has been received and the ring is empty.
    /// Returns true only on the tick that fired. Does not allocate.
    pub fn poll_drain(&self) -> bool {
        if self.state() != SessionState::Draining || !self.ring.is_empty() {
            return false;
        }
        if !self.transition(SessionState::Draining, SessionState::Finished) {
            return false;
        }
        if self.completion_fired.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.drained.notify_one();
        true
    }

    /// Resolves after a completion has fired.
    ///
    /// A completion that fired while nobody was waiting is remembered for
    /// the next call; check [`state`](Self::state) and
    /// [`generation`](Self::generation) to tell whether it belongs to the
    /// current utterance.
    pub async fn drained(&self) {
        self.drained.notified().await;
    }

    /// Supersedes the current utterance: discards buffered audio, clears the
    /// flags and returns to `Idle` under a new generation.
    pub fn reset(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.state.store(SessionState::Idle.as_u8(), Ordering::SeqCst);
        self.ring.reset();
        self.end_received.store(false, Ordering::SeqCst);
        self.completion_fired.store(false, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("state", &self.state())
            .field("generation", &self.generation())
            .field("end_received", &self.end_received())
            .field("completion_fired", &self.completion_fired())
            .field("ring", &self.ring)
            .finish()
    }
}

/// Feeds a transport's events into a session until the connection ends.
///
/// Frames reach the ring in arrival order and control events are applied in
/// the order received.
pub async fn pump(session: Arc<StreamSession>, endpoint: String, mut events: EventReceiver) {
    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::Audio(frame) => session.push_frame(&frame),
            TransportEvent::Control(control) => session.handle_control(control),
            TransportEvent::Disconnected(reason) => {
                session.handle_disconnect(&endpoint, reason);
                break;
            }
        }
    }
}

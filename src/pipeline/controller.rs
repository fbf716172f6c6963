//! Turn orchestration and stage chaining.
//!
//! One [`PipelineController`] owns the output session (shared with the
//! playback sink) and the two remote stages. Each turn consumes a stream of
//! [`UpstreamEvent`]s, routes them according to the turn's
//! [`OutputRoute`], forwards `end` once the upstream finished, and resolves
//! when the output session has played everything out.

use crate::audio::codec;
use crate::config::Config;
use crate::error::{Result, VoxchainError};
use crate::pipeline::link::StageLink;
use crate::pipeline::route::OutputRoute;
use crate::pipeline::text::TextAccumulator;
use crate::pipeline::upstream::UpstreamEvent;
use crate::session::{SessionEvent, SessionEvents, SessionState, StreamSession};
use crate::transport::{SynthesisRequest, TransportOptions};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Settings the controller needs from the configuration.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub route: OutputRoute,
    pub sample_rate: u32,
    pub buffer_secs: u32,
    pub synthesis_endpoint: String,
    pub tts_endpoint: String,
    pub conversion_endpoint: String,
    pub speaker: Option<u32>,
    pub connect_timeout: Duration,
}

impl ControllerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            route: config.pipeline.route,
            sample_rate: config.audio.sample_rate,
            buffer_secs: config.audio.buffer_secs,
            synthesis_endpoint: config.stream.synthesis_url(),
            tts_endpoint: config.stream.tts_url(),
            conversion_endpoint: config.stream.conversion_url(),
            speaker: config.stream.speaker,
            connect_timeout: Duration::from_millis(config.stream.connect_timeout_ms),
        }
    }
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Every sample of the reply was played. Carries the turn's text, if any.
    Completed { text: String },
    /// The turn was cancelled; unplayed audio was discarded.
    Interrupted,
}

/// Routes upstream output through the configured stages to playback.
pub struct PipelineController {
    output: Arc<StreamSession>,
    events: SessionEvents,
    route: OutputRoute,
    pending_route: Option<OutputRoute>,
    synthesis: StageLink,
    tts: StageLink,
    conversion: StageLink,
    speaker: Option<u32>,
    text: TextAccumulator,
}

impl PipelineController {
    pub fn new(config: ControllerConfig) -> Self {
        let (output, events) = StreamSession::new(config.sample_rate, config.buffer_secs);
        let options = TransportOptions {
            sample_rate: config.sample_rate,
            connect_timeout: config.connect_timeout,
        };
        let synthesis = StageLink::new(
            "synthesis",
            config.synthesis_endpoint,
            options.clone(),
            Arc::clone(&output),
        )
        .with_speaker(config.speaker);
        // The one-shot endpoint takes its speaker in the request itself.
        let tts = StageLink::new(
            "tts",
            config.tts_endpoint,
            options.clone(),
            Arc::clone(&output),
        );
        let conversion = StageLink::new(
            "conversion",
            config.conversion_endpoint,
            options,
            Arc::clone(&output),
        );

        Self {
            output,
            events,
            route: config.route,
            pending_route: None,
            synthesis,
            tts,
            conversion,
            speaker: config.speaker,
            text: TextAccumulator::new(),
        }
    }

    /// The session whose ring feeds playback.
    pub fn output(&self) -> Arc<StreamSession> {
        Arc::clone(&self.output)
    }

    /// Route of the current (or most recent) turn.
    pub fn route(&self) -> OutputRoute {
        self.route
    }

    /// Changes the route; takes effect when the next turn starts.
    pub fn set_route(&mut self, route: OutputRoute) {
        self.pending_route = Some(route);
    }

    /// Runs one turn to completion.
    ///
    /// Returns once the reply has been played out, the turn failed, or
    /// `cancel` fired. Failures leave the process and the controller usable;
    /// the next turn reconnects whatever stage dropped.
    pub async fn run_turn(
        &mut self,
        mut upstream: mpsc::Receiver<UpstreamEvent>,
        cancel: CancellationToken,
    ) -> Result<TurnOutcome> {
        if let Some(route) = self.pending_route.take() {
            info!(from = %self.route, to = %route, "route changed");
            self.route = route;
        }
        self.output.reset();
        self.text.finish();
        let generation = self.output.generation();
        let output = Arc::clone(&self.output);
        debug!(route = %self.route, generation, "turn started");

        let mut upstream_done = false;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.interrupt().await;
                    info!(generation, "turn interrupted");
                    return Ok(TurnOutcome::Interrupted);
                }
                _ = output.drained() => {
                    if output.generation() != generation || output.state() != SessionState::Finished {
                        debug!("ignoring completion from superseded turn");
                        continue;
                    }
                    let text = self.text.finish();
                    info!(generation, chars = text.chars().count(), "turn completed");
                    return Ok(TurnOutcome::Completed { text });
                }
                event = self.events.recv() => {
                    let Some(event) = event else {
                        return Err(VoxchainError::Other("session event channel closed".to_string()));
                    };
                    if event.generation() != generation {
                        debug!(?event, "ignoring event from superseded turn");
                        continue;
                    }
                    match event {
                        SessionEvent::Ready { .. } => {}
                        SessionEvent::Failed { error, .. } => {
                            self.close_stages().await;
                            return Err(error);
                        }
                    }
                }
                event = upstream.recv(), if !upstream_done => {
                    let event = event.unwrap_or_else(|| {
                        debug!("upstream closed without completion marker");
                        UpstreamEvent::ContentComplete
                    });
                    upstream_done = event.is_complete();
                    if let Err(e) = self.route_event(event).await {
                        self.output.fail(e);
                    }
                }
            }
        }
    }

    async fn route_event(&mut self, event: UpstreamEvent) -> Result<()> {
        match event {
            UpstreamEvent::SessionStarted => match self.route {
                OutputRoute::Playback => Ok(()),
                OutputRoute::ConvertAudio => self.conversion.ensure_connected().await.map(|_| ()),
                OutputRoute::SynthesizeText => {
                    self.synthesis.ensure_connected().await.map(|_| ())
                }
                // Connected with the request; the endpoint times out idle clients.
                OutputRoute::SynthesizeWhole => Ok(()),
            },
            UpstreamEvent::TextDelta(delta) => {
                let Some(fragment) = self.text.push(&delta) else {
                    return Ok(());
                };
                match self.route {
                    OutputRoute::SynthesizeText => self.synthesis.send_text(fragment).await,
                    _ => Ok(()),
                }
            }
            UpstreamEvent::AudioDelta(pcm16) => {
                if pcm16.len() < 2 {
                    return Ok(());
                }
                match self.route {
                    OutputRoute::Playback => {
                        self.output.mark_sent();
                        self.output.push_samples(&codec::decode(&pcm16));
                        Ok(())
                    }
                    OutputRoute::ConvertAudio => self.conversion.send_audio(pcm16).await,
                    OutputRoute::SynthesizeText | OutputRoute::SynthesizeWhole => {
                        debug!(bytes = pcm16.len(), "dropping upstream audio on text route");
                        Ok(())
                    }
                }
            }
            UpstreamEvent::ContentComplete => {
                debug!(route = %self.route, fragments = self.text.fragments(), "upstream complete");
                match self.route {
                    OutputRoute::Playback => {
                        self.output.mark_sent();
                        self.output.mark_end();
                        Ok(())
                    }
                    OutputRoute::ConvertAudio => self.conversion.end().await,
                    OutputRoute::SynthesizeText => self.synthesis.end().await,
                    OutputRoute::SynthesizeWhole => {
                        let request = SynthesisRequest {
                            text: self.text.text().to_string(),
                            speaker: self.speaker,
                        };
                        self.tts.send_request(&request).await
                    }
                }
            }
        }
    }

    /// Abandons the current turn.
    ///
    /// Discards unplayed audio and drops the stage connections so nothing
    /// more arrives for the abandoned utterance.
    pub async fn interrupt(&mut self) {
        self.output.reset();
        self.text.finish();
        self.close_stages().await;
    }

    async fn close_stages(&mut self) {
        self.synthesis.close().await;
        self.tts.close().await;
        self.conversion.close().await;
    }

    /// Closes all connections.
    pub async fn shutdown(&mut self) {
        self.close_stages().await;
        if self.output.state().is_active() {
            warn!(state = %self.output.state(), "shutting down with an active session");
        }
    }
}

impl std::fmt::Debug for PipelineController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineController")
            .field("route", &self.route)
            .field("pending_route", &self.pending_route)
            .field("output", &self.output)
            .field("synthesis", &self.synthesis)
            .field("tts", &self.tts)
            .field("conversion", &self.conversion)
            .finish()
    }
}

//! Command handlers: wire upstream sources, the controller and the output
//! device together for one turn.

use crate::audio::capture::{
    AudioSource, CaptureChunk, CaptureConfig, CaptureHandle, CpalAudioSource, spawn_capture,
    to_f32,
};
use crate::audio::codec;
use crate::audio::playback::{OutputDevice, PlaybackSink};
use crate::audio::wav::WavAudioSource;
use crate::config::Config;
use crate::defaults;
use crate::error::{Result, VoxchainError};
use crate::pipeline::{ControllerConfig, OutputRoute, PipelineController, TurnOutcome, UpstreamEvent};
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Upstream channel depth; senders wait when the controller falls behind.
const UPSTREAM_CHANNEL_SIZE: usize = 64;

/// Splits `text` into fragments of `words` words each.
///
/// Whitespace stays attached to the preceding word, so the fragments
/// concatenate back to the original text.
pub fn word_groups(text: &str, words: usize) -> Vec<String> {
    let words = words.max(1);
    let mut groups = Vec::new();
    let mut current = String::new();
    let mut count = 0;
    let mut in_word = false;

    for ch in text.chars() {
        if ch.is_whitespace() {
            if in_word {
                count += 1;
                in_word = false;
            }
        } else {
            if !in_word && count == words {
                groups.push(std::mem::take(&mut current));
                count = 0;
            }
            in_word = true;
        }
        current.push(ch);
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

/// Runs one turn with the output device open, cancelling on Ctrl-C.
async fn play_turn(
    config: &Config,
    controller: &mut PipelineController,
    upstream: mpsc::Receiver<UpstreamEvent>,
    cancel: CancellationToken,
) -> Result<TurnOutcome> {
    let sink = PlaybackSink::new(controller.output(), config.audio.prebuffer_samples());
    let device = OutputDevice::open(
        config.audio.output_device.as_deref(),
        config.audio.sample_rate,
        config.audio.render_quantum,
        sink,
    )?;
    debug!(channels = device.channels(), "output open");

    let outcome = controller.run_turn(upstream, cancel).await;
    controller.shutdown().await;
    if let Err(e) = device.pause() {
        debug!(error = %e, "output did not pause cleanly");
    }
    outcome
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    cancel
}

fn controller_for(config: &Config, route: OutputRoute) -> PipelineController {
    let mut controller_config = ControllerConfig::from_config(config);
    controller_config.route = route;
    PipelineController::new(controller_config)
}

/// Status line printed when a turn ends.
fn outcome_message(outcome: &TurnOutcome) -> &'static str {
    match outcome {
        TurnOutcome::Completed { .. } => "Done",
        TurnOutcome::Interrupted => "Interrupted",
    }
}

fn report(outcome: TurnOutcome, quiet: bool) {
    debug!(?outcome, "turn ended");
    if !quiet {
        eprintln!("{}", outcome_message(&outcome));
    }
}

/// `voxchain speak`: synthesize text and play it.
///
/// Text goes to the incremental endpoint word group by word group, or to the
/// one-shot endpoint in a single request when `whole` is set.
pub async fn run_speak(
    config: Config,
    text: String,
    words_per_chunk: usize,
    whole: bool,
    quiet: bool,
) -> Result<()> {
    let route = if whole {
        OutputRoute::SynthesizeWhole
    } else {
        OutputRoute::SynthesizeText
    };
    let mut controller = controller_for(&config, route);

    let (tx, rx) = mpsc::channel(UPSTREAM_CHANNEL_SIZE);
    let fragments = word_groups(&text, words_per_chunk);
    tokio::spawn(async move {
        let events = std::iter::once(UpstreamEvent::SessionStarted)
            .chain(fragments.into_iter().map(UpstreamEvent::TextDelta))
            .chain(std::iter::once(UpstreamEvent::ContentComplete));
        for event in events {
            if tx.send(event).await.is_err() {
                break;
            }
        }
    });

    let outcome = play_turn(&config, &mut controller, rx, cancel_on_ctrl_c()).await?;
    report(outcome, quiet);
    Ok(())
}

/// Forwards capture chunks to the controller as upstream audio.
///
/// When `paced`, one chunk is released per cadence so file sources stream
/// at real-time speed.
fn bridge_capture(
    chunks: crossbeam_channel::Receiver<CaptureChunk>,
    upstream: mpsc::Sender<UpstreamEvent>,
    paced: Option<Duration>,
) {
    tokio::task::spawn_blocking(move || {
        if upstream.blocking_send(UpstreamEvent::SessionStarted).is_err() {
            return;
        }
        for chunk in chunks.iter() {
            let event = match chunk {
                CaptureChunk::Frame(bytes) => UpstreamEvent::AudioDelta(bytes),
                CaptureChunk::End => UpstreamEvent::ContentComplete,
            };
            let done = event.is_complete();
            if upstream.blocking_send(event).is_err() || done {
                break;
            }
            if let Some(cadence) = paced {
                std::thread::sleep(cadence);
            }
        }
    });
}

/// `voxchain convert`: stream a file or the microphone through conversion.
pub async fn run_convert(
    config: Config,
    wav: Option<&Path>,
    input_device: Option<&str>,
    quiet: bool,
) -> Result<()> {
    let rate = config.audio.sample_rate;
    let capture = CaptureConfig {
        sample_rate: rate,
        cadence_ms: config.audio.capture_cadence_ms,
        ..CaptureConfig::default()
    };

    let (source, paced): (Box<dyn AudioSource>, Option<Duration>) = match wav {
        Some(path) => {
            let file = WavAudioSource::open(path, rate)?;
            info!(path = %path.display(), samples = file.len(), "converting file");
            let cadence = Duration::from_millis(u64::from(config.audio.capture_cadence_ms));
            let source: Box<dyn AudioSource> = Box::new(file);
            (source, Some(cadence))
        }
        None => {
            let device = input_device.or(config.audio.input_device.as_deref());
            if !quiet {
                eprintln!("Converting microphone input, press Ctrl-C to finish");
            }
            let source: Box<dyn AudioSource> = Box::new(CpalAudioSource::new(device, rate)?);
            (source, None)
        }
    };
    let live = paced.is_none();

    let (chunks, handle) = spawn_capture(source, capture)?;
    let mut controller = controller_for(&config, OutputRoute::ConvertAudio);
    let (tx, rx) = mpsc::channel(UPSTREAM_CHANNEL_SIZE);
    bridge_capture(chunks, tx, paced);

    // Live capture: the first Ctrl-C ends the utterance, a second abandons it.
    let cancel = if live {
        stop_then_cancel_on_ctrl_c(handle)
    } else {
        cancel_on_ctrl_c()
    };

    let outcome = play_turn(&config, &mut controller, rx, cancel).await?;
    report(outcome, quiet);
    Ok(())
}

fn stop_then_cancel_on_ctrl_c(capture: CaptureHandle) -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        capture.stop();
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    cancel
}

/// `voxchain play`: play a WAV file through the local ring and gate.
pub async fn run_play(config: Config, wav: &Path, quiet: bool) -> Result<()> {
    let rate = config.audio.sample_rate;
    let source = WavAudioSource::open(wav, rate)?;
    if source.is_empty() {
        return Err(VoxchainError::AudioFormat {
            message: format!("{} contains no audio", wav.display()),
        });
    }
    let samples = to_f32(&source.into_samples());
    let frames = codec::frame_pcm16(&samples, rate, defaults::FRAME_MS);
    info!(path = %wav.display(), frames = frames.len(), "playing file");

    let mut controller = controller_for(&config, OutputRoute::Playback);
    let (tx, rx) = mpsc::channel(UPSTREAM_CHANNEL_SIZE);
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_millis(u64::from(defaults::FRAME_MS)));
        for frame in frames {
            tick.tick().await;
            if tx.send(UpstreamEvent::AudioDelta(frame)).await.is_err() {
                return;
            }
        }
        if tx.send(UpstreamEvent::ContentComplete).await.is_err() {
            debug!("turn ended before completion marker");
        }
    });

    let outcome = play_turn(&config, &mut controller, rx, cancel_on_ctrl_c()).await?;
    report(outcome, quiet);
    Ok(())
}

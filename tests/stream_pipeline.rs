//! End-to-end turns against in-process synthesis and conversion services.

use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use voxchain::audio::codec;
use voxchain::pipeline::ControllerConfig;
use voxchain::{
    OutputRoute, PipelineController, PlaybackSink, SessionState, StreamSession, TurnOutcome,
    UpstreamEvent, VoxchainError,
};

const RATE: u32 = 24000;
const FRAME: usize = 480;

/// Synthesis service: `ready` on connect, one frame per text fragment,
/// a trailing frame plus `end` per utterance. Stays connected.
async fn synthesis_service(fail_on_text: bool) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut ws = accept_async(stream).await.unwrap();
                ws.send(Message::Text(r#"{"event":"ready"}"#.into()))
                    .await
                    .unwrap();
                while let Some(Ok(message)) = ws.next().await {
                    let Message::Text(text) = message else {
                        continue;
                    };
                    if text.contains(r#""type":"text""#) {
                        if fail_on_text {
                            ws.send(Message::Text(
                                r#"{"event":"error","detail":"voice not loaded"}"#.into(),
                            ))
                            .await
                            .unwrap();
                            continue;
                        }
                        let frame = codec::encode(&vec![0.25; FRAME]);
                        ws.send(Message::Binary(frame)).await.unwrap();
                    } else if text.contains(r#""type":"end""#) {
                        let frame = codec::encode(&vec![0.5; FRAME]);
                        ws.send(Message::Binary(frame)).await.unwrap();
                        ws.send(Message::Text(r#"{"event":"end"}"#.into()))
                            .await
                            .unwrap();
                    }
                }
            });
        }
    });
    format!("ws://{}", addr)
}

/// Conversion service: buffers audio until `end`, echoes it back in
/// frames, replies `end` and closes. Counts connections.
async fn conversion_service() -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&connections);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let mut ws = accept_async(stream).await.unwrap();
                ws.send(Message::Text(r#"{"event":"ready"}"#.into()))
                    .await
                    .unwrap();
                let mut buffered: Vec<u8> = Vec::new();
                while let Some(Ok(message)) = ws.next().await {
                    match message {
                        Message::Binary(bytes) => buffered.extend_from_slice(&bytes),
                        Message::Text(text) if text.contains(r#""type":"end""#) => {
                            for chunk in buffered.chunks(FRAME * 2) {
                                ws.send(Message::Binary(chunk.to_vec())).await.unwrap();
                            }
                            ws.send(Message::Text(r#"{"event":"end"}"#.into()))
                                .await
                                .unwrap();
                            ws.close(None).await.unwrap();
                            break;
                        }
                        _ => {}
                    }
                }
            });
        }
    });
    (format!("ws://{}", addr), connections)
}

/// One-shot synthesis service: reads a whole-text request, answers `ready`
/// with the speaker, one frame per word and `end`, then closes. Empty text
/// gets `end` straight away. Forwards every request it receives.
async fn one_shot_service() -> (String, mpsc::UnboundedReceiver<serde_json::Value>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (requests, seen) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let requests = requests.clone();
            tokio::spawn(async move {
                let mut ws = accept_async(stream).await.unwrap();
                let Some(Ok(Message::Text(raw))) = ws.next().await else {
                    return;
                };
                let request: serde_json::Value = serde_json::from_str(&raw).unwrap();
                requests.send(request.clone()).unwrap();

                let text = request["text"].as_str().unwrap_or_default().trim().to_string();
                if !text.is_empty() {
                    let speaker = request["speaker"].as_u64().unwrap_or(0);
                    let ready = format!(r#"{{"event":"ready","speaker":{}}}"#, speaker);
                    ws.send(Message::Text(ready)).await.unwrap();
                    for _ in text.split_whitespace() {
                        let frame = codec::encode(&vec![0.25; FRAME]);
                        ws.send(Message::Binary(frame)).await.unwrap();
                    }
                }
                ws.send(Message::Text(r#"{"event":"end"}"#.into()))
                    .await
                    .unwrap();
                ws.close(None).await.unwrap();
            });
        }
    });
    (format!("ws://{}", addr), seen)
}

fn controller(route: OutputRoute, synthesis: &str, conversion: &str) -> PipelineController {
    controller_with_tts(route, synthesis, "ws://127.0.0.1:9", conversion)
}

fn controller_with_tts(
    route: OutputRoute,
    synthesis: &str,
    tts: &str,
    conversion: &str,
) -> PipelineController {
    PipelineController::new(ControllerConfig {
        route,
        sample_rate: RATE,
        buffer_secs: 2,
        synthesis_endpoint: synthesis.to_string(),
        tts_endpoint: tts.to_string(),
        conversion_endpoint: conversion.to_string(),
        speaker: Some(1),
        connect_timeout: Duration::from_secs(2),
    })
}

/// Stands in for the audio device: renders one block every 2ms and counts
/// the real samples played.
fn spawn_renderer(session: Arc<StreamSession>) -> (tokio::task::JoinHandle<()>, Arc<AtomicUsize>) {
    let played = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&played);
    let handle = tokio::spawn(async move {
        let mut sink = PlaybackSink::new(session, FRAME);
        let mut block = vec![0.0f32; FRAME];
        let mut tick = tokio::time::interval(Duration::from_millis(2));
        loop {
            tick.tick().await;
            let filled = sink.render(&mut block);
            counter.fetch_add(filled, Ordering::SeqCst);
        }
    });
    (handle, played)
}

async fn run(
    controller: &mut PipelineController,
    events: Vec<UpstreamEvent>,
) -> voxchain::Result<TurnOutcome> {
    let (tx, rx) = mpsc::channel(events.len().max(1));
    for event in events {
        tx.send(event).await.unwrap();
    }
    tokio::time::timeout(
        Duration::from_secs(5),
        controller.run_turn(rx, CancellationToken::new()),
    )
    .await
    .expect("turn timed out")
}

#[tokio::test]
async fn synthesized_turn_plays_every_frame() {
    let synthesis = synthesis_service(false).await;
    let mut controller = controller(OutputRoute::SynthesizeText, &synthesis, "ws://127.0.0.1:9");
    let (renderer, played) = spawn_renderer(controller.output());

    let outcome = run(
        &mut controller,
        vec![
            UpstreamEvent::SessionStarted,
            UpstreamEvent::TextDelta("Hello ".to_string()),
            UpstreamEvent::TextDelta("world.".to_string()),
            UpstreamEvent::ContentComplete,
        ],
    )
    .await
    .unwrap();

    assert_eq!(
        outcome,
        TurnOutcome::Completed {
            text: "Hello world.".to_string()
        }
    );
    // Two text frames plus the trailing frame.
    assert_eq!(played.load(Ordering::SeqCst), 3 * FRAME);
    assert_eq!(controller.output().state(), SessionState::Finished);

    renderer.abort();
    controller.shutdown().await;
}

#[tokio::test]
async fn synthesis_connection_is_reused_across_turns() {
    let synthesis = synthesis_service(false).await;
    let mut controller = controller(OutputRoute::SynthesizeText, &synthesis, "ws://127.0.0.1:9");
    let (renderer, _played) = spawn_renderer(controller.output());

    for sentence in ["First.", "Second."] {
        let outcome = run(
            &mut controller,
            vec![
                UpstreamEvent::SessionStarted,
                UpstreamEvent::TextDelta(sentence.to_string()),
                UpstreamEvent::ContentComplete,
            ],
        )
        .await
        .unwrap();
        assert_eq!(
            outcome,
            TurnOutcome::Completed {
                text: sentence.to_string()
            }
        );
    }

    renderer.abort();
    controller.shutdown().await;
}

#[tokio::test]
async fn text_free_turn_completes_on_reused_connection() {
    let synthesis = synthesis_service(false).await;
    let mut controller = controller(OutputRoute::SynthesizeText, &synthesis, "ws://127.0.0.1:9");
    let (renderer, played) = spawn_renderer(controller.output());

    let first = run(
        &mut controller,
        vec![
            UpstreamEvent::SessionStarted,
            UpstreamEvent::TextDelta("hi.".to_string()),
            UpstreamEvent::ContentComplete,
        ],
    )
    .await
    .unwrap();
    assert!(matches!(first, TurnOutcome::Completed { .. }));

    // Nothing to say: the service still answers the end marker.
    let second = run(
        &mut controller,
        vec![UpstreamEvent::SessionStarted, UpstreamEvent::ContentComplete],
    )
    .await
    .unwrap();
    assert_eq!(
        second,
        TurnOutcome::Completed {
            text: String::new()
        }
    );
    assert_eq!(controller.output().state(), SessionState::Finished);
    // Text frame and trailing frame of the first turn, trailing frame of the second.
    assert_eq!(played.load(Ordering::SeqCst), 3 * FRAME);

    renderer.abort();
    controller.shutdown().await;
}

#[tokio::test]
async fn whole_text_turn_synthesizes_in_one_request() {
    let (tts, mut requests) = one_shot_service().await;
    let mut controller = controller_with_tts(
        OutputRoute::SynthesizeWhole,
        "ws://127.0.0.1:9",
        &tts,
        "ws://127.0.0.1:9",
    );
    let (renderer, played) = spawn_renderer(controller.output());

    for turn in 1..=2 {
        let outcome = run(
            &mut controller,
            vec![
                UpstreamEvent::SessionStarted,
                UpstreamEvent::TextDelta("three little ".to_string()),
                UpstreamEvent::TextDelta("words".to_string()),
                UpstreamEvent::ContentComplete,
            ],
        )
        .await
        .unwrap();
        assert_eq!(
            outcome,
            TurnOutcome::Completed {
                text: "three little words".to_string()
            }
        );
        assert_eq!(played.load(Ordering::SeqCst), turn * 3 * FRAME);

        let request = requests.recv().await.unwrap();
        assert_eq!(request["text"], "three little words");
        assert_eq!(request["speaker"], 1);
    }

    renderer.abort();
    controller.shutdown().await;
}

#[tokio::test]
async fn whole_text_turn_without_text_completes() {
    let (tts, mut requests) = one_shot_service().await;
    let mut controller = controller_with_tts(
        OutputRoute::SynthesizeWhole,
        "ws://127.0.0.1:9",
        &tts,
        "ws://127.0.0.1:9",
    );
    let (renderer, played) = spawn_renderer(controller.output());

    let outcome = run(
        &mut controller,
        vec![UpstreamEvent::SessionStarted, UpstreamEvent::ContentComplete],
    )
    .await
    .unwrap();

    assert_eq!(
        outcome,
        TurnOutcome::Completed {
            text: String::new()
        }
    );
    assert_eq!(requests.recv().await.unwrap()["text"], "");
    assert_eq!(played.load(Ordering::SeqCst), 0);

    renderer.abort();
    controller.shutdown().await;
}

#[tokio::test]
async fn converted_turn_reconnects_after_service_closes() {
    let (conversion, connections) = conversion_service().await;
    let mut controller = controller(OutputRoute::ConvertAudio, "ws://127.0.0.1:9", &conversion);
    let (renderer, played) = spawn_renderer(controller.output());

    for turn in 1..=2 {
        let outcome = run(
            &mut controller,
            vec![
                UpstreamEvent::SessionStarted,
                UpstreamEvent::AudioDelta(codec::encode(&vec![0.1; 2400])),
                UpstreamEvent::AudioDelta(codec::encode(&vec![0.1; 2400])),
                UpstreamEvent::ContentComplete,
            ],
        )
        .await
        .unwrap();
        assert!(matches!(outcome, TurnOutcome::Completed { .. }));
        assert_eq!(played.load(Ordering::SeqCst), turn * 4800);
    }
    assert_eq!(connections.load(Ordering::SeqCst), 2);

    renderer.abort();
    controller.shutdown().await;
}

#[tokio::test]
async fn remote_error_fails_the_turn() {
    let synthesis = synthesis_service(true).await;
    let mut controller = controller(OutputRoute::SynthesizeText, &synthesis, "ws://127.0.0.1:9");
    let (renderer, played) = spawn_renderer(controller.output());

    let result = run(
        &mut controller,
        vec![
            UpstreamEvent::SessionStarted,
            UpstreamEvent::TextDelta("Hello.".to_string()),
            UpstreamEvent::ContentComplete,
        ],
    )
    .await;

    match result {
        Err(VoxchainError::Remote { detail }) => assert_eq!(detail, "voice not loaded"),
        other => panic!("expected remote error, got {:?}", other),
    }
    assert_eq!(controller.output().state(), SessionState::Errored);
    assert_eq!(played.load(Ordering::SeqCst), 0);

    renderer.abort();
}

#[tokio::test]
async fn cancelled_turn_discards_buffered_audio() {
    let synthesis = synthesis_service(false).await;
    let mut controller = controller(OutputRoute::SynthesizeText, &synthesis, "ws://127.0.0.1:9");
    let output = controller.output();

    // No renderer: audio stays buffered until the turn is cancelled.
    let (tx, rx) = mpsc::channel(8);
    tx.send(UpstreamEvent::SessionStarted).await.unwrap();
    tx.send(UpstreamEvent::TextDelta("Hold on.".to_string()))
        .await
        .unwrap();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let watcher = Arc::clone(&output);
    tokio::spawn(async move {
        while watcher.ring().is_empty() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        trigger.cancel();
    });

    let outcome = tokio::time::timeout(Duration::from_secs(5), controller.run_turn(rx, cancel))
        .await
        .expect("turn timed out")
        .unwrap();

    assert_eq!(outcome, TurnOutcome::Interrupted);
    assert!(output.ring().is_empty());
    assert_eq!(output.state(), SessionState::Idle);
    drop(tx);
}

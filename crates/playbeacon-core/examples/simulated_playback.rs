//! Simulated playback example
//!
//! Feeds a short, noisy callback sequence into a telemetry session and
//! prints what gets dispatched.
//!
//! Run with: cargo run -p playbeacon-core --example simulated_playback

use playbeacon_core::{
    ChannelSink, DataType, DiscontinuityReason, Dispatch, EngineCallback, EngineState,
    SessionConfig, TelemetrySession,
};
use std::collections::HashMap;
use std::sync::Arc;

fn main() {
    println!("PlayBeacon Core - Simulated Playback Example");
    println!("============================================\n");

    let (sink, mut rx) = ChannelSink::new();
    let mut session = match TelemetrySession::new(SessionConfig::default(), Arc::new(sink)) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Failed to create session: {e}");
            return;
        }
    };

    let mut headers = HashMap::new();
    headers.insert("X-CDN".to_string(), vec!["Fastly".to_string()]);
    headers.insert("Set-Cookie".to_string(), vec!["session=1".to_string()]);

    let callbacks = vec![
        // Quality known before playback starts: deferred
        EngineCallback::VideoSizeChanged { width: 1280, height: 720 },
        EngineCallback::LoadStarted {
            task_id: 1,
            uri: "https://cdn.example.com/vod/master.m3u8".to_string(),
            data_type: DataType::Manifest,
            media_start_ms: None,
            media_end_ms: None,
            format: None,
        },
        EngineCallback::LoadCompleted {
            task_id: 1,
            uri: "https://cdn.example.com/vod/master.m3u8".to_string(),
            bytes_loaded: 2_048,
            format: None,
            response_headers: headers,
        },
        EngineCallback::PlaybackStateChanged { state: EngineState::Buffering, play_when_ready: true },
        EngineCallback::PlaybackStateChanged { state: EngineState::Ready, play_when_ready: true },
        // Duplicate from the engine: filtered
        EngineCallback::PlaybackStateChanged { state: EngineState::Ready, play_when_ready: true },
        EngineCallback::PositionDiscontinuity {
            reason: DiscontinuityReason::Seek,
            old_position_ms: 8_000,
            new_position_ms: 45_000,
        },
        EngineCallback::PlaybackStateChanged { state: EngineState::Ready, play_when_ready: true },
        EngineCallback::LoadCanceled {
            task_id: 2,
            uri: "https://cdn.example.com/vod/720p/seg3.ts".to_string(),
            response_headers: HashMap::new(),
        },
        EngineCallback::PlaybackStateChanged { state: EngineState::Ended, play_when_ready: false },
    ];

    for callback in callbacks {
        println!("engine   -> {}", callback.name());
        session.handle(callback);
        while let Ok(dispatch) = rx.try_recv() {
            match &dispatch {
                Dispatch::Playback(event) => {
                    println!("dispatch <- {} ({:?})", event.kind, event.position_ms)
                }
                Dispatch::Chunk { kind, request } => println!(
                    "dispatch <- {} task={} headers={:?}",
                    kind, request.task_id, request.response_headers
                ),
            }
        }
    }

    session.release();
    println!("\nSession released, final state: {:?}", session.state());
}

//! Benchmark tests for playbeacon-core operations
//!
//! Run with: cargo bench -p playbeacon-core

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::collections::HashMap;
use std::sync::Arc;

use playbeacon_core::callback::{EngineCallback, EngineState};
use playbeacon_core::config::{SessionConfig, ThrottleConfig};
use playbeacon_core::sink::DispatchSink;
use playbeacon_core::throttle::{filter_headers, ThrottleGate};
use playbeacon_core::transition;
use playbeacon_core::types::*;
use playbeacon_core::{EventStateMachine, TelemetrySession};

// ============================================================================
// Helpers
// ============================================================================

/// Sink discarding everything, so benches measure only the pipeline
struct NullSink;

impl DispatchSink for NullSink {
    fn dispatch(&self, dispatch: Dispatch) {
        black_box(dispatch);
    }
}

fn create_test_headers(extra: usize) -> HashMap<String, Vec<String>> {
    let mut headers = HashMap::new();
    headers.insert("X-CDN".to_string(), vec!["Fastly".to_string()]);
    headers.insert("Content-Type".to_string(), vec!["video/MP2T".to_string()]);
    headers.insert("Server".to_string(), vec!["nginx".to_string(), "Varnish".to_string()]);
    headers.insert("X-Request-Id".to_string(), vec!["3f2a-91bc".to_string()]);
    for i in 0..extra {
        headers.insert(format!("X-Custom-{i}"), vec![format!("value-{i}")]);
    }
    headers
}

// ============================================================================
// State Machine Benchmarks
// ============================================================================

fn bench_transition_table(c: &mut Criterion) {
    c.bench_function("transition/can_transition_all_pairs", |b| {
        b.iter(|| {
            let mut allowed = 0;
            for from in EventKind::ALL {
                for to in EventKind::ALL {
                    if transition::can_transition(black_box(Some(from)), black_box(to)) {
                        allowed += 1;
                    }
                }
            }
            allowed
        });
    });
}

fn bench_state_machine(c: &mut Criterion) {
    let cycle = [
        EventKind::Play,
        EventKind::Playing,
        EventKind::Buffering,
        EventKind::Buffering,
        EventKind::Buffered,
        EventKind::VariantChanged,
        EventKind::Pause,
    ];

    c.bench_function("state_machine/submit_cycle", |b| {
        let mut machine = EventStateMachine::new(Arc::new(NullSink));
        b.iter(|| {
            for kind in cycle {
                black_box(machine.submit(kind.into()));
            }
            machine.reset();
        });
    });
}

// ============================================================================
// Chunk Benchmarks
// ============================================================================

fn bench_throttle(c: &mut Criterion) {
    let request = ChunkRequest {
        media_duration: Some(4_000),
        ..ChunkRequest::blank(1)
    };

    c.bench_function("throttle/should_emit_at", |b| {
        let mut gate = ThrottleGate::new(ThrottleConfig::default());
        let mut now = 0i64;
        b.iter(|| {
            now += 100;
            black_box(gate.should_emit_at(&request, ChunkEventKind::RequestCompleted, now))
        });
    });
}

fn bench_header_filtering(c: &mut Criterion) {
    let mut group = c.benchmark_group("Header Filtering");

    for extra in [0usize, 10, 50] {
        let headers = create_test_headers(extra);
        group.bench_with_input(BenchmarkId::new("filter_headers", extra), &headers, |b, headers| {
            b.iter(|| black_box(filter_headers(headers)));
        });
    }

    group.finish();
}

fn bench_session_chunk_lifecycle(c: &mut Criterion) {
    c.bench_function("session/load_started_completed", |b| {
        let mut config = SessionConfig::default();
        config.telemetry.throttle.max_events_per_window = u32::MAX;
        let mut session = TelemetrySession::new(config, Arc::new(NullSink)).unwrap();
        session.handle(EngineCallback::PlaybackStateChanged {
            state: EngineState::Ready,
            play_when_ready: true,
        });
        let headers = create_test_headers(4);
        let mut task_id = 0u64;

        b.iter(|| {
            task_id += 1;
            session.handle(EngineCallback::LoadStarted {
                task_id,
                uri: "https://cdn.example.com/vod/720p/seg42.ts?token=abc".to_string(),
                data_type: DataType::Media,
                media_start_ms: Some(168_000),
                media_end_ms: Some(172_000),
                format: None,
            });
            session.handle(EngineCallback::LoadCompleted {
                task_id,
                uri: "https://cdn.example.com/vod/720p/seg42.ts?token=abc".to_string(),
                bytes_loaded: 1_250_000,
                format: None,
                response_headers: headers.clone(),
            });
        });
    });
}

criterion_group!(
    state_benches,
    bench_transition_table,
    bench_state_machine,
);

criterion_group!(
    chunk_benches,
    bench_throttle,
    bench_header_filtering,
    bench_session_chunk_lifecycle,
);

criterion_main!(state_benches, chunk_benches);

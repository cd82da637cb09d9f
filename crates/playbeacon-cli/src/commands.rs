//! CLI command implementations

use crate::output::{format_dispatch, format_rows};
use anyhow::Context;
use playbeacon_core::{
    transition, transport, ChannelSink, EngineCallback, EventKind, SessionConfig,
    TelemetrySession,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tabled::Tabled;
use tracing::{info, warn};
use url::Url;

/// Parse a JSON-lines callback log. Blank lines and `#` comments are skipped.
pub fn parse_callback_log(contents: &str) -> anyhow::Result<Vec<EngineCallback>> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(index, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("invalid callback on line {}", index + 1))
        })
        .collect()
}

/// Replay a callback log through a telemetry session
pub async fn replay(
    file: &Path,
    collector: Option<Url>,
    config_path: Option<PathBuf>,
    format: &str,
) -> anyhow::Result<()> {
    let contents = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let callbacks = parse_callback_log(&contents)?;

    let mut config = match config_path {
        Some(path) => SessionConfig::from_file(&path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => SessionConfig::default(),
    };

    info!(callbacks = callbacks.len(), file = %file.display(), "Replaying callbacks");

    if let Some(collector) = collector {
        config.collector = Some(collector.clone());
        let mut session = TelemetrySession::http(config)?;
        for callback in callbacks {
            session.handle(callback);
        }
        session.flush().await;
        session.release();

        println!("Replay finished: view {} sent to {}", session.id(), collector);
        return Ok(());
    }

    let (sink, mut rx) = ChannelSink::new();
    let mut session = TelemetrySession::new(config, Arc::new(sink))?;
    let total = callbacks.len();
    for callback in callbacks {
        session.handle(callback);
    }

    let mut dispatched = 0usize;
    while let Ok(dispatch) = rx.try_recv() {
        println!("{}", format_dispatch(&dispatch, format)?);
        dispatched += 1;
    }

    if session.in_flight_chunks() > 0 {
        warn!(
            in_flight = session.in_flight_chunks(),
            "Log ended with chunk requests still in flight"
        );
    }
    session.release();

    info!(callbacks = total, dispatched, "Replay finished");
    Ok(())
}

#[derive(Debug, Serialize, Tabled)]
struct TransitionRow {
    from: String,
    to: String,
}

/// Print the lifecycle transition table
pub fn transitions(format: &str) -> anyhow::Result<()> {
    let states = std::iter::once(None).chain(EventKind::ALL.into_iter().map(Some));

    let rows: Vec<TransitionRow> = states
        .filter(|state| *state != Some(EventKind::VariantChanged))
        .map(|state| TransitionRow {
            from: state.map_or("(none)", |s| s.as_str()).to_string(),
            to: transition::permitted(state)
                .iter()
                .map(EventKind::as_str)
                .collect::<Vec<_>>()
                .join(", "),
        })
        .collect();

    println!("{}", format_rows(&rows, format)?);
    Ok(())
}

#[derive(Debug, Serialize, Tabled)]
struct BackoffRow {
    failures: u32,
    min_ms: u128,
    max_ms: u128,
}

/// Print the backoff bounds after each failed attempt
pub fn backoff(attempts: u32, format: &str) -> anyhow::Result<()> {
    let rows: Vec<BackoffRow> = (1..=attempts)
        .map(|failures| {
            let (min, max) = transport::backoff_bounds(failures);
            BackoffRow {
                failures,
                min_ms: min.as_millis(),
                max_ms: max.as_millis(),
            }
        })
        .collect();

    println!("{}", format_rows(&rows, format)?);
    if attempts > transport::MAX_RETRIES {
        println!(
            "Note: delivery gives up after {} retries",
            transport::MAX_RETRIES
        );
    }
    Ok(())
}

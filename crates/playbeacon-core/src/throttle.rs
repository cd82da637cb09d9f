//! Chunk beacon throttling and response header filtering
//!
//! Bounds beacon volume during bursts such as manifest refetch storms.
//! Beacons over the limit are dropped, not delayed.

use crate::{
    config::ThrottleConfig,
    types::{ChunkEventKind, ChunkRequest},
};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Response headers forwarded on chunk beacons
pub const ALLOWED_HEADERS: [&str; 4] = ["x-cdn", "content-type", "server", "x-request-id"];

/// Header carrying the request correlation id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Rolling-window rate limiter with one counter per chunk beacon category
#[derive(Debug)]
pub struct ThrottleGate {
    config: ThrottleConfig,
    /// Start of the current window, `None` until the first beacon
    window_start_ms: Option<i64>,
    /// Length of the current window
    window_len_ms: i64,
    completed: u32,
    canceled: u32,
    failed: u32,
}

impl ThrottleGate {
    pub fn new(config: ThrottleConfig) -> Self {
        let window_len_ms = config.min_window_ms;
        Self {
            config,
            window_start_ms: None,
            window_len_ms,
            completed: 0,
            canceled: 0,
            failed: 0,
        }
    }

    /// Decide whether a beacon for `request` may go out now
    pub fn should_emit(&mut self, request: &ChunkRequest, category: ChunkEventKind) -> bool {
        self.should_emit_at(request, category, Utc::now().timestamp_millis())
    }

    /// Same as [`should_emit`](Self::should_emit) with an explicit clock
    pub fn should_emit_at(
        &mut self,
        request: &ChunkRequest,
        category: ChunkEventKind,
        now_ms: i64,
    ) -> bool {
        self.window_len_ms = request
            .media_duration
            .filter(|d| *d >= self.config.min_window_ms)
            .unwrap_or(self.config.min_window_ms);

        let window_elapsed = match self.window_start_ms {
            Some(start) => now_ms - start > self.window_len_ms,
            None => true,
        };
        if window_elapsed {
            self.window_start_ms = Some(now_ms);
            self.completed = 0;
            self.canceled = 0;
            self.failed = 0;
        }

        match category {
            ChunkEventKind::RequestCompleted => self.completed += 1,
            ChunkEventKind::RequestCanceled => self.canceled += 1,
            ChunkEventKind::RequestFailed => self.failed += 1,
        }

        let max = self.config.max_events_per_window;
        let allowed = self.completed <= max && self.canceled <= max && self.failed <= max;
        if !allowed {
            debug!(
                task_id = request.task_id,
                category = %category,
                window_ms = self.window_len_ms,
                "Chunk beacon throttled"
            );
        }
        allowed
    }

    /// Zero the counters and forget the window
    pub fn reset(&mut self) {
        self.window_start_ms = None;
        self.window_len_ms = self.config.min_window_ms;
        self.completed = 0;
        self.canceled = 0;
        self.failed = 0;
    }
}

/// Reduce response headers to the allow-list.
///
/// Names and values are lower-cased; multiple values are joined with `", "`.
pub fn filter_headers(headers: &HashMap<String, Vec<String>>) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter(|(name, values)| {
            !values.is_empty()
                && ALLOWED_HEADERS
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(name))
        })
        .map(|(name, values)| (name.to_ascii_lowercase(), values.join(", ").to_lowercase()))
        .collect()
}

/// Attach filtered headers and the correlation id to a chunk record
pub fn apply_headers(request: &mut ChunkRequest, headers: &HashMap<String, Vec<String>>) {
    let filtered = filter_headers(headers);
    request.request_id = filtered.get(REQUEST_ID_HEADER).cloned();
    request.response_headers = Some(filtered);
}

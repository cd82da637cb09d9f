//! Playback lifecycle state machine
//!
//! Turns a noisy stream of candidate events into one coherent timeline.
//! Candidates not permitted by the transition table are dropped; this is
//! how duplicate and out-of-order engine callbacks are filtered out.

use crate::{
    sink::DispatchSink,
    transition,
    types::{Dispatch, EventKind, PlaybackEvent},
};
use std::sync::Arc;
use tracing::{debug, trace};

/// Lifecycle state machine feeding a dispatch sink
pub struct EventStateMachine {
    /// Last accepted resting state, `None` before the first event
    state: Option<EventKind>,
    /// Where accepted events go
    sink: Arc<dyn DispatchSink>,
}

impl EventStateMachine {
    pub fn new(sink: Arc<dyn DispatchSink>) -> Self {
        Self { state: None, sink }
    }

    /// Current resting state
    pub fn state(&self) -> Option<EventKind> {
        self.state
    }

    /// Submit a candidate event, returning whether it was accepted.
    ///
    /// Accepted events are forwarded to the sink. `VariantChanged` is an
    /// overlay: it is forwarded but never becomes the resting state.
    pub fn submit(&mut self, event: PlaybackEvent) -> bool {
        if !transition::can_transition(self.state, event.kind) {
            debug!(
                from = ?self.state.map(|s| s.as_str()),
                to = %event.kind,
                "Transition rejected"
            );
            return false;
        }

        if event.kind != EventKind::VariantChanged {
            self.state = Some(event.kind);
        }

        trace!(event = %event.kind, position_ms = ?event.position_ms, "Transition accepted");
        self.sink.dispatch(Dispatch::Playback(event));
        true
    }

    /// Return to the uninitialized state
    pub fn reset(&mut self) {
        self.state = None;
    }
}

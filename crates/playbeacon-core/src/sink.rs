//! Dispatch sinks
//!
//! The sink is the hand-off point to the analytics backend. It must return
//! immediately: network delivery happens elsewhere.

use crate::types::Dispatch;
use tokio::sync::mpsc;
use tracing::debug;

/// Receiver of accepted lifecycle events and chunk beacons
pub trait DispatchSink: Send + Sync {
    fn dispatch(&self, dispatch: Dispatch);
}

/// Sink forwarding dispatches over an unbounded channel
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Dispatch>,
}

impl ChannelSink {
    /// Create a sink and the receiving end of its channel
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Dispatch>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl DispatchSink for ChannelSink {
    fn dispatch(&self, dispatch: Dispatch) {
        if self.tx.send(dispatch).is_err() {
            debug!("Dispatch receiver dropped");
        }
    }
}

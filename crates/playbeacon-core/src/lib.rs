//! PlayBeacon Core - Playback telemetry for media players
//!
//! This crate turns raw playback engine callbacks into telemetry:
//! - Lifecycle event classification through a transition table
//! - Chunk (manifest, init and media segment) download tracking
//! - Throttled chunk beacons with response header filtering
//! - Beacon delivery with bounded exponential-backoff retry
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        PlayBeacon Core                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │                    ┌──────────────────┐                         │
//! │                    │ Telemetry Session│ ◄── engine callbacks    │
//! │                    └────────┬─────────┘                         │
//! │              ┌──────────────┴──────────────┐                    │
//! │      ┌───────┴───────┐             ┌───────┴───────┐            │
//! │      │  Event State  │             │     Chunk     │            │
//! │      │    Machine    │             │    Tracker    │            │
//! │      └───────┬───────┘             └───────┬───────┘            │
//! │              │                     ┌───────┴───────┐            │
//! │              │                     │ Throttle Gate │            │
//! │              │                     └───────┬───────┘            │
//! │              └──────────────┬──────────────┘                    │
//! │                    ┌────────┴─────────┐                         │
//! │                    │  Beacon Emitter  │                         │
//! │                    └────────┬─────────┘                         │
//! │                    ┌────────┴─────────┐                         │
//! │                    │ Beacon Transport │ ──► collector           │
//! │                    └──────────────────┘                         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod types;
pub mod config;
pub mod transition;
pub mod sink;
pub mod state_machine;
pub mod chunk;
pub mod throttle;
pub mod transport;
pub mod beacon;
pub mod callback;
pub mod session;

pub use error::{Error, Result};
pub use types::*;
pub use config::{DeviceInfo, PlayerInfo, SessionConfig, TelemetryConfig, ThrottleConfig};
pub use sink::{ChannelSink, DispatchSink};
pub use state_machine::EventStateMachine;
pub use chunk::{ChunkTracker, LoadError, LoadStart};
pub use throttle::{filter_headers, ThrottleGate};
pub use transport::{backoff, BeaconRequest, BeaconTransport, HttpExecutor, Method, ReqwestExecutor};
pub use beacon::{BeaconEmitter, BeaconRecord};
pub use callback::{DiscontinuityReason, EngineCallback, EngineState};
pub use session::{PlaybackEngine, TelemetrySession};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the telemetry library
pub fn init() {
    tracing::info!(version = VERSION, "PlayBeacon Core initialized");
}

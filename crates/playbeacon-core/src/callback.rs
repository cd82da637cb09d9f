//! Raw playback engine callbacks
//!
//! Every engine notification the session reacts to, as one closed enum.
//! Serde support lets recorded callback logs be replayed.

use crate::{chunk::LoadError, types::*};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Engine playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Idle,
    Buffering,
    Ready,
    Ended,
}

/// Why the playhead jumped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscontinuityReason {
    AutoTransition,
    Seek,
    SeekAdjustment,
    Skip,
    Remove,
    Internal,
}

/// Response headers as delivered by the engine, one entry per header name
pub type ResponseHeaders = HashMap<String, Vec<String>>;

/// One notification from the playback engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "callback", rename_all = "snake_case")]
pub enum EngineCallback {
    PlaybackStateChanged {
        state: EngineState,
        play_when_ready: bool,
    },
    PlayWhenReadyChanged {
        play_when_ready: bool,
    },
    SeekStarted {
        position_ms: i64,
    },
    PositionDiscontinuity {
        reason: DiscontinuityReason,
        old_position_ms: i64,
        new_position_ms: i64,
    },
    TracksChanged {
        groups: Vec<TrackGroup>,
    },
    /// Format of the media now being rendered downstream
    DownstreamFormatChanged {
        format: TrackFormat,
    },
    VideoSizeChanged {
        width: u32,
        height: u32,
    },
    VideoInputFormatChanged {
        format: TrackFormat,
    },
    VideoDecoderInitialized {
        decoder_name: String,
    },
    DroppedFrames {
        count: u64,
    },
    TimelineChanged {
        window_start_ms: Option<i64>,
        duration_ms: Option<i64>,
    },
    PlayerError {
        code: i32,
        message: String,
    },
    LoadStarted {
        task_id: u64,
        uri: String,
        data_type: DataType,
        media_start_ms: Option<i64>,
        media_end_ms: Option<i64>,
        format: Option<TrackFormat>,
    },
    LoadCompleted {
        task_id: u64,
        uri: String,
        bytes_loaded: u64,
        format: Option<TrackFormat>,
        #[serde(default)]
        response_headers: ResponseHeaders,
    },
    LoadCanceled {
        task_id: u64,
        uri: String,
        #[serde(default)]
        response_headers: ResponseHeaders,
    },
    LoadError {
        task_id: u64,
        uri: String,
        error: LoadError,
        #[serde(default)]
        response_headers: ResponseHeaders,
    },
}

impl EngineCallback {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            EngineCallback::PlaybackStateChanged { .. } => "playback_state_changed",
            EngineCallback::PlayWhenReadyChanged { .. } => "play_when_ready_changed",
            EngineCallback::SeekStarted { .. } => "seek_started",
            EngineCallback::PositionDiscontinuity { .. } => "position_discontinuity",
            EngineCallback::TracksChanged { .. } => "tracks_changed",
            EngineCallback::DownstreamFormatChanged { .. } => "downstream_format_changed",
            EngineCallback::VideoSizeChanged { .. } => "video_size_changed",
            EngineCallback::VideoInputFormatChanged { .. } => "video_input_format_changed",
            EngineCallback::VideoDecoderInitialized { .. } => "video_decoder_initialized",
            EngineCallback::DroppedFrames { .. } => "dropped_frames",
            EngineCallback::TimelineChanged { .. } => "timeline_changed",
            EngineCallback::PlayerError { .. } => "player_error",
            EngineCallback::LoadStarted { .. } => "load_started",
            EngineCallback::LoadCompleted { .. } => "load_completed",
            EngineCallback::LoadCanceled { .. } => "load_canceled",
            EngineCallback::LoadError { .. } => "load_error",
        }
    }

    /// Whether this callback belongs to the chunk lifecycle
    pub fn is_load(&self) -> bool {
        matches!(
            self,
            EngineCallback::LoadStarted { .. }
                | EngineCallback::LoadCompleted { .. }
                | EngineCallback::LoadCanceled { .. }
                | EngineCallback::LoadError { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_state_change() {
        let callback: EngineCallback = serde_json::from_str(
            r#"{"callback": "playback_state_changed", "state": "ready", "play_when_ready": true}"#,
        )
        .unwrap();
        assert_eq!(
            callback,
            EngineCallback::PlaybackStateChanged {
                state: EngineState::Ready,
                play_when_ready: true,
            }
        );
        assert!(!callback.is_load());
    }

    #[test]
    fn test_deserialize_load_without_headers() {
        let callback: EngineCallback = serde_json::from_str(
            r#"{"callback": "load_canceled", "task_id": 7, "uri": "https://cdn.example.com/a.ts"}"#,
        )
        .unwrap();
        match callback {
            EngineCallback::LoadCanceled {
                task_id,
                response_headers,
                ..
            } => {
                assert_eq!(task_id, 7);
                assert!(response_headers.is_empty());
            }
            other => panic!("unexpected callback: {other:?}"),
        }
    }

    #[test]
    fn test_names() {
        let callback = EngineCallback::DroppedFrames { count: 3 };
        assert_eq!(callback.name(), "dropped_frames");
    }
}

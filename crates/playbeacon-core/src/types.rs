//! Core types for PlayBeacon

use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Unique identifier for one playback view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViewId(pub Uuid);

impl ViewId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ViewId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ViewId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Semantic playback lifecycle events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    Play,
    Playing,
    Pause,
    Buffering,
    Buffered,
    Seeking,
    Seeked,
    Ended,
    VariantChanged,
    Error,
}

impl EventKind {
    /// Every event kind, in declaration order
    pub const ALL: [EventKind; 10] = [
        EventKind::Play,
        EventKind::Playing,
        EventKind::Pause,
        EventKind::Buffering,
        EventKind::Buffered,
        EventKind::Seeking,
        EventKind::Seeked,
        EventKind::Ended,
        EventKind::VariantChanged,
        EventKind::Error,
    ];

    /// Wire name used by the collector
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Play => "play",
            EventKind::Playing => "playing",
            EventKind::Pause => "pause",
            EventKind::Buffering => "buffering",
            EventKind::Buffered => "buffered",
            EventKind::Seeking => "seeking",
            EventKind::Seeked => "seeked",
            EventKind::Ended => "ended",
            EventKind::VariantChanged => "variantChanged",
            EventKind::Error => "error",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine error attached to an `Error` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: i32,
    pub message: String,
}

/// A classified playback event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackEvent {
    pub kind: EventKind,
    /// Playhead position in milliseconds
    pub position_ms: Option<i64>,
    /// Present only on `Error`
    pub error: Option<ErrorDetail>,
}

impl PlaybackEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            position_ms: None,
            error: None,
        }
    }

    /// Create an `Error` event carrying the engine's code and message
    pub fn error(code: i32, message: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Error,
            position_ms: None,
            error: Some(ErrorDetail {
                code,
                message: message.into(),
            }),
        }
    }

    /// Attach a playhead position
    pub fn at(mut self, position_ms: Option<i64>) -> Self {
        self.position_ms = position_ms;
        self
    }
}

impl From<EventKind> for PlaybackEvent {
    fn from(kind: EventKind) -> Self {
        Self::new(kind)
    }
}

/// Engine-level data type of a load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Manifest,
    MediaInitialization,
    Media,
    Other,
}

/// Classified kind of a chunk request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Manifest,
    VideoInit,
    AudioInit,
    Media,
}

/// Format of a track as reported by the engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackFormat {
    pub sample_mime_type: Option<String>,
    pub container_mime_type: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Bitrate in bits per second
    pub bitrate: Option<u64>,
    pub frame_rate: Option<f32>,
    pub codecs: Option<String>,
}

impl TrackFormat {
    /// True when width, height and bitrate all match
    pub fn same_variant(&self, other: &TrackFormat) -> bool {
        self.width == other.width && self.height == other.height && self.bitrate == other.bitrate
    }
}

/// A group of alternative formats for one track
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackGroup {
    pub formats: Vec<TrackFormat>,
}

impl TrackGroup {
    /// Whether this group carries video, judged by its first format
    pub fn is_video(&self) -> bool {
        self.formats
            .first()
            .and_then(|f| f.container_mime_type.as_deref())
            .is_some_and(|mime| mime.contains("video"))
    }
}

/// One selectable video rendition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenditionDescriptor {
    pub bitrate: u64,
    pub width: u32,
    pub height: u32,
    pub codec: Option<String>,
    pub fps: u32,
}

impl From<&TrackFormat> for RenditionDescriptor {
    fn from(format: &TrackFormat) -> Self {
        Self {
            bitrate: format.bitrate.unwrap_or(0),
            width: format.width.unwrap_or(0),
            height: format.height.unwrap_or(0),
            codec: format.codecs.clone(),
            fps: format.frame_rate.map(|f| f as u32).unwrap_or(0),
        }
    }
}

/// One manifest, init-segment or media-segment download
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkRequest {
    pub task_id: u64,
    /// Milliseconds since the Unix epoch
    pub response_start: Option<i64>,
    /// Milliseconds since the Unix epoch
    pub response_end: Option<i64>,
    pub media_start_time: Option<i64>,
    /// Nominal media duration, set for media segments only
    pub media_duration: Option<i64>,
    pub video_width: Option<u32>,
    pub video_height: Option<u32>,
    /// Path of the request, without the query
    pub url: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<RequestKind>,
    pub host: Option<String>,
    pub bytes_loaded: Option<u64>,
    /// Index of the matched format within its track group
    pub current_level: Option<usize>,
    pub labeled_bitrate: Option<u64>,
    pub error: Option<String>,
    pub error_code: Option<i32>,
    pub error_text: Option<String>,
    pub cancel: Option<String>,
    /// Correlation id taken from `x-request-id`
    pub request_id: Option<String>,
    pub response_headers: Option<BTreeMap<String, String>>,
    pub renditions: Option<Vec<RenditionDescriptor>>,
}

impl ChunkRequest {
    /// Blank record for a task whose start was never seen
    pub fn blank(task_id: u64) -> Self {
        Self {
            task_id,
            ..Default::default()
        }
    }
}

/// Terminal chunk outcomes that produce beacons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChunkEventKind {
    RequestCompleted,
    RequestCanceled,
    RequestFailed,
}

impl ChunkEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkEventKind::RequestCompleted => "requestCompleted",
            ChunkEventKind::RequestCanceled => "requestCanceled",
            ChunkEventKind::RequestFailed => "requestFailed",
        }
    }
}

impl std::fmt::Display for ChunkEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything handed to the analytics backend
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    Playback(PlaybackEvent),
    Chunk {
        kind: ChunkEventKind,
        request: ChunkRequest,
    },
}

impl Dispatch {
    /// Wire name of the dispatched event
    pub fn event_name(&self) -> &'static str {
        match self {
            Dispatch::Playback(event) => event.kind.as_str(),
            Dispatch::Chunk { kind, .. } => kind.as_str(),
        }
    }

    pub fn position_ms(&self) -> Option<i64> {
        match self {
            Dispatch::Playback(event) => event.position_ms,
            Dispatch::Chunk { .. } => None,
        }
    }

    /// The playback event kind, if this is a lifecycle dispatch
    pub fn playback_kind(&self) -> Option<EventKind> {
        match self {
            Dispatch::Playback(event) => Some(event.kind),
            Dispatch::Chunk { .. } => None,
        }
    }
}

#[derive(Serialize)]
struct DispatchBody<'a> {
    event: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    position_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a ErrorDetail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    request: Option<&'a ChunkRequest>,
}

impl Serialize for Dispatch {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let body = match self {
            Dispatch::Playback(event) => DispatchBody {
                event: self.event_name(),
                position_ms: event.position_ms,
                error: event.error.as_ref(),
                request: None,
            },
            Dispatch::Chunk { request, .. } => DispatchBody {
                event: self.event_name(),
                position_ms: None,
                error: None,
                request: Some(request),
            },
        };
        body.serialize(serializer)
    }
}

/// Current source characteristics, fed by format and size callbacks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub advertised_bitrate: Option<u64>,
    pub advertised_frame_rate: Option<f32>,
    pub codec: Option<String>,
    pub mime_type: Option<String>,
    pub decoder_name: Option<String>,
    pub duration_ms: Option<i64>,
    pub dropped_frames: u64,
}

/// Dispatch counters for the current view or program
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewStats {
    /// Playback events and chunk beacons
    pub events_sent: u64,
    pub play_events_sent: u64,
    pub pause_events_sent: u64,
}

impl ViewStats {
    /// Count an accepted playback event
    pub fn record_playback(&mut self, kind: EventKind) {
        self.events_sent += 1;
        match kind {
            EventKind::Play => self.play_events_sent += 1,
            EventKind::Pause => self.pause_events_sent += 1,
            _ => {}
        }
    }

    /// Count a chunk beacon that passed the throttle
    pub fn record_chunk(&mut self) {
        self.events_sent += 1;
    }
}

/// Timeline window snapshot shared with the position poller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineWindow {
    pub window_start_ms: Option<i64>,
    pub duration_ms: Option<i64>,
    pub position_ms: i64,
}

impl TimelineWindow {
    /// Wall-clock program time of the playhead, when the window start is known
    pub fn program_time_ms(&self) -> Option<i64> {
        self.window_start_ms.map(|start| start + self.position_ms)
    }
}

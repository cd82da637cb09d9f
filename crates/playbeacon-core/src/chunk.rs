//! Chunk lifecycle tracking
//!
//! Keeps one record per in-flight download, keyed by the engine's load task
//! id, from load start until its single terminal callback.

use crate::types::*;
use chrono::Utc;
use std::collections::HashMap;
use tracing::debug;

/// Cancellation reason stamped on every canceled chunk
pub const CANCEL_REASON: &str = "FragLoadEmergencyAborted";

/// Error code stamped on every failed chunk
pub const LOAD_ERROR_CODE: i32 = -1;

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Describes a load as it starts
#[derive(Debug, Clone)]
pub struct LoadStart<'a> {
    pub task_id: u64,
    pub media_start_ms: Option<i64>,
    pub media_end_ms: Option<i64>,
    pub url: &'a str,
    pub data_type: DataType,
    pub host: &'a str,
    pub mime_type: &'a str,
}

/// Registry of in-flight chunk requests
#[derive(Debug, Default)]
pub struct ChunkTracker {
    /// In-flight requests by task id
    in_flight: HashMap<u64, ChunkRequest>,
    /// Every track group from the last track change, used for level matching
    available_tracks: Vec<TrackGroup>,
    /// Video renditions from the last track change
    renditions: Option<Vec<RenditionDescriptor>>,
    /// Current source size, stamped on new requests
    video_size: (Option<u32>, Option<u32>),
}

impl ChunkTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of requests between start and terminal callback
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Last known video renditions
    pub fn renditions(&self) -> Option<&[RenditionDescriptor]> {
        self.renditions.as_deref()
    }

    /// Update the source size stamped on subsequent requests
    pub fn set_video_size(&mut self, width: Option<u32>, height: Option<u32>) {
        self.video_size = (width, height);
    }

    /// Register a starting load, overwriting any record with the same id
    pub fn on_load_started(&mut self, load: LoadStart<'_>) -> ChunkRequest {
        let mut request = ChunkRequest {
            task_id: load.task_id,
            response_start: Some(now_ms()),
            media_start_time: load.media_start_ms,
            video_width: self.video_size.0,
            video_height: self.video_size.1,
            url: Some(load.url.to_string()),
            host: Some(load.host.to_string()),
            renditions: self.renditions.clone(),
            ..Default::default()
        };

        request.kind = match load.data_type {
            DataType::Manifest => Some(RequestKind::Manifest),
            DataType::MediaInitialization if load.mime_type.contains("video") => {
                Some(RequestKind::VideoInit)
            }
            DataType::MediaInitialization if load.mime_type.contains("audio") => {
                Some(RequestKind::AudioInit)
            }
            DataType::MediaInitialization => None,
            DataType::Media | DataType::Other => Some(RequestKind::Media),
        };

        if request.kind == Some(RequestKind::Media) {
            request.media_duration = match (load.media_start_ms, load.media_end_ms) {
                // Unset engine times sit near i64::MIN
                (Some(start), Some(end)) => end.checked_sub(start).filter(|d| *d >= 0),
                _ => None,
            };
        }

        self.in_flight.insert(load.task_id, request.clone());
        request
    }

    /// Finish a load. Returns `None` if its start was never seen.
    pub fn on_load_completed(
        &mut self,
        task_id: u64,
        bytes_loaded: u64,
        format: Option<&TrackFormat>,
    ) -> Option<ChunkRequest> {
        let Some(mut request) = self.in_flight.remove(&task_id) else {
            debug!(task_id, "Load completed without a recorded start");
            return None;
        };

        request.bytes_loaded = Some(bytes_loaded);
        request.response_end = Some(now_ms());

        if let Some(format) = format {
            request.current_level = self.match_level(format);
            request.labeled_bitrate = format.bitrate;
        }

        Some(request)
    }

    /// Cancel a load, synthesizing a record if its start was missed
    pub fn on_load_canceled(&mut self, task_id: u64) -> ChunkRequest {
        let mut request = self.take_or_blank(task_id);
        request.cancel = Some(CANCEL_REASON.to_string());
        request.response_end = Some(now_ms());
        request
    }

    /// Fail a load, synthesizing a record if its start was missed
    pub fn on_load_error(&mut self, task_id: u64, error: &LoadError) -> ChunkRequest {
        let mut request = self.take_or_blank(task_id);
        request.error = Some(error.to_string());
        request.error_code = Some(LOAD_ERROR_CODE);
        request.error_text = Some(error.message.clone());
        request.response_end = Some(now_ms());
        request
    }

    /// Replace the known track set.
    ///
    /// Renditions come from the first video group only, in engine order.
    pub fn on_tracks_changed(&mut self, groups: Vec<TrackGroup>) {
        if let Some(video) = groups.iter().find(|g| g.is_video()) {
            self.renditions = Some(video.formats.iter().map(RenditionDescriptor::from).collect());
        }
        self.available_tracks = groups;
    }

    /// Forget every in-flight request and track snapshot
    pub fn clear(&mut self) {
        self.in_flight.clear();
        self.available_tracks.clear();
        self.renditions = None;
        self.video_size = (None, None);
    }

    fn take_or_blank(&mut self, task_id: u64) -> ChunkRequest {
        self.in_flight.remove(&task_id).unwrap_or_else(|| {
            debug!(task_id, "Terminal load callback without a recorded start");
            ChunkRequest::blank(task_id)
        })
    }

    fn match_level(&self, format: &TrackFormat) -> Option<usize> {
        self.available_tracks.iter().find_map(|group| {
            group
                .formats
                .iter()
                .position(|candidate| candidate.same_variant(format))
        })
    }
}

/// I/O failure reported by the engine for a load
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LoadError {
    /// Engine-side error class, e.g. `HttpDataSourceException`
    pub kind: String,
    pub message: String,
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start(task_id: u64, data_type: DataType, mime: &'static str) -> LoadStart<'static> {
        LoadStart {
            task_id,
            media_start_ms: Some(4_000),
            media_end_ms: Some(10_000),
            url: "/video/seg1.ts",
            data_type,
            host: "cdn.example.com",
            mime_type: mime,
        }
    }

    fn format(width: u32, height: u32, bitrate: u64) -> TrackFormat {
        TrackFormat {
            container_mime_type: Some("video/mp2t".into()),
            width: Some(width),
            height: Some(height),
            bitrate: Some(bitrate),
            frame_rate: Some(29.97),
            codecs: Some("avc1.64001f".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_classification() {
        let mut tracker = ChunkTracker::new();

        let manifest = tracker.on_load_started(start(1, DataType::Manifest, "unknown"));
        assert_eq!(manifest.kind, Some(RequestKind::Manifest));
        assert_eq!(manifest.media_duration, None);

        let video_init = tracker.on_load_started(start(2, DataType::MediaInitialization, "video/avc"));
        assert_eq!(video_init.kind, Some(RequestKind::VideoInit));

        let audio_init = tracker.on_load_started(start(3, DataType::MediaInitialization, "audio/mp4a-latm"));
        assert_eq!(audio_init.kind, Some(RequestKind::AudioInit));

        let unknown_init = tracker.on_load_started(start(4, DataType::MediaInitialization, "unknown"));
        assert_eq!(unknown_init.kind, None);

        let media = tracker.on_load_started(start(5, DataType::Media, "video/avc"));
        assert_eq!(media.kind, Some(RequestKind::Media));
        assert_eq!(media.media_duration, Some(6_000));

        assert_eq!(tracker.in_flight(), 5);
    }

    #[test]
    fn test_unset_media_times_leave_duration_empty() {
        let mut tracker = ChunkTracker::new();

        let unset = tracker.on_load_started(LoadStart {
            media_start_ms: Some(-9_223_372_036_854_775_807),
            media_end_ms: Some(6_000),
            ..start(1, DataType::Media, "video/avc")
        });
        assert_eq!(unset.kind, Some(RequestKind::Media));
        assert_eq!(unset.media_duration, None);

        let reversed = tracker.on_load_started(LoadStart {
            media_start_ms: Some(6_000),
            media_end_ms: Some(0),
            ..start(2, DataType::Media, "video/avc")
        });
        assert_eq!(reversed.media_duration, None);
    }

    #[test]
    fn test_completed_evicts() {
        let mut tracker = ChunkTracker::new();
        tracker.on_load_started(start(9, DataType::Media, "video/avc"));

        let done = tracker.on_load_completed(9, 512_000, None).unwrap();
        assert_eq!(done.bytes_loaded, Some(512_000));
        assert!(done.response_end.is_some());
        assert_eq!(tracker.in_flight(), 0);

        assert!(tracker.on_load_completed(9, 1, None).is_none());
    }

    #[test]
    fn test_completed_unknown_is_absent() {
        let mut tracker = ChunkTracker::new();
        assert!(tracker.on_load_completed(404, 100, None).is_none());
    }

    #[test]
    fn test_canceled_and_failed_tolerate_missing_start() {
        let mut tracker = ChunkTracker::new();

        let canceled = tracker.on_load_canceled(11);
        assert_eq!(canceled.task_id, 11);
        assert_eq!(canceled.cancel.as_deref(), Some(CANCEL_REASON));
        assert!(canceled.url.is_none());

        let error = LoadError {
            kind: "HttpDataSourceException".into(),
            message: "connection reset".into(),
        };
        let failed = tracker.on_load_error(12, &error);
        assert_eq!(failed.error_code, Some(-1));
        assert_eq!(failed.error_text.as_deref(), Some("connection reset"));
        assert_eq!(failed.error.as_deref(), Some("HttpDataSourceException: connection reset"));
    }

    #[test]
    fn test_terminal_events_evict() {
        let mut tracker = ChunkTracker::new();
        tracker.on_load_started(start(1, DataType::Media, "video/avc"));
        tracker.on_load_started(start(2, DataType::Media, "video/avc"));

        let canceled = tracker.on_load_canceled(1);
        assert_eq!(canceled.url.as_deref(), Some("/video/seg1.ts"));
        tracker.on_load_error(
            2,
            &LoadError {
                kind: "IOException".into(),
                message: "eof".into(),
            },
        );
        assert_eq!(tracker.in_flight(), 0);
    }

    #[test]
    fn test_renditions_and_level_matching() {
        let mut tracker = ChunkTracker::new();
        let audio = TrackGroup {
            formats: vec![TrackFormat {
                container_mime_type: Some("audio/mp4".into()),
                bitrate: Some(128_000),
                ..Default::default()
            }],
        };
        let video = TrackGroup {
            formats: vec![format(640, 360, 800_000), format(1280, 720, 2_500_000), format(1920, 1080, 5_000_000)],
        };
        tracker.on_tracks_changed(vec![audio, video]);

        let renditions = tracker.renditions().unwrap();
        assert_eq!(renditions.len(), 3);
        assert_eq!(renditions[1].width, 1280);
        assert_eq!(renditions[1].fps, 29);

        let started = tracker.on_load_started(start(3, DataType::Media, "video/avc"));
        assert_eq!(started.renditions.as_ref().map(Vec::len), Some(3));

        let done = tracker
            .on_load_completed(3, 1_000, Some(&format(1280, 720, 2_500_000)))
            .unwrap();
        assert_eq!(done.current_level, Some(1));
        assert_eq!(done.labeled_bitrate, Some(2_500_000));

        tracker.on_load_started(start(4, DataType::Media, "video/avc"));
        let unmatched = tracker
            .on_load_completed(4, 1_000, Some(&format(320, 180, 200_000)))
            .unwrap();
        assert_eq!(unmatched.current_level, None);
    }

    #[test]
    fn test_video_size_stamped() {
        let mut tracker = ChunkTracker::new();
        tracker.set_video_size(Some(1920), Some(1080));
        let request = tracker.on_load_started(start(1, DataType::Media, "video/avc"));
        assert_eq!(request.video_width, Some(1920));
        assert_eq!(request.video_height, Some(1080));
    }
}

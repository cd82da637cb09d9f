//! Telemetry Session - adapts engine callbacks into telemetry
//!
//! Coordinates:
//! - Lifecycle event classification and the pending variant change
//! - Chunk lifecycle tracking, header filtering and throttling
//! - Source characteristics and the shared timeline snapshot
//! - The position poller and teardown

use crate::{
    beacon::BeaconEmitter,
    callback::{DiscontinuityReason, EngineCallback, EngineState, ResponseHeaders},
    chunk::{ChunkTracker, LoadStart},
    config::SessionConfig,
    sink::DispatchSink,
    state_machine::EventStateMachine,
    throttle::{apply_headers, ThrottleGate},
    transport::BeaconTransport,
    types::*,
    Error, Result,
};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Read access to the playback engine
pub trait PlaybackEngine: Send + Sync {
    /// Current playhead position in milliseconds
    fn position_ms(&self) -> i64;

    /// Content duration in milliseconds, if known
    fn duration_ms(&self) -> Option<i64>;
}

struct PositionPoller {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl PositionPoller {
    fn spawn(
        engine: Weak<dyn PlaybackEngine>,
        timeline: Arc<Mutex<TimelineWindow>>,
        interval: Duration,
    ) -> Option<Self> {
        let runtime = tokio::runtime::Handle::try_current().ok()?;
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(engine) = engine.upgrade() else { break };
                        timeline.lock().position_ms = engine.position_ms();
                    }
                }
            }
            debug!("Position poller stopped");
        });

        Some(Self { cancel, handle })
    }

    fn stop(self) {
        self.cancel.cancel();
        self.handle.abort();
    }
}

/// Telemetry for a single playback view
pub struct TelemetrySession {
    /// View ID
    id: ViewId,
    /// Session configuration
    config: SessionConfig,
    /// Lifecycle state machine
    machine: EventStateMachine,
    /// In-flight chunk registry
    tracker: ChunkTracker,
    /// Chunk beacon rate limiter
    throttle: ThrottleGate,
    /// Where accepted events and chunk beacons go
    sink: Arc<dyn DispatchSink>,
    /// Set when the sink is the beacon emitter
    emitter: Option<Arc<BeaconEmitter>>,
    /// Shut down on release
    transport: Option<BeaconTransport>,
    /// Current source characteristics
    source: SourceInfo,
    /// Timeline snapshot shared with the position poller
    timeline: Arc<Mutex<TimelineWindow>>,
    /// Engine handle, dropped on release
    engine: Option<Arc<dyn PlaybackEngine>>,
    poller: Option<PositionPoller>,
    /// A rejected variant change waiting for the next accepted `Play`
    pending_variant: bool,
    seeking: bool,
    buffering: bool,
    ended: bool,
    /// Take the mime type from downstream formats until a manifest is seen
    detect_mime_type: bool,
    /// Last reported engine state
    engine_state: Option<EngineState>,
    /// Forward `PlayerError` callbacks
    automatic_error_tracking: bool,
    stats: ViewStats,
    released: bool,
}

impl TelemetrySession {
    /// Create a session dispatching into `sink`
    pub fn new(config: SessionConfig, sink: Arc<dyn DispatchSink>) -> Result<Self> {
        config.validate()?;
        let throttle = ThrottleGate::new(config.telemetry.throttle.clone());

        Ok(Self {
            id: ViewId::new(),
            machine: EventStateMachine::new(Arc::clone(&sink)),
            tracker: ChunkTracker::new(),
            throttle,
            sink,
            emitter: None,
            transport: None,
            source: SourceInfo::default(),
            timeline: Arc::new(Mutex::new(TimelineWindow::default())),
            engine: None,
            poller: None,
            pending_variant: false,
            seeking: false,
            buffering: false,
            ended: false,
            detect_mime_type: true,
            engine_state: None,
            automatic_error_tracking: config.telemetry.automatic_error_tracking,
            stats: ViewStats::default(),
            released: false,
            config,
        })
    }

    /// Create a session posting beacons through `transport`
    pub fn with_transport(config: SessionConfig, transport: BeaconTransport) -> Result<Self> {
        config.validate()?;
        let emitter = Arc::new(BeaconEmitter::spawn(&config, transport.clone())?);
        let sink: Arc<dyn DispatchSink> = emitter.clone();

        let mut session = Self::new(config, sink)?;
        session.id = emitter.view_id();
        session.emitter = Some(emitter);
        session.transport = Some(transport);
        Ok(session)
    }

    /// Create a session posting beacons over HTTP
    pub fn http(config: SessionConfig) -> Result<Self> {
        Self::with_transport(config, BeaconTransport::http()?)
    }

    /// Get view ID
    pub fn id(&self) -> ViewId {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current lifecycle state
    pub fn state(&self) -> Option<EventKind> {
        self.machine.state()
    }

    pub fn source(&self) -> &SourceInfo {
        &self.source
    }

    /// Copy of the timeline snapshot
    pub fn timeline(&self) -> TimelineWindow {
        *self.timeline.lock()
    }

    /// Number of chunk requests awaiting a terminal callback
    pub fn in_flight_chunks(&self) -> usize {
        self.tracker.in_flight()
    }

    pub fn has_pending_variant(&self) -> bool {
        self.pending_variant
    }

    /// Whether playback reached the end and no seek followed
    pub fn has_ended(&self) -> bool {
        self.ended
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Dispatch counters since the last video or program change
    pub fn stats(&self) -> ViewStats {
        self.stats
    }

    /// Turn forwarding of engine `PlayerError` callbacks on or off.
    /// Errors passed to [`report_error`](Self::report_error) are always sent.
    pub fn set_automatic_error_tracking(&mut self, enabled: bool) {
        self.automatic_error_tracking = enabled;
    }

    /// Submit an `Error` event on behalf of the host
    pub fn report_error(&mut self, code: i32, message: impl Into<String>) -> bool {
        if self.released {
            debug!("Error reported after release dropped");
            return false;
        }
        let position = self.position();
        self.submit(PlaybackEvent::error(code, message).at(position))
    }

    /// Attach the engine and start polling its position
    pub fn attach_engine(&mut self, engine: Arc<dyn PlaybackEngine>) {
        if self.released {
            debug!("Engine attached after release, ignoring");
            return;
        }
        if let Some(poller) = self.poller.take() {
            poller.stop();
        }

        let interval = Duration::from_millis(self.config.telemetry.position_poll_interval_ms);
        self.poller = PositionPoller::spawn(Arc::downgrade(&engine), Arc::clone(&self.timeline), interval);
        if self.poller.is_none() {
            debug!("No tokio runtime, position polling disabled");
        }
        self.engine = Some(engine);
    }

    /// Handle one engine callback
    #[instrument(level = "trace", skip_all, fields(callback = callback.name()))]
    pub fn handle(&mut self, callback: EngineCallback) {
        if self.released {
            debug!(callback = callback.name(), "Callback after release dropped");
            return;
        }

        match callback {
            EngineCallback::PlaybackStateChanged {
                state,
                play_when_ready,
            } => self.on_engine_state(state, play_when_ready),

            EngineCallback::PlayWhenReadyChanged { play_when_ready } => {
                if let Some(state) = self.engine_state {
                    self.on_engine_state(state, play_when_ready);
                }
            }

            EngineCallback::SeekStarted { position_ms } => self.on_seek(position_ms),

            EngineCallback::PositionDiscontinuity {
                reason,
                old_position_ms,
                new_position_ms,
            } => {
                if reason == DiscontinuityReason::Seek {
                    self.on_seek(old_position_ms);
                }
                self.timeline.lock().position_ms = new_position_ms;
            }

            EngineCallback::TracksChanged { groups } => {
                if let Some(mime) = groups
                    .iter()
                    .find(|g| g.is_video())
                    .and_then(|g| g.formats.first())
                    .and_then(|f| f.container_mime_type.clone())
                {
                    self.source.mime_type = Some(mime);
                }
                self.tracker.on_tracks_changed(groups);
            }

            EngineCallback::DownstreamFormatChanged { format } => {
                if self.detect_mime_type {
                    if let Some(mime) = format.container_mime_type {
                        self.source.mime_type = Some(mime);
                    }
                }
            }

            EngineCallback::VideoSizeChanged { width, height } => {
                if width > 0 && height > 0 {
                    self.source.width = Some(width);
                    self.source.height = Some(height);
                    self.tracker.set_video_size(Some(width), Some(height));
                    self.emit(EventKind::VariantChanged);
                }
            }

            EngineCallback::VideoInputFormatChanged { format } => {
                self.source.advertised_bitrate = format.bitrate;
                self.source.advertised_frame_rate = format.frame_rate;
                self.source.codec = format.codecs;
            }

            EngineCallback::VideoDecoderInitialized { decoder_name } => {
                self.source.decoder_name = Some(decoder_name);
            }

            EngineCallback::DroppedFrames { count } => {
                self.source.dropped_frames = self.source.dropped_frames.saturating_add(count);
            }

            EngineCallback::TimelineChanged {
                window_start_ms,
                duration_ms,
            } => {
                {
                    let mut timeline = self.timeline.lock();
                    timeline.window_start_ms = window_start_ms;
                    timeline.duration_ms = duration_ms;
                }
                self.source.duration_ms = duration_ms;
            }

            EngineCallback::PlayerError { code, message } => {
                if !self.automatic_error_tracking {
                    debug!(code, "Automatic error tracking off, player error dropped");
                } else if self.machine.state() != Some(EventKind::Error) {
                    let position = self.position();
                    self.submit(PlaybackEvent::error(code, message).at(position));
                }
            }

            EngineCallback::LoadStarted {
                task_id,
                uri,
                data_type,
                media_start_ms,
                media_end_ms,
                format,
            } => {
                let Some((host, url)) = self.load_target(&uri) else {
                    return;
                };
                if data_type == DataType::Manifest {
                    self.detect_mime_type = false;
                }
                let mime_type = format
                    .as_ref()
                    .and_then(|f| f.sample_mime_type.as_deref())
                    .unwrap_or("unknown");

                self.tracker.on_load_started(LoadStart {
                    task_id,
                    media_start_ms,
                    media_end_ms,
                    url: &url,
                    data_type,
                    host: &host,
                    mime_type,
                });
            }

            EngineCallback::LoadCompleted {
                task_id,
                uri,
                bytes_loaded,
                format,
                response_headers,
            } => {
                if self.load_target(&uri).is_none() {
                    return;
                }
                if let Some(request) =
                    self.tracker
                        .on_load_completed(task_id, bytes_loaded, format.as_ref())
                {
                    self.emit_chunk(ChunkEventKind::RequestCompleted, request, &response_headers);
                }
            }

            EngineCallback::LoadCanceled {
                task_id,
                uri,
                response_headers,
            } => {
                let Some(target) = self.load_target(&uri) else {
                    return;
                };
                let request = with_target(self.tracker.on_load_canceled(task_id), target);
                self.emit_chunk(ChunkEventKind::RequestCanceled, request, &response_headers);
            }

            EngineCallback::LoadError {
                task_id,
                uri,
                error,
                response_headers,
            } => {
                let Some(target) = self.load_target(&uri) else {
                    return;
                };
                let request = with_target(self.tracker.on_load_error(task_id, &error), target);
                self.emit_chunk(ChunkEventKind::RequestFailed, request, &response_headers);
            }
        }
    }

    /// Reset per-video state while keeping the session alive
    pub fn video_change(&mut self) {
        if self.released {
            return;
        }
        info!(view_id = %self.id, "Video changed");

        self.machine.reset();
        self.tracker.clear();
        self.throttle.reset();
        self.pending_variant = false;
        self.seeking = false;
        self.buffering = false;
        self.ended = false;
        self.detect_mime_type = true;
        self.engine_state = None;
        self.source = SourceInfo::default();
        self.stats = ViewStats::default();
        *self.timeline.lock() = TimelineWindow::default();
    }

    /// Start a new program within the same view. Lifecycle state, in-flight
    /// chunks and source characteristics carry over.
    pub fn program_change(&mut self) {
        if self.released {
            return;
        }
        info!(view_id = %self.id, "Program changed");

        self.detect_mime_type = true;
        self.stats = ViewStats::default();
        *self.timeline.lock() = TimelineWindow::default();
    }

    /// Tear the session down. Later callbacks are dropped.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        self.pending_variant = false;
        self.machine.reset();
        self.tracker.clear();
        self.throttle.reset();
        self.engine = None;
        if let Some(poller) = self.poller.take() {
            poller.stop();
        }
        if let Some(transport) = &self.transport {
            transport.shutdown();
        }

        info!(view_id = %self.id, "Telemetry session released");
    }

    /// Wait for queued beacons to be delivered or abandoned
    pub async fn flush(&self) {
        if let Some(emitter) = &self.emitter {
            emitter.flush().await;
        }
    }

    fn on_engine_state(&mut self, state: EngineState, play_when_ready: bool) {
        self.engine_state = Some(state);

        match state {
            EngineState::Buffering => {
                if play_when_ready {
                    self.emit(EventKind::Play);
                }
                if !self.seeking && !self.buffering {
                    self.buffering = true;
                    self.emit(EventKind::Buffering);
                }
            }
            EngineState::Ready => {
                if self.buffering {
                    self.buffering = false;
                    self.emit(EventKind::Buffered);
                }
                if self.seeking {
                    self.seeking = false;
                    self.emit(EventKind::Seeked);
                }
                if play_when_ready {
                    if self.machine.state() != Some(EventKind::Seeked) {
                        self.emit(EventKind::Play);
                    }
                    self.emit(EventKind::Playing);
                } else {
                    self.emit(EventKind::Pause);
                }
            }
            EngineState::Ended => {
                self.ended = true;
                let duration = self.content_duration();
                self.submit(PlaybackEvent::new(EventKind::Pause).at(duration));
                self.submit(PlaybackEvent::new(EventKind::Ended).at(duration));
            }
            EngineState::Idle => {
                if matches!(
                    self.machine.state(),
                    Some(EventKind::Play | EventKind::Playing)
                ) {
                    self.emit(EventKind::Pause);
                }
            }
        }
    }

    fn on_seek(&mut self, old_position_ms: i64) {
        if self.seeking {
            return;
        }
        self.seeking = true;
        if !self.ended {
            self.submit(PlaybackEvent::new(EventKind::Pause).at(Some(old_position_ms)));
        }
        self.ended = false;
        self.submit(PlaybackEvent::new(EventKind::Seeking).at(Some(old_position_ms)));
    }

    fn emit(&mut self, kind: EventKind) -> bool {
        let position = self.position();
        self.submit(PlaybackEvent::new(kind).at(position))
    }

    /// Submit through the state machine, maintaining the pending variant slot
    fn submit(&mut self, event: PlaybackEvent) -> bool {
        let kind = event.kind;
        let position = event.position_ms;
        let accepted = self.machine.submit(event);
        if accepted {
            self.stats.record_playback(kind);
        }

        match kind {
            EventKind::VariantChanged if !accepted => {
                if !self.pending_variant {
                    debug!("Variant change deferred until play");
                }
                self.pending_variant = true;
            }
            EventKind::Play if accepted && self.pending_variant => {
                self.pending_variant = false;
                if self
                    .machine
                    .submit(PlaybackEvent::new(EventKind::VariantChanged).at(position))
                {
                    self.stats.record_playback(EventKind::VariantChanged);
                }
            }
            _ => {}
        }
        accepted
    }

    fn emit_chunk(
        &mut self,
        kind: ChunkEventKind,
        mut request: ChunkRequest,
        headers: &ResponseHeaders,
    ) {
        apply_headers(&mut request, headers);
        if self.throttle.should_emit(&request, kind) {
            self.stats.record_chunk();
            self.sink.dispatch(Dispatch::Chunk { kind, request });
        }
    }

    fn load_target(&self, uri: &str) -> Option<(String, String)> {
        match parse_load_uri(uri) {
            Ok(target) => Some(target),
            Err(e) => {
                warn!(error = %e, "Skipping load callback");
                None
            }
        }
    }

    fn position(&self) -> Option<i64> {
        Some(self.timeline.lock().position_ms)
    }

    fn content_duration(&self) -> Option<i64> {
        self.engine
            .as_ref()
            .and_then(|engine| engine.duration_ms())
            .or(self.source.duration_ms)
    }
}

impl Drop for TelemetrySession {
    fn drop(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.stop();
        }
    }
}

impl std::fmt::Debug for TelemetrySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetrySession")
            .field("id", &self.id)
            .field("state", &self.machine.state())
            .field("in_flight", &self.tracker.in_flight())
            .field("released", &self.released)
            .finish()
    }
}

/// Split a load URI into host and path. The query never reaches a beacon.
pub fn parse_load_uri(uri: &str) -> Result<(String, String)> {
    let url = Url::parse(uri).map_err(|source| Error::InvalidUri {
        uri: uri.to_string(),
        source,
    })?;
    let host = url
        .host_str()
        .ok_or_else(|| Error::MissingHost {
            uri: uri.to_string(),
        })?
        .to_string();

    Ok((host, url.path().to_string()))
}

/// Fill url and host on records synthesized without a start
fn with_target(mut request: ChunkRequest, (host, url): (String, String)) -> ChunkRequest {
    request.host.get_or_insert(host);
    request.url.get_or_insert(url);
    request
}

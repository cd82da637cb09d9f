//! Beacon emission
//!
//! Wraps each dispatch in a sequenced record and hands it to the transport
//! from a background task, so the engine thread never waits on I/O.

use crate::{
    config::{DeviceInfo, PlayerInfo, SessionConfig},
    sink::DispatchSink,
    transport::{collector_url, BeaconTransport},
    types::{Dispatch, ViewId},
    Error, Result,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

/// A dispatch with its view metadata, as posted to the collector
#[derive(Debug, Clone, Serialize)]
pub struct BeaconRecord {
    /// Unique beacon id
    pub id: Uuid,
    pub view_id: ViewId,
    pub timestamp: DateTime<Utc>,
    /// Per-view sequence number, starting at 1
    pub sequence: u64,
    pub workspace_id: String,
    pub viewer_id: String,
    pub player: PlayerInfo,
    pub device: DeviceInfo,
    #[serde(flatten)]
    pub dispatch: Dispatch,
}

enum Command {
    Record(Box<BeaconRecord>),
    Flush(oneshot::Sender<()>),
}

/// Dispatch sink posting every record to the collector
pub struct BeaconEmitter {
    view_id: ViewId,
    sequence: AtomicU64,
    workspace_id: String,
    viewer_id: String,
    player: PlayerInfo,
    device: DeviceInfo,
    log_events: bool,
    tx: mpsc::Sender<Command>,
}

impl BeaconEmitter {
    /// Start the delivery task on the current tokio runtime
    pub fn spawn(config: &SessionConfig, transport: BeaconTransport) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| Error::NoRuntime)?;
        let endpoint = match &config.collector {
            Some(url) => url.clone(),
            None => collector_url(&config.workspace_id, &config.beacon_domain)?,
        };
        let (tx, rx) = mpsc::channel(config.telemetry.channel_capacity);

        runtime.spawn(run_delivery(rx, transport, endpoint, config.headers.clone()));

        Ok(Self {
            view_id: ViewId::new(),
            sequence: AtomicU64::new(0),
            workspace_id: config.workspace_id.clone(),
            viewer_id: config.viewer_id.clone(),
            player: config.player.clone(),
            device: config.device.clone(),
            log_events: config.telemetry.enable_logging,
            tx,
        })
    }

    pub fn view_id(&self) -> ViewId {
        self.view_id
    }

    /// Number of records produced so far
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Wait until every record queued so far has been delivered or abandoned
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Command::Flush(done_tx)).await.is_err() {
            return;
        }
        let _ = done_rx.await;
    }

    fn record(&self, dispatch: Dispatch) -> BeaconRecord {
        BeaconRecord {
            id: Uuid::new_v4(),
            view_id: self.view_id,
            timestamp: Utc::now(),
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst) + 1,
            workspace_id: self.workspace_id.clone(),
            viewer_id: self.viewer_id.clone(),
            player: self.player.clone(),
            device: self.device.clone(),
            dispatch,
        }
    }
}

impl DispatchSink for BeaconEmitter {
    fn dispatch(&self, dispatch: Dispatch) {
        let record = self.record(dispatch);

        if self.log_events {
            info!(
                event = record.dispatch.event_name(),
                sequence = record.sequence,
                "Dispatching event"
            );
        } else {
            debug!(
                event = record.dispatch.event_name(),
                sequence = record.sequence,
                "Dispatching event"
            );
        }

        match self.tx.try_send(Command::Record(Box::new(record))) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Beacon queue full, dropping beacon");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Beacon delivery stopped, dropping beacon");
            }
        }
    }
}

async fn run_delivery(
    mut rx: mpsc::Receiver<Command>,
    transport: BeaconTransport,
    endpoint: Url,
    headers: BTreeMap<String, String>,
) {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Record(record) => match serde_json::to_string(&record) {
                Ok(body) => transport.post(endpoint.clone(), body, headers.clone()),
                Err(e) => warn!(error = %e, "Failed to serialize beacon"),
            },
            Command::Flush(done) => {
                transport.flush().await;
                let _ = done.send(());
            }
        }
    }
    debug!("Beacon delivery task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{BeaconRequest, HttpExecutor};
    use crate::types::{EventKind, PlaybackEvent};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct RecordingExecutor {
        requests: Mutex<Vec<BeaconRequest>>,
    }

    #[async_trait]
    impl HttpExecutor for RecordingExecutor {
        async fn execute(&self, request: &BeaconRequest) -> Result<()> {
            self.requests.lock().push(request.clone());
            Ok(())
        }
    }

    fn config() -> SessionConfig {
        let mut config = SessionConfig {
            workspace_id: "ws1".to_string(),
            viewer_id: "viewer-9".to_string(),
            ..Default::default()
        };
        config
            .headers
            .insert("x-api-key".to_string(), "secret".to_string());
        config
    }

    #[tokio::test]
    async fn test_records_are_sequenced_and_posted() {
        let executor = Arc::new(RecordingExecutor::default());
        let transport = BeaconTransport::new(executor.clone());
        let emitter = BeaconEmitter::spawn(&config(), transport).unwrap();

        emitter.dispatch(Dispatch::Playback(PlaybackEvent::new(EventKind::Play).at(Some(0))));
        emitter.dispatch(Dispatch::Playback(EventKind::Playing.into()));
        emitter.flush().await;

        assert_eq!(emitter.sequence(), 2);
        let requests = executor.requests.lock().clone();
        assert_eq!(requests.len(), 2);

        let first = &requests[0];
        assert_eq!(first.url.host_str(), Some("ws1.metrix.example.io"));
        assert_eq!(first.headers.get("x-api-key").map(String::as_str), Some("secret"));

        let mut bodies: Vec<serde_json::Value> = requests
            .iter()
            .map(|r| serde_json::from_str(r.body.as_deref().unwrap()).unwrap())
            .collect();
        bodies.sort_by_key(|b| b["sequence"].as_u64());
        assert_eq!(bodies[0]["event"], "play");
        assert_eq!(bodies[0]["sequence"], 1);
        assert_eq!(bodies[0]["workspace_id"], "ws1");
        assert_eq!(bodies[1]["event"], "playing");
        assert_eq!(bodies[1]["view_id"], emitter.view_id().to_string());
    }

    #[tokio::test]
    async fn test_explicit_collector_wins() {
        let executor = Arc::new(RecordingExecutor::default());
        let mut config = config();
        config.collector = Some(Url::parse("http://localhost:9000/beacons").unwrap());
        let emitter = BeaconEmitter::spawn(&config, BeaconTransport::new(executor.clone())).unwrap();

        emitter.dispatch(Dispatch::Playback(EventKind::Play.into()));
        emitter.flush().await;

        let requests = executor.requests.lock();
        assert_eq!(requests[0].url.as_str(), "http://localhost:9000/beacons");
    }

    #[test]
    fn test_spawn_requires_runtime() {
        let transport = BeaconTransport::new(Arc::new(RecordingExecutor::default()));
        assert!(matches!(
            BeaconEmitter::spawn(&config(), transport),
            Err(Error::NoRuntime)
        ));
    }
}

//! Beacon transport
//!
//! Executes beacons with bounded exponential-backoff retry. Delivery runs on
//! spawned tasks; callers never wait on the network.

use crate::{Error, Result};
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, instrument, warn};
use url::Url;

/// Retries after the initial attempt
pub const MAX_RETRIES: u32 = 4;

/// Backoff base for the first retry
pub const BASE_BACKOFF: Duration = Duration::from_millis(5000);

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

pub const READ_TIMEOUT: Duration = Duration::from_secs(20);

/// HTTP method of a beacon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
}

/// One outbound beacon
#[derive(Debug, Clone, PartialEq)]
pub struct BeaconRequest {
    pub method: Method,
    pub url: Url,
    /// JSON body, POST only
    pub body: Option<String>,
    pub headers: BTreeMap<String, String>,
    /// Consecutive failures so far
    pub failure_count: u32,
}

impl BeaconRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::Get,
            url,
            body: None,
            headers: BTreeMap::new(),
            failure_count: 0,
        }
    }

    pub fn post(url: Url, body: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            url,
            body: Some(body.into()),
            headers: BTreeMap::new(),
            failure_count: 0,
        }
    }

    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }
}

/// Performs a single HTTP attempt
#[async_trait]
pub trait HttpExecutor: Send + Sync {
    /// Succeeds only on a 2xx response
    async fn execute(&self, request: &BeaconRequest) -> Result<()>;
}

/// `reqwest`-backed executor with the fixed connect and read timeouts
#[derive(Debug, Clone)]
pub struct ReqwestExecutor {
    client: reqwest::Client,
}

impl ReqwestExecutor {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(READ_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpExecutor for ReqwestExecutor {
    async fn execute(&self, request: &BeaconRequest) -> Result<()> {
        let mut builder = match request.method {
            Method::Get => self.client.get(request.url.clone()),
            Method::Post => self
                .client
                .post(request.url.clone())
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(request.body.clone().unwrap_or_default()),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

/// Delay before the attempt following `failure_count` failures
pub fn backoff(failure_count: u32) -> Duration {
    backoff_with_jitter(failure_count, rand::rng().random::<f64>())
}

/// Backoff with an explicit jitter factor in `[0, 1]`
pub fn backoff_with_jitter(failure_count: u32, jitter: f64) -> Duration {
    if failure_count == 0 {
        return Duration::ZERO;
    }
    let multiplier = 1u32
        .checked_shl(failure_count - 1)
        .unwrap_or(u32::MAX);
    let base = BASE_BACKOFF.saturating_mul(multiplier);
    base.mul_f64(1.0 + jitter.clamp(0.0, 1.0))
}

/// Inclusive lower and upper backoff bounds for `failure_count`
pub fn backoff_bounds(failure_count: u32) -> (Duration, Duration) {
    (
        backoff_with_jitter(failure_count, 0.0),
        backoff_with_jitter(failure_count, 1.0),
    )
}

/// Collector endpoint for a workspace.
///
/// Lower-case alphanumeric workspace ids get their own host, anything else
/// goes to the shared `img` host.
pub fn collector_url(workspace_id: &str, domain: &str) -> Result<Url> {
    let valid_id = !workspace_id.is_empty()
        && workspace_id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    let authority = if valid_id {
        format!("{workspace_id}{domain}")
    } else {
        format!("img{domain}")
    };
    let raw = format!("https://{authority}");
    Url::parse(&raw).map_err(|source| Error::InvalidUri { uri: raw, source })
}

/// Run one beacon to completion, retrying recoverable failures with backoff.
///
/// The backoff wait is the only suspension point besides the attempt itself
/// and returns [`Error::Cancelled`] as soon as `cancel` fires.
#[instrument(skip_all, fields(method = ?request.method, url = %request.url))]
pub async fn deliver(
    executor: &dyn HttpExecutor,
    mut request: BeaconRequest,
    cancel: &CancellationToken,
) -> Result<()> {
    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        match executor.execute(&request).await {
            Ok(()) => {
                debug!(attempts = request.failure_count + 1, "Beacon delivered");
                return Ok(());
            }
            Err(e) if !e.is_recoverable() => {
                warn!(error = %e, code = e.error_code(), "Beacon rejected, not retrying");
                return Err(e);
            }
            Err(e) => {
                request.failure_count += 1;
                if request.failure_count > MAX_RETRIES {
                    warn!(
                        attempts = request.failure_count,
                        error = %e,
                        "Beacon abandoned"
                    );
                    return Err(Error::RetriesExhausted {
                        attempts: request.failure_count,
                    });
                }

                let delay = backoff(request.failure_count);
                debug!(
                    failure_count = request.failure_count,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "Beacon failed, retrying"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

/// Spawns retrying deliveries and tracks them until shutdown
#[derive(Clone)]
pub struct BeaconTransport {
    executor: Arc<dyn HttpExecutor>,
    cancel: CancellationToken,
    tasks: TaskTracker,
}

impl BeaconTransport {
    pub fn new(executor: Arc<dyn HttpExecutor>) -> Self {
        Self {
            executor,
            cancel: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    /// Transport backed by `reqwest`
    pub fn http() -> Result<Self> {
        Ok(Self::new(Arc::new(ReqwestExecutor::new()?)))
    }

    /// Start delivering `request`; the handle resolves to whether it succeeded
    pub fn send(&self, request: BeaconRequest) -> Result<JoinHandle<bool>> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| Error::NoRuntime)?;
        let executor = Arc::clone(&self.executor);
        let cancel = self.cancel.clone();

        Ok(self.tasks.spawn_on(
            async move { deliver(executor.as_ref(), request, &cancel).await.is_ok() },
            &runtime,
        ))
    }

    /// Fire-and-forget GET
    pub fn get(&self, url: Url) {
        if let Err(e) = self.send(BeaconRequest::get(url)) {
            warn!(error = %e, "Beacon not sent");
        }
    }

    /// Fire-and-forget JSON POST
    pub fn post(&self, url: Url, body: impl Into<String>, headers: BTreeMap<String, String>) {
        if let Err(e) = self.send(BeaconRequest::post(url, body).with_headers(headers)) {
            warn!(error = %e, "Beacon not sent");
        }
    }

    /// Abandon in-flight retries. Deliveries waiting in backoff report failure.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.tasks.close();
    }

    pub fn is_shutdown(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait for every spawned delivery to finish
    pub async fn flush(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }
}

impl std::fmt::Debug for BeaconTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeaconTransport")
            .field("in_flight", &self.tasks.len())
            .field("shutdown", &self.cancel.is_cancelled())
            .finish()
    }
}

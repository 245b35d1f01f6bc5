use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{ApiResponse, ApiResult, Gateway, InputFile, Params, Session};
use crate::config::Config;
use crate::error::ClientError;
use crate::router::{CommandHandler, CommandRouter};
use crate::update;
use crate::webhook::{self, WebhookListener};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(15);

/// How updates reach the client. Chosen once per client.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IngestionMode {
    #[default]
    Unset,
    Polling,
    Webhook { url: String },
}

impl fmt::Display for IngestionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestionMode::Unset => write!(f, "unset"),
            IngestionMode::Polling => write!(f, "polling"),
            IngestionMode::Webhook { url } => write!(f, "webhook ({})", url),
        }
    }
}

/// A bot client: owns the session, the handler registry, the polling
/// cursor and, in webhook mode, the listener.
pub struct Client {
    gateway: Gateway,
    router: CommandRouter,
    mode: Mutex<IngestionMode>,
    cursor: AtomicI64,
    retry_delay: Duration,
    listener: Mutex<Option<WebhookListener>>,
    shutdown: CancellationToken,
}

impl Client {
    /// Create a client with its own session
    pub fn new(token: impl Into<String>) -> Result<Self, ClientError> {
        let session = Session::new()?;
        Ok(Self::build(token.into(), session))
    }

    /// Create a client on a caller supplied HTTP client, which is left open
    /// when the client's scope ends.
    pub fn with_session(token: impl Into<String>, http: reqwest::Client) -> Self {
        Self::build(token.into(), Session::external(http))
    }

    pub fn from_config(config: &Config) -> Result<Self, ClientError> {
        Ok(Self::new(config.telegram.bot_token.clone())?
            .with_api_url(&config.telegram.api_url)
            .with_retry_delay(config.polling.retry_delay()))
    }

    fn build(token: String, session: Session) -> Self {
        Self {
            gateway: Gateway::new(Arc::new(session), token),
            router: CommandRouter::new(),
            mode: Mutex::new(IngestionMode::Unset),
            cursor: AtomicI64::new(0),
            retry_delay: DEFAULT_RETRY_DELAY,
            listener: Mutex::new(None),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_api_url(mut self, api_url: impl AsRef<str>) -> Self {
        self.gateway = self.gateway.with_api_url(api_url);
        self
    }

    /// Pause after a failed `getUpdates` before trying the same cursor again
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// A handle for issuing calls, e.g. from inside handlers
    pub fn gateway(&self) -> Gateway {
        self.gateway.clone()
    }

    pub fn register<H>(&mut self, command: &str, handler: H)
    where
        H: CommandHandler + 'static,
    {
        self.router.register(command, handler);
    }

    /// Register a closure for `command` (marker optional)
    pub fn on<F, Fut>(&mut self, command: &str, handler: F)
    where
        F: Fn(i64, Vec<String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.router.on(command, handler);
    }

    pub async fn api_call(&self, method: &str, params: Params) -> ApiResult {
        self.gateway.call(method, params).await
    }

    pub fn mode(&self) -> IngestionMode {
        self.lock_mode().clone()
    }

    /// Next update id to ask for
    pub fn cursor(&self) -> i64 {
        self.cursor.load(Ordering::Acquire)
    }

    /// Cancelling this token stops [`poll`](Self::poll) and
    /// [`run_forever`](Self::run_forever).
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Enter the client's scope. Nothing goes over the network here; the
    /// returned guard releases the session and listener when dropped.
    pub fn enter(&self) -> SessionGuard<'_> {
        debug!("enter");
        SessionGuard {
            client: self,
            released: false,
        }
    }

    fn lock_mode(&self) -> MutexGuard<'_, IngestionMode> {
        self.mode.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_listener(&self) -> MutexGuard<'_, Option<WebhookListener>> {
        self.listener.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Poll `getUpdates` until the shutdown token is cancelled.
    ///
    /// Returns at once, without polling, when webhook mode is active.
    pub async fn poll(&self, interval: Duration) {
        {
            let mut mode = self.lock_mode();
            if let IngestionMode::Webhook { url } = &*mode {
                warn!("Webhook is active at {}, refusing to poll", url);
                return;
            }
            *mode = IngestionMode::Polling;
        }

        info!("Polling for updates every {:?}", interval);
        loop {
            let offset = self.cursor();
            let response = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                response = self.gateway.get_updates(offset) => response,
            };

            let delay = match response.map(ApiResponse::into_result) {
                Ok(Value::Array(updates)) => {
                    self.process_batch(&updates).await;
                    interval
                }
                Ok(other) => {
                    warn!("Malformed response (result: {}), waiting for the api...", other);
                    self.retry_delay
                }
                Err(_) => {
                    debug!("Malformed response, waiting for the api...");
                    self.retry_delay
                }
            };

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        info!("Polling stopped at cursor {}", self.cursor());
    }

    /// Route a batch in delivery order. The cursor moves past each update
    /// before it is routed, so an update that fails to parse is not
    /// fetched again.
    pub(crate) async fn process_batch(&self, updates: &[Value]) {
        for raw in updates {
            let Some(id) = update::update_id(raw) else {
                warn!("Update without an id, skipping: {}", raw);
                continue;
            };
            self.advance_cursor(id.saturating_add(1));
            self.router.route(raw).await;
        }
    }

    fn advance_cursor(&self, next: i64) {
        let previous = self.cursor.fetch_max(next, Ordering::AcqRel);
        if next < previous {
            debug!("Ignoring stale update id {} (cursor at {})", next - 1, previous);
        }
    }

    /// Register `url` and its certificate with the remote side and switch to
    /// webhook mode.
    pub async fn set_webhook(&self, url: &str, certificate: InputFile) -> Result<(), ClientError> {
        {
            let mode = self.lock_mode();
            if *mode != IngestionMode::Unset {
                return Err(ClientError::ModeAlreadySet {
                    current: mode.clone(),
                });
            }
        }
        webhook::webhook_path(url)?;

        self.gateway.set_webhook(url, certificate).await?;

        let mut mode = self.lock_mode();
        if *mode != IngestionMode::Unset {
            return Err(ClientError::ModeAlreadySet {
                current: mode.clone(),
            });
        }
        *mode = IngestionMode::Webhook {
            url: url.to_string(),
        };
        info!("Webhook set to {}", url);
        Ok(())
    }

    /// Start the TLS webhook listener on `0.0.0.0:port`. Requires
    /// [`set_webhook`](Self::set_webhook) to have succeeded.
    pub async fn run_server(
        &self,
        certificate: impl AsRef<Path>,
        key: impl AsRef<Path>,
        port: u16,
    ) -> Result<SocketAddr, ClientError> {
        let url = match &*self.lock_mode() {
            IngestionMode::Webhook { url } => url.clone(),
            _ => return Err(ClientError::WebhookNotConfigured),
        };
        if self.lock_listener().is_some() {
            return Err(ClientError::ListenerActive);
        }

        let path = webhook::webhook_path(&url)?;
        let app = webhook::router(&path, Arc::new(self.router.clone()));
        let listener =
            WebhookListener::bind_tls(app, certificate.as_ref(), key.as_ref(), port).await?;
        let addr = listener.local_addr();

        let mut slot = self.lock_listener();
        if slot.is_some() {
            listener.shutdown();
            return Err(ClientError::ListenerActive);
        }
        *slot = Some(listener);
        info!("Serving webhook updates on {}{}", addr, path);
        Ok(addr)
    }

    /// Wait until the shutdown token is cancelled
    pub async fn run_forever(&self) {
        info!("Running until shutdown is requested");
        self.shutdown.cancelled().await;
        info!("Shutdown requested");
    }

    fn release(&self) {
        if let Some(listener) = self.lock_listener().take() {
            listener.shutdown();
        }
        self.gateway.session().close();
    }

    async fn close(&self) {
        let listener = self.lock_listener().take();
        if let Some(listener) = listener {
            listener.stop().await;
        }
        self.gateway.session().close();
    }
}

/// Scope of a client session; see [`Client::enter`].
///
/// Dropping the guard, whether on normal exit, on an error path or because
/// the surrounding future was cancelled, stops the webhook listener and
/// releases an owned session.
#[must_use = "the session is released as soon as the guard is dropped"]
pub struct SessionGuard<'a> {
    client: &'a Client,
    released: bool,
}

impl SessionGuard<'_> {
    /// Release gracefully, waiting for the listener to drain. If this
    /// future is dropped before it finishes, `Drop` still releases.
    pub async fn close(mut self) {
        self.client.close().await;
        self.released = true;
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.client.release();
        }
    }
}

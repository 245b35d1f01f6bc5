//! Webhook ingress: one POST route that feeds pushed updates into the
//! command router, served over TLS with axum-server.

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::{body::Bytes, extract::State, http::StatusCode, routing::post, Router};
use axum_server::tls_rustls::{bind_rustls, RustlsConfig};
use axum_server::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::ClientError;
use crate::router::CommandRouter;

const GRACEFUL_SHUTDOWN: Duration = Duration::from_secs(5);

/// Route path for a webhook URL: its first non-empty path segment, or `/`.
pub fn webhook_path(url: &str) -> Result<String, ClientError> {
    let invalid = |reason: String| ClientError::InvalidWebhookUrl {
        url: url.to_string(),
        reason,
    };

    let parsed = reqwest::Url::parse(url).map_err(|e| invalid(e.to_string()))?;
    let segment = parsed
        .path_segments()
        .ok_or_else(|| invalid("url cannot carry a path".to_string()))?
        .find(|s| !s.is_empty());

    match segment {
        None => Ok("/".to_string()),
        Some(s) if s.starts_with([':', '*', '{']) => {
            Err(invalid(format!("unsupported path segment '{s}'")))
        }
        Some(s) => Ok(format!("/{s}")),
    }
}

/// The ingress router: POST on `path` only
pub fn router(path: &str, commands: Arc<CommandRouter>) -> Router {
    Router::new()
        .route(path, post(receive))
        .with_state(commands)
}

/// Always acknowledges with an empty 200, routable or not, so the remote
/// never redelivers an update.
async fn receive(State(commands): State<Arc<CommandRouter>>, body: Bytes) -> StatusCode {
    debug!("Webhook update received ({} bytes)", body.len());
    commands.route(&body[..]).await;
    StatusCode::OK
}

/// A running webhook server
pub struct WebhookListener {
    handle: Handle,
    task: JoinHandle<std::io::Result<()>>,
    addr: SocketAddr,
}

impl WebhookListener {
    /// Bind `0.0.0.0:port` with the given PEM certificate and key and start
    /// serving `app` in the background.
    pub async fn bind_tls(
        app: Router,
        certificate: &Path,
        key: &Path,
        port: u16,
    ) -> Result<Self, ClientError> {
        // Fails harmlessly when a provider is already installed
        let _ = rustls::crypto::ring::default_provider().install_default();

        let config = RustlsConfig::from_pem_file(certificate, key)
            .await
            .map_err(ClientError::Tls)?;

        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let handle = Handle::new();
        let server = bind_rustls(addr, config)
            .handle(handle.clone())
            .serve(app.into_make_service());
        Self::start(server, handle, addr).await
    }

    /// Plain HTTP variant, handy behind a TLS terminating proxy and in tests
    pub async fn bind_plain(app: Router, addr: SocketAddr) -> Result<Self, ClientError> {
        let handle = Handle::new();
        let server = axum_server::bind(addr)
            .handle(handle.clone())
            .serve(app.into_make_service());
        Self::start(server, handle, addr).await
    }

    async fn start<F>(server: F, handle: Handle, requested: SocketAddr) -> Result<Self, ClientError>
    where
        F: Future<Output = std::io::Result<()>> + Send + 'static,
    {
        let task = tokio::spawn(server);

        let Some(addr) = handle.listening().await else {
            let source = match task.await {
                Ok(Err(e)) => e,
                _ => std::io::Error::other("listener stopped before accepting connections"),
            };
            return Err(ClientError::Bind {
                addr: requested,
                source,
            });
        };

        info!("Webhook listener bound on {}", addr);
        Ok(Self { handle, task, addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting immediately; in-flight requests are dropped.
    pub fn shutdown(&self) {
        debug!("Shutting down webhook listener on {}", self.addr);
        self.handle.shutdown();
    }

    /// Stop accepting, let in-flight requests finish, and wait for the
    /// server task.
    pub async fn stop(self) {
        self.handle.graceful_shutdown(Some(GRACEFUL_SHUTDOWN));
        match self.task.await {
            Ok(Ok(())) => info!("Webhook listener on {} stopped", self.addr),
            Ok(Err(e)) => error!("Webhook listener on {} failed: {}", self.addr, e),
            Err(e) => error!("Webhook listener task on {} aborted: {}", self.addr, e),
        }
    }
}

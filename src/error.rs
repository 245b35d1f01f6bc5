use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

use crate::client::IngestionMode;

/// Failure of a single remote call.
///
/// The gateway never panics or raises on network-shaped problems; every
/// one of them ends up as one of these variants.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("operation name must not be empty")]
    EmptyMethod,

    #[error("invalid method or token (calling '{method}')")]
    InvalidMethodOrToken { method: String },

    #[error("call to '{method}' failed with status {status}: {}", .description.as_deref().unwrap_or(.body.as_str()))]
    CallFailed {
        method: String,
        status: StatusCode,
        description: Option<String>,
        body: String,
    },

    #[error("request for '{method}' failed")]
    Transport {
        method: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("response for '{method}' is not valid JSON")]
    Decode {
        method: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to read attachment {}", .path.display())]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("session is closed")]
    SessionClosed,

    #[error("failed to build HTTP session")]
    Session(#[source] reqwest::Error),
}

impl ApiError {
    /// HTTP status attached to the failure, if the remote answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::InvalidMethodOrToken { .. } => Some(StatusCode::NOT_FOUND),
            ApiError::CallFailed { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// An update that could not be turned into a routing decision.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("update body is not valid JSON")]
    Json(#[source] serde_json::Error),

    #[error("update has an unexpected shape")]
    Malformed(#[source] serde_json::Error),

    #[error("command message has no chat id")]
    MissingChatId,
}

/// Misconfiguration or startup failure of the client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("ingestion mode is already set to {current}")]
    ModeAlreadySet { current: IngestionMode },

    #[error("webhook mode is not active, call set_webhook first")]
    WebhookNotConfigured,

    #[error("a webhook listener is already running")]
    ListenerActive,

    #[error("invalid webhook url '{url}': {reason}")]
    InvalidWebhookUrl { url: String, reason: String },

    #[error("failed to load TLS certificate or key")]
    Tls(#[source] std::io::Error),

    #[error("failed to bind webhook listener on {addr}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Api(#[from] ApiError),
}

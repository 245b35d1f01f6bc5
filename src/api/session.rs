use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::error::ApiError;

/// The HTTP session every remote call goes through.
///
/// A session built by the client is owned and gets released when the
/// client's scope ends. A session handed in by the caller is borrowed and
/// is never released here.
pub struct Session {
    http: reqwest::Client,
    owned: bool,
    closed: AtomicBool,
}

impl Session {
    /// Create a new owned session
    pub fn new() -> Result<Self, ApiError> {
        debug!("Creating new session");
        let http = reqwest::Client::builder()
            .build()
            .map_err(ApiError::Session)?;
        Ok(Self {
            http,
            owned: true,
            closed: AtomicBool::new(false),
        })
    }

    /// Wrap a caller supplied client
    pub fn external(http: reqwest::Client) -> Self {
        debug!("Using user provided session");
        Self {
            http,
            owned: false,
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_owned(&self) -> bool {
        self.owned
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Release the session. Returns true only for the call that actually
    /// released it; borrowed sessions are never released.
    pub fn close(&self) -> bool {
        if !self.owned {
            debug!("Leaving user provided session open");
            return false;
        }
        let released = !self.closed.swap(true, Ordering::AcqRel);
        if released {
            debug!("Closing session");
        }
        released
    }

    pub(crate) fn http(&self) -> Result<&reqwest::Client, ApiError> {
        if self.is_closed() {
            return Err(ApiError::SessionClosed);
        }
        Ok(&self.http)
    }
}

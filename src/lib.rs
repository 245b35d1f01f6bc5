//! Client for the Telegram Bot API: fetches updates by polling or through a
//! TLS webhook, routes `/command` messages to registered handlers and
//! exposes outbound calls through a single gateway.

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod router;
pub mod update;
pub mod webhook;

#[cfg(test)]
mod testing;

pub use api::{ApiResponse, ApiResult, Gateway, InputFile, Params, Session};
pub use client::{Client, IngestionMode, SessionGuard};
pub use error::{ApiError, ClientError, ParseError};
pub use router::{CommandHandler, CommandRouter};
pub use update::ParsedCommand;

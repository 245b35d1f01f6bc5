use serde::Deserialize;
use serde_json::Value;

use crate::error::ParseError;

/// Leading character that marks a message as a command
pub const COMMAND_MARKER: char = '/';

/// The parts of an inbound update the router looks at.
///
/// Unknown fields are ignored; the Bot API sends many more. The id is read
/// separately through [`update_id`] so undecodable updates still move the
/// cursor.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub chat: Option<Chat>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Chat {
    #[serde(default)]
    pub id: Option<i64>,
}

/// A command message ready for dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    /// Command name without the marker, case preserved
    pub name: String,
    pub args: Vec<String>,
    pub chat_id: i64,
}

/// An update as it arrives: raw request bytes (webhook) or an already
/// decoded JSON object (polling batch entry).
#[derive(Debug, Clone, Copy)]
pub enum RawUpdate<'a> {
    Body(&'a [u8]),
    Decoded(&'a Value),
}

impl<'a> From<&'a [u8]> for RawUpdate<'a> {
    fn from(body: &'a [u8]) -> Self {
        RawUpdate::Body(body)
    }
}

impl<'a> From<&'a Value> for RawUpdate<'a> {
    fn from(value: &'a Value) -> Self {
        RawUpdate::Decoded(value)
    }
}

/// Id of a decoded update, used to advance the polling cursor
pub fn update_id(raw: &Value) -> Option<i64> {
    raw.get("update_id").and_then(Value::as_i64)
}

/// Turn one raw update into a command.
///
/// `Ok(None)` means the update is not routable: no message, no text, or
/// text without the command marker. A command whose chat id is missing is
/// a malformed update and reported as an error.
pub fn parse<'a>(raw: impl Into<RawUpdate<'a>>) -> Result<Option<ParsedCommand>, ParseError> {
    let update: Update = match raw.into() {
        RawUpdate::Body(body) => {
            let value: Value = serde_json::from_slice(body).map_err(ParseError::Json)?;
            Update::deserialize(&value).map_err(ParseError::Malformed)?
        }
        RawUpdate::Decoded(value) => Update::deserialize(value).map_err(ParseError::Malformed)?,
    };

    let Some(message) = update.message else {
        return Ok(None);
    };
    let Some(text) = message.text.as_deref() else {
        return Ok(None);
    };
    if !text.starts_with(COMMAND_MARKER) {
        return Ok(None);
    }

    let mut tokens = text.split_whitespace();
    let name = tokens
        .next()
        .and_then(|t| t.strip_prefix(COMMAND_MARKER))
        .unwrap_or_default()
        .to_string();
    let args = tokens.map(str::to_owned).collect();

    let chat_id = message
        .chat
        .and_then(|c| c.id)
        .ok_or(ParseError::MissingChatId)?;

    Ok(Some(ParsedCommand {
        name,
        args,
        chat_id,
    }))
}

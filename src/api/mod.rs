pub mod methods;
pub mod session;

use std::error::Error as _;
use std::path::PathBuf;
use std::sync::Arc;

use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, error};

use crate::error::ApiError;

pub use session::Session;

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

static NULL: Value = Value::Null;

/// A file attached to a remote call, sent as a multipart part
#[derive(Debug, Clone)]
pub enum InputFile {
    /// Read from disk when the call is made
    Path(PathBuf),
    Memory { name: String, bytes: Vec<u8> },
}

impl InputFile {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        InputFile::Path(path.into())
    }

    pub fn memory(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        InputFile::Memory {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    async fn into_part(self) -> Result<Part, ApiError> {
        match self {
            InputFile::Path(path) => {
                let bytes = tokio::fs::read(&path)
                    .await
                    .map_err(|source| ApiError::Attachment {
                        path: path.clone(),
                        source,
                    })?;
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "file".to_string());
                Ok(Part::bytes(bytes).file_name(name))
            }
            InputFile::Memory { name, bytes } => Ok(Part::bytes(bytes).file_name(name)),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ParamValue {
    Text(String),
    File(InputFile),
}

/// Ordered parameters of a remote call
#[derive(Debug, Clone, Default)]
pub struct Params {
    fields: Vec<(String, ParamValue)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.fields
            .push((key.into(), ParamValue::Text(value.to_string())));
        self
    }

    pub fn file(mut self, key: impl Into<String>, file: InputFile) -> Self {
        self.fields.push((key.into(), ParamValue::File(file)));
        self
    }

    /// Calls carrying a file go out as multipart POST instead of GET
    pub fn has_files(&self) -> bool {
        self.fields
            .iter()
            .any(|(_, v)| matches!(v, ParamValue::File(_)))
    }
}

/// Decoded body of a successful call (`ok` was true)
#[derive(Debug, Clone)]
pub struct ApiResponse {
    body: Value,
}

impl ApiResponse {
    /// The `result` field, or null when the remote sent none
    pub fn result(&self) -> &Value {
        self.body.get("result").unwrap_or(&NULL)
    }

    pub fn into_result(mut self) -> Value {
        self.body
            .get_mut("result")
            .map(Value::take)
            .unwrap_or(Value::Null)
    }

    pub fn body(&self) -> &Value {
        &self.body
    }
}

pub type ApiResult = Result<ApiResponse, ApiError>;

/// Issues named Bot API operations over the client's session.
///
/// Cheap to clone; handlers keep their own copy to send replies.
#[derive(Clone)]
pub struct Gateway {
    session: Arc<Session>,
    token: Arc<str>,
    api_url: Arc<str>,
}

impl Gateway {
    pub fn new(session: Arc<Session>, token: impl Into<String>) -> Self {
        Self {
            session,
            token: Arc::from(token.into()),
            api_url: Arc::from(DEFAULT_API_URL),
        }
    }

    pub fn with_api_url(mut self, api_url: impl AsRef<str>) -> Self {
        self.api_url = Arc::from(api_url.as_ref().trim_end_matches('/'));
        self
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.token, method)
    }

    /// Perform one remote call. Every failure is logged once and returned
    /// as an [`ApiError`]; nothing here is retried.
    pub async fn call(&self, method: &str, params: Params) -> ApiResult {
        debug!("Calling telegram api '{}'", method);
        let result = self.send(method, params).await;
        if let Err(e) = &result {
            match e.source() {
                Some(cause) => error!("Error in the api call: {}: {}", e, cause),
                None => error!("Error in the api call: {}", e),
            }
        }
        result
    }

    async fn send(&self, method: &str, params: Params) -> ApiResult {
        if method.is_empty() {
            return Err(ApiError::EmptyMethod);
        }
        let http = self.session.http()?;
        let url = self.endpoint(method);

        let request = if params.has_files() {
            let mut form = Form::new();
            for (key, value) in params.fields {
                form = match value {
                    ParamValue::Text(text) => form.text(key, text),
                    ParamValue::File(file) => form.part(key, file.into_part().await?),
                };
            }
            http.post(&url).multipart(form)
        } else {
            let query: Vec<(String, String)> = params
                .fields
                .into_iter()
                .filter_map(|(key, value)| match value {
                    ParamValue::Text(text) => Some((key, text)),
                    ParamValue::File(_) => None,
                })
                .collect();
            http.get(&url).query(&query)
        };

        // The URL carries the token, keep it out of errors and logs
        let transport = |source: reqwest::Error| ApiError::Transport {
            method: method.to_string(),
            source: source.without_url(),
        };

        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::InvalidMethodOrToken {
                method: method.to_string(),
            });
        }

        let body = response.text().await.map_err(transport)?;
        let json: Value = match serde_json::from_str(&body) {
            Ok(json) => json,
            Err(source) if status == StatusCode::OK => {
                return Err(ApiError::Decode {
                    method: method.to_string(),
                    source,
                })
            }
            Err(_) => {
                return Err(ApiError::CallFailed {
                    method: method.to_string(),
                    status,
                    description: None,
                    body,
                })
            }
        };

        let ok = json.get("ok").and_then(Value::as_bool).unwrap_or(false);
        if status != StatusCode::OK || !ok {
            let description = json
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_owned);
            return Err(ApiError::CallFailed {
                method: method.to_string(),
                status,
                description,
                body,
            });
        }

        Ok(ApiResponse { body: json })
    }
}

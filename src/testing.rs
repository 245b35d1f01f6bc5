//! In-process stand-in for the Bot API, used by unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header::CONTENT_TYPE, HeaderMap, Method, StatusCode},
    routing::any,
    Router,
};
use serde_json::{json, Value};

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub token: String,
    pub method: String,
    pub verb: Method,
    pub query: HashMap<String, String>,
    pub content_type: Option<String>,
    pub body: Bytes,
}

type Responder = Arc<dyn Fn(&RecordedCall) -> (StatusCode, String) + Send + Sync>;

#[derive(Clone)]
struct MockState {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    responder: Responder,
}

pub struct MockApi {
    pub url: String,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl MockApi {
    pub async fn spawn<F>(responder: F) -> Self
    where
        F: Fn(&RecordedCall) -> (StatusCode, String) + Send + Sync + 'static,
    {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let state = MockState {
            calls: calls.clone(),
            responder: Arc::new(responder),
        };
        let app = Router::new()
            .route("/{bot}/{method}", any(record))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{addr}"),
            calls,
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, method: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.method == method)
            .collect()
    }
}

async fn record(
    State(state): State<MockState>,
    Path((bot, method)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    verb: Method,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    let call = RecordedCall {
        token: bot.trim_start_matches("bot").to_string(),
        method,
        verb,
        query,
        content_type: headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned),
        body,
    };
    let reply = (state.responder)(&call);
    state.calls.lock().unwrap().push(call);
    reply
}

/// A successful Bot API envelope around `result`
pub fn ok(result: Value) -> (StatusCode, String) {
    (
        StatusCode::OK,
        json!({ "ok": true, "result": result }).to_string(),
    )
}

/// A raw update carrying a text message in chat `chat_id`
pub fn text_update(update_id: i64, chat_id: i64, text: &str) -> Value {
    json!({
        "update_id": update_id,
        "message": {
            "message_id": update_id,
            "chat": { "id": chat_id, "type": "private" },
            "text": text,
        }
    })
}

//! HTTP + WebSocket job transport.
//!
//! - `POST {base}/api/backtest/start` -> `{"task_id": ...}`
//! - `POST {base}/api/backtest/{id}/stop`
//! - `ws(s)://{host}/ws/backtest/{id}` streams `{"type","data"}` text records.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bkt_config::ClientSettings;
use bkt_schemas::{SessionConfig, SessionEvent, TaskId};
use futures_util::stream::{self, Stream, StreamExt};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, warn};

use crate::transport::{EventStream, JobTransport, StartError, StreamError};

#[derive(Serialize)]
struct StartRequest<'a> {
    strategy_code: &'a str,
    #[serde(flatten)]
    config: &'a SessionConfig,
}

#[derive(Deserialize)]
struct StartResponse {
    task_id: String,
}

/// Error body shape used by the server: `{"detail": "..."}`. Validation
/// failures carry a structured `detail` instead of a string.
#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<Value>,
}

impl ErrorBody {
    fn message(self) -> Option<String> {
        match self.detail? {
            Value::String(s) if !s.trim().is_empty() => Some(s),
            Value::String(_) | Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

/// Shared reqwest client honouring the configured timeouts.
pub(crate) fn build_http_client(settings: &ClientSettings) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(settings.connect_timeout())
        .timeout(settings.request_timeout())
        .build()
        .context("build http client")
}

/// Parse `server_url` into a base URL that path segments can be appended to.
pub(crate) fn parse_base_url(server_url: &str) -> Result<Url> {
    let url = Url::parse(server_url).with_context(|| format!("invalid server url: {server_url}"))?;
    if url.cannot_be_a_base() {
        return Err(anyhow!("server url cannot carry a path: {server_url}"));
    }
    Ok(url)
}

/// `base` with `segments` appended, each percent-encoded as one segment.
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: Url,
    ws_base_url: Url,
    connect_timeout: Duration,
}

impl HttpTransport {
    pub fn from_settings(settings: &ClientSettings) -> Result<Self> {
        let base_url = parse_base_url(&settings.server_url)?;
        let mut ws_base_url = base_url.clone();
        let ws_scheme = if base_url.scheme() == "https" { "wss" } else { "ws" };
        ws_base_url
            .set_scheme(ws_scheme)
            .map_err(|_| anyhow!("cannot derive websocket url from {}", settings.server_url))?;

        Ok(Self {
            http: build_http_client(settings)?,
            base_url,
            ws_base_url,
            connect_timeout: settings.connect_timeout(),
        })
    }

    /// Transport against `server_url` with default timeouts.
    pub fn new(server_url: &str) -> Result<Self> {
        Self::from_settings(&ClientSettings {
            server_url: server_url.to_string(),
            ..ClientSettings::default()
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn event_url(&self, task_id: &TaskId) -> Url {
        endpoint(&self.ws_base_url, &["ws", "backtest", task_id.as_str()])
    }
}

#[async_trait]
impl JobTransport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn start_job(&self, code: &str, config: &SessionConfig) -> Result<TaskId, StartError> {
        let url = endpoint(&self.base_url, &["api", "backtest", "start"]);
        let body = StartRequest {
            strategy_code: code,
            config,
        };

        let resp = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| StartError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(ErrorBody::message)
                .unwrap_or_else(|| {
                    format!("Failed to start backtest (HTTP {})", status.as_u16())
                });
            return Err(StartError::Rejected {
                status: Some(status.as_u16()),
                message,
            });
        }

        let parsed: StartResponse = resp
            .json()
            .await
            .map_err(|e| StartError::Decode(e.to_string()))?;
        if parsed.task_id.is_empty() {
            return Err(StartError::Decode("empty task_id".to_string()));
        }
        Ok(TaskId::new(parsed.task_id))
    }

    async fn stop_job(&self, task_id: &TaskId) -> Result<()> {
        let url = endpoint(&self.base_url, &["api", "backtest", task_id.as_str(), "stop"]);
        self.http
            .post(url)
            .send()
            .await
            .with_context(|| format!("stop request for task {task_id}"))?
            .error_for_status()
            .with_context(|| format!("stop request for task {task_id}"))?;
        Ok(())
    }

    async fn subscribe(&self, task_id: &TaskId) -> Result<EventStream, StreamError> {
        let url = self.event_url(task_id);
        debug!(%url, "opening event stream");

        let (ws, _resp) =
            tokio::time::timeout(self.connect_timeout, tokio_tungstenite::connect_async(url.as_str()))
                .await
                .map_err(|_| StreamError::Connect("timed out".to_string()))?
                .map_err(|e| StreamError::Connect(e.to_string()))?;

        Ok(ws_events(ws))
    }
}

/// Turn raw WebSocket frames into session events.
///
/// Text records that do not decode are logged and skipped. A close frame or
/// end of input ends the stream; a transport error is yielded once, then the
/// stream ends.
pub(crate) fn ws_events<S>(ws: S) -> EventStream
where
    S: Stream<Item = Result<Message, WsError>> + Unpin + Send + 'static,
{
    stream::unfold(Some(ws), |state| async move {
        let mut ws = state?;
        loop {
            let text = match ws.next().await? {
                Ok(Message::Text(text)) => text,
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => text,
                    Err(_) => {
                        warn!("skipping non-utf8 binary stream record");
                        continue;
                    }
                },
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "event stream closed by server");
                    return None;
                }
                Ok(_) => continue,
                Err(e) => return Some((Err(StreamError::Transport(e.to_string())), None)),
            };
            if let Some(event) = decode_record(&text) {
                return Some((Ok(event), Some(ws)));
            }
        }
    })
    .boxed()
}

fn decode_record(text: &str) -> Option<SessionEvent> {
    match serde_json::from_str::<SessionEvent>(text) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(error = %e, "skipping undecodable stream record");
            None
        }
    }
}

//! HttpTransport against a mock REST server and a local WebSocket server.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bkt_schemas::{SessionConfig, SessionEvent, SessionStatus, TaskId};
use bkt_session::{HttpTransport, JobTransport, SessionController, StartError, StreamError};
use futures_util::{SinkExt, StreamExt};
use httpmock::prelude::*;
use serde_json::json;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

#[tokio::test]
async fn start_posts_code_and_config() {
    let server = MockServer::start_async().await;
    let start = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/backtest/start")
                .json_body_partial(
                    r#"{"strategy_code":"def main(): pass","period":"1h","basePeriod":"1m","mode":0}"#,
                );
            then.status(200).json_body(json!({ "task_id": "abc123" }));
        })
        .await;

    let t = HttpTransport::new(&server.base_url()).unwrap();
    let id = t
        .start_job("def main(): pass", &SessionConfig::default())
        .await
        .unwrap();
    assert_eq!(id, TaskId::new("abc123"));
    start.assert_async().await;
}

#[tokio::test]
async fn start_rejection_uses_detail() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/backtest/start");
            then.status(429).json_body(json!({ "detail": "rate limited" }));
        })
        .await;

    let t = HttpTransport::new(&server.base_url()).unwrap();
    let err = t
        .start_job("code", &SessionConfig::default())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        StartError::Rejected {
            status: Some(429),
            message: "rate limited".to_string()
        }
    );
}

#[tokio::test]
async fn start_rejection_without_detail_reports_status() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/backtest/start");
            then.status(500).body("internal");
        })
        .await;

    let t = HttpTransport::new(&server.base_url()).unwrap();
    let err = t
        .start_job("code", &SessionConfig::default())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Failed to start backtest (HTTP 500)");
}

#[tokio::test]
async fn stop_posts_to_task_path() {
    let server = MockServer::start_async().await;
    let stop = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/backtest/abc123/stop");
            then.status(200).json_body(json!({ "status": "stopped" }));
        })
        .await;

    let t = HttpTransport::new(&server.base_url()).unwrap();
    t.stop_job(&TaskId::new("abc123")).await.unwrap();
    stop.assert_async().await;
}

#[tokio::test]
async fn subscribe_failure_keeps_handle_for_stop() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/backtest/start");
            then.status(200).json_body(json!({ "task_id": "t9" }));
        })
        .await;
    let stop = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/backtest/t9/stop");
            then.status(200);
        })
        .await;

    // The mock server speaks HTTP only, so the WebSocket upgrade fails.
    let c = SessionController::new(Arc::new(HttpTransport::new(&server.base_url()).unwrap()));
    let s = c.start("code", &SessionConfig::default()).await;
    assert_eq!(s.status, SessionStatus::Error);
    assert_eq!(s.task_id, Some(TaskId::new("t9")));
    assert!(s.error.unwrap().starts_with("event stream connect failed"));

    let s = c.stop().await;
    assert_eq!(s.status, SessionStatus::Idle);
    stop.assert_async().await;
}

/// Serve one WebSocket connection that sends `records` then closes.
async fn serve_once(records: Vec<&'static str>) -> (String, Arc<Mutex<Option<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen_path = Arc::new(Mutex::new(None));
    let seen = seen_path.clone();

    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            *seen.lock().unwrap() = Some(req.uri().path().to_string());
            Ok(resp)
        };
        let mut ws = tokio_tungstenite::accept_hdr_async(tcp, callback)
            .await
            .unwrap();
        for r in records {
            ws.send(Message::Text(r.to_string())).await.unwrap();
        }
        let _ = ws.close(None).await;
    });

    (format!("http://{addr}"), seen_path)
}

#[tokio::test]
async fn event_stream_decodes_records_and_skips_garbage() {
    let (base, seen_path) = serve_once(vec![
        r#"{"type":"progress","data":{"percent":10,"stage":"loading"}}"#,
        "garbage",
        r#"{"type":"complete","data":{"logs_count":2}}"#,
    ])
    .await;

    let t = HttpTransport::new(&base).unwrap();
    let events: Vec<_> = tokio::time::timeout(
        Duration::from_secs(5),
        t.subscribe(&TaskId::new("abc")).await.unwrap().collect::<Vec<_>>(),
    )
    .await
    .unwrap();

    assert_eq!(seen_path.lock().unwrap().as_deref(), Some("/ws/backtest/abc"));
    assert_eq!(events.len(), 2);
    assert_eq!(
        events[0],
        Ok(SessionEvent::Progress {
            percent: Some(10.0),
            stage: Some("loading".to_string())
        })
    );
    match &events[1] {
        Ok(SessionEvent::Complete(r)) => assert_eq!(r.logs_count, 2),
        other => panic!("expected complete, got {other:?}"),
    }
}

#[tokio::test]
async fn connect_refused_is_a_stream_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let t = HttpTransport::new(&format!("http://{addr}")).unwrap();
    let err = t.subscribe(&TaskId::new("abc")).await.err().unwrap();
    assert!(matches!(err, StreamError::Connect(_)), "{err:?}");
}

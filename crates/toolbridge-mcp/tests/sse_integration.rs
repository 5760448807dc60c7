//! SSE transport against an in-process axum server.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::stream::{self, Stream, StreamExt};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast;
use toolbridge_core::{Arguments, ErrorKind};
use toolbridge_mcp::{ClientRegistry, ServerConfig, SessionState, TransportConfig, TransportSession};

#[derive(Clone)]
struct AppState {
    events: broadcast::Sender<String>,
}

async fn sse_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.events.subscribe();
    let endpoint = stream::once(async {
        Ok::<_, Infallible>(Event::default().event("endpoint").data("/messages?session=abc"))
    });
    let messages = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(data) => {
                    return Some((Ok::<_, Infallible>(Event::default().event("message").data(data)), rx));
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });
    Sse::new(endpoint.chain(messages))
}

async fn slow_sse_handler(
    state: State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tokio::time::sleep(Duration::from_millis(300)).await;
    sse_handler(state).await
}

fn respond(body: &Value) -> Option<(Value, Duration)> {
    let id = body.get("id")?.clone();
    let reply = |result: Value| json!({"jsonrpc": "2.0", "id": id, "result": result});
    let text = |t: &str| json!({"content": [{"type": "text", "text": t}]});
    Some(match body["method"].as_str().unwrap_or_default() {
        "initialize" => (
            reply(json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "mock-sse", "version": "0.0.1"}
            })),
            Duration::ZERO,
        ),
        "tools/list" => (
            reply(json!({"tools": [
                {"name": "echo", "description": "Echo", "inputSchema": {
                    "type": "object",
                    "properties": {"text": {"type": "string"}},
                    "required": ["text"]
                }},
                {"name": "slow", "inputSchema": {"type": "object"}}
            ]})),
            Duration::ZERO,
        ),
        _ => {
            let name = body["params"]["name"].as_str().unwrap_or_default();
            match name {
                "slow" => (reply(text("late")), Duration::from_millis(600)),
                _ => (
                    reply(text(body["params"]["arguments"]["text"].as_str().unwrap_or_default())),
                    Duration::ZERO,
                ),
            }
        }
    })
}

async fn message_handler(State(state): State<AppState>, Json(body): Json<Value>) -> StatusCode {
    if let Some((response, delay)) = respond(&body) {
        let events = state.events.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(response.to_string());
        });
    }
    StatusCode::ACCEPTED
}

async fn spawn_server() -> String {
    let (events, _) = broadcast::channel(64);
    let app = Router::new()
        .route("/sse", get(sse_handler))
        .route("/slow-sse", get(slow_sse_handler))
        .route("/messages", post(message_handler))
        .route("/plain", get(|| async { "not a stream" }))
        .with_state(AppState { events });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn args(value: Value) -> Arguments {
    value.as_object().cloned().unwrap()
}

#[tokio::test]
async fn test_sse_discover_and_call() {
    let base = spawn_server().await;
    let session = TransportSession::new(ServerConfig::sse("events", format!("{base}/sse")));
    session.connect().await.unwrap();
    assert_eq!(session.server_info().unwrap().name, "mock-sse");

    let names: Vec<String> = session
        .discover()
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.name)
        .collect();
    assert_eq!(names, vec!["echo", "slow"]);

    let result = session
        .call("echo", args(json!({"text": "over sse"})), Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(result.joined_text(), "over sse");
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_sse_timeout_keeps_stream_open() {
    let base = spawn_server().await;
    let registry = ClientRegistry::new();
    let config = ServerConfig::sse("events", format!("{base}/sse"))
        .with_call_timeout(Duration::from_millis(150));
    registry.add_server(config).await.unwrap();

    let slow = registry.invoke("slow", Arguments::new()).await.unwrap();
    assert_eq!(slow.error_kind(), Some(ErrorKind::Timeout));

    let echo = registry.get_tool("echo").unwrap();
    let result = echo.invoke(args(json!({"text": "still here"}))).await.unwrap();
    assert_eq!(result.joined_text(), "still here");

    // The late answer to the timed-out call must be dropped quietly.
    tokio::time::sleep(Duration::from_millis(700)).await;
    let again = echo.invoke(args(json!({"text": "again"}))).await.unwrap();
    assert_eq!(again.joined_text(), "again");
    assert_eq!(registry.status()[0].state, SessionState::Ready);

    assert!(registry.close().await.is_clean());
}

#[tokio::test]
async fn test_concurrent_calls_are_correlated_by_id() {
    let base = spawn_server().await;
    let session = TransportSession::new(ServerConfig::sse("events", format!("{base}/sse")));
    session.connect().await.unwrap();

    let timeout = Duration::from_secs(2);
    let (a, b, c) = tokio::join!(
        session.call("echo", args(json!({"text": "a"})), timeout),
        session.call("echo", args(json!({"text": "b"})), timeout),
        session.call("echo", args(json!({"text": "c"})), timeout),
    );
    assert_eq!(a.unwrap().joined_text(), "a");
    assert_eq!(b.unwrap().joined_text(), "b");
    assert_eq!(c.unwrap().joined_text(), "c");
}

#[tokio::test]
async fn test_non_stream_endpoint_is_rejected() {
    let base = spawn_server().await;
    let session = TransportSession::new(ServerConfig::sse("plain", format!("{base}/plain")));
    let err = session.connect().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_bad_url_is_connection_error() {
    let mut config = ServerConfig::sse("bad", "not a url");
    if let TransportConfig::Sse(params) = &mut config.transport {
        params.connect_timeout_ms = 500;
    }
    let session = TransportSession::new(config);
    assert_eq!(session.connect().await.unwrap_err().kind(), ErrorKind::Connection);
}

#[tokio::test]
async fn test_close_during_connect_stays_closed() {
    let base = spawn_server().await;
    let session = std::sync::Arc::new(TransportSession::new(ServerConfig::sse(
        "late",
        format!("{base}/slow-sse"),
    )));
    let connecting = tokio::spawn({
        let session = session.clone();
        async move { session.connect().await }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(session.state(), SessionState::Connecting);
    session.close().await.unwrap();

    let err = connecting.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SessionClosed);
    assert_eq!(session.state(), SessionState::Closed);
    assert!(session.discover().await.is_err());
}

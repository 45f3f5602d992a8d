//! Routes: the SSE event stream and the internal notify endpoint.

use std::convert::Infallible;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::Router;
use futures::stream::Stream;
use futures::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::trace::TraceLayer;

use super::AppState;
use crate::constants::SSE_KEEPALIVE;

/// Builds the fan-out router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/stream", get(stream))
        .route("/notify", post(notify))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `GET /api/stream`: Server-Sent Events.
///
/// On connect the client immediately receives the most recent snapshot,
/// then every subsequent broadcast until it disconnects. A keepalive
/// comment goes out every 30 seconds. Browsers are checked against the
/// origin allow-list; a missing Origin header (curl, native clients) is
/// permitted.
async fn stream(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, StatusCode> {
    if let Some(origin) = headers.get(header::ORIGIN) {
        let origin = origin.to_str().unwrap_or_default();
        let allowed = state
            .config
            .push
            .allowed_origins
            .iter()
            .any(|o| o == origin);
        if !allowed {
            log::warn!("[Server] rejected SSE connect from origin {origin:?}");
            return Err(StatusCode::FORBIDDEN);
        }
    }

    let (id, rx, cached) = state.broadcaster.subscribe();
    log::debug!("[Server] SSE client {id} subscribed");

    // Initial event: the cache if primed, otherwise the on-disk snapshot.
    let initial = cached
        .map(|p| p.to_string())
        .or_else(|| read_snapshot_compact(&state));

    let initial_stream = futures::stream::iter(
        initial
            .into_iter()
            .map(|payload| Ok(Event::default().data(payload))),
    );
    let broadcast_stream =
        ReceiverStream::new(rx).map(|payload| Ok(Event::default().data(payload.to_string())));

    Ok(Sse::new(initial_stream.chain(broadcast_stream))
        .keep_alive(KeepAlive::new().interval(SSE_KEEPALIVE).text("keepalive")))
}

/// `POST /notify`: internal broadcast trigger (loopback only, no auth).
///
/// An empty body, or one without a `system_status`, means "re-read the
/// on-disk snapshot and broadcast it" — the exporter calls it this way
/// right after an atomic write. A body carrying `system_status` is
/// broadcast verbatim (the "restarting" announcement path).
async fn notify(State(state): State<AppState>, body: Bytes) -> StatusCode {
    let posted: Option<serde_json::Value> = if body.is_empty() {
        None
    } else {
        match serde_json::from_slice(&body) {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!("[Server] notify body unparsable: {e}");
                return StatusCode::BAD_REQUEST;
            }
        }
    };

    let payload = match posted {
        Some(value) if value.get("system_status").is_some() => value.to_string(),
        _ => match read_snapshot_compact(&state) {
            Some(payload) => payload,
            None => {
                log::warn!("[Server] notify with no snapshot on disk yet");
                return StatusCode::NO_CONTENT;
            }
        },
    };

    state.broadcaster.broadcast(payload);
    StatusCode::NO_CONTENT
}

/// Reads the on-disk snapshot and re-serializes it compactly so each SSE
/// payload stays a single `data:` line.
fn read_snapshot_compact(state: &AppState) -> Option<String> {
    let raw = std::fs::read_to_string(state.config.paths.now_playing()).ok()?;
    let value: serde_json::Value = serde_json::from_str(&raw).ok()?;
    Some(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RadioConfig;
    use crate::fanout::Broadcaster;
    use std::sync::Arc;

    fn test_state(base: &std::path::Path, origins: &[&str]) -> AppState {
        let origins_yaml = if origins.is_empty() {
            String::new()
        } else {
            format!(
                "push:\n  allowed_origins:\n{}",
                origins
                    .iter()
                    .map(|o| format!("    - {o}\n"))
                    .collect::<String>()
            )
        };
        let yaml = format!(
            r#"
station:
  name: Skywave FM
paths:
  base: {base}
  hourly_bumper: {base}/assets/bumpers/top_of_hour.mp3
engine:
  socket_path: {base}/engine.sock
content:
  weather:
    endpoint: http://127.0.0.1:1/forecast
    latitude: 47.6
    longitude: -122.3
announcer:
  persona: test host
{origins_yaml}
"#,
            base = base.display()
        );
        let path = base.join("skywave.yaml");
        std::fs::write(&path, yaml).unwrap();
        AppState {
            broadcaster: Broadcaster::new(),
            config: Arc::new(RadioConfig::load(&path).unwrap()),
        }
    }

    async fn spawn_server(state: AppState) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = crate::api::serve_on(listener, state).await;
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn disallowed_origin_gets_403() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), &["https://radio.example"]);
        let base = spawn_server(state).await;

        let client = reqwest::Client::new();
        let forbidden = client
            .get(format!("{base}/api/stream"))
            .header("Origin", "https://evil.example")
            .send()
            .await
            .unwrap();
        assert_eq!(forbidden.status(), reqwest::StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn allowed_and_absent_origins_connect_and_get_initial_event() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), &["https://radio.example"]);
        state.broadcaster.prime("{\"n\":1}".to_string());
        let base = spawn_server(state).await;

        let client = reqwest::Client::new();
        for request in [
            client
                .get(format!("{base}/api/stream"))
                .header("Origin", "https://radio.example"),
            // No Origin header: non-browser client, permitted.
            client.get(format!("{base}/api/stream")),
        ] {
            let mut response = request.send().await.unwrap();
            assert_eq!(response.status(), reqwest::StatusCode::OK);
            assert!(response
                .headers()
                .get("content-type")
                .unwrap()
                .to_str()
                .unwrap()
                .starts_with("text/event-stream"));

            let chunk = response.chunk().await.unwrap().unwrap();
            let text = String::from_utf8_lossy(&chunk).to_string();
            assert!(text.contains("data: {\"n\":1}"), "got: {text}");
        }
    }

    #[tokio::test]
    async fn notify_with_status_broadcasts_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), &[]);
        let broadcaster = state.broadcaster.clone();
        let base = spawn_server(state).await;

        let (_id, mut rx, _) = broadcaster.subscribe();

        let client = reqwest::Client::new();
        let response = client
            .post(format!("{base}/notify"))
            .header("content-type", "application/json")
            .body(r#"{"system_status":"restarting","message":"deploy"}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::NO_CONTENT);

        let payload = rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["system_status"], "restarting");
        assert_eq!(value["message"], "deploy");
    }

    #[tokio::test]
    async fn empty_notify_rebroadcasts_disk_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), &[]);
        state.config.paths.ensure_layout().unwrap();
        let snapshot = crate::now_playing::sample_snapshot();
        snapshot.write_to(&state.config.paths.now_playing()).unwrap();
        let broadcaster = state.broadcaster.clone();
        let base = spawn_server(state).await;

        let (_id, mut rx, _) = broadcaster.subscribe();

        let client = reqwest::Client::new();
        let response = client
            .post(format!("{base}/notify"))
            .header("content-type", "application/json")
            .body("")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::NO_CONTENT);

        let payload = rx.recv().await.unwrap();
        // Re-serialized compactly: one data line, same content.
        assert!(!payload.contains('\n'));
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["current"]["asset_id"], "abc123");
    }
}

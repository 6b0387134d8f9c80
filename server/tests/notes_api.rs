//! Integration tests for the note API.
//!
//! Router-level tests drive the app with `tower::ServiceExt::oneshot`; the
//! client tests bind an in-memory server on a random port and talk to it
//! through the engine's `HttpRemote`.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use notesync_engine::{
    HttpRemote, MemoryStore, Record, RemoteClient, RemoteError, Subscription, SyncConfig,
    SyncEngine,
};
use notesync_server::{app, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tower::ServiceExt;

fn test_app() -> Router {
    app(AppState::in_memory())
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };

    (status, value)
}

fn note(key: &str, content: &str, updated_at: u64) -> Value {
    json!({ "key": key, "content": content, "updatedAt": updated_at })
}

/// Serve a fresh in-memory app on a random local port.
async fn spawn_server() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, test_app()).await.unwrap();
    });

    format!("http://{}", addr)
}

// ============================================================================
// Router
// ============================================================================

#[cfg(test)]
mod router_tests {
    use super::*;

    #[tokio::test]
    async fn health_reports_storage_backend() {
        let app = test_app();
        let (status, body) = send(&app, "GET", "/health", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["storage"], "memory");
    }

    #[tokio::test]
    async fn put_then_get() {
        let app = test_app();

        let (status, _) = send(&app, "PUT", "/notes/todo", Some(note("todo", "milk", 100))).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, "GET", "/notes/todo", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, note("todo", "milk", 100));
    }

    #[tokio::test]
    async fn missing_note_is_404() {
        let app = test_app();

        let (status, _) = send(&app, "GET", "/notes/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, "DELETE", "/notes/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn stale_put_conflicts_with_current_note() {
        let app = test_app();
        send(&app, "PUT", "/notes/todo", Some(note("todo", "new", 200))).await;

        let (status, body) = send(&app, "PUT", "/notes/todo", Some(note("todo", "old", 100))).await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["current"], note("todo", "new", 200));
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn tied_put_with_other_content_conflicts() {
        let app = test_app();
        send(&app, "PUT", "/notes/todo", Some(note("todo", "first", 100))).await;

        let (status, body) =
            send(&app, "PUT", "/notes/todo", Some(note("todo", "second", 100))).await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["current"]["content"], "first");
    }

    #[tokio::test]
    async fn identical_put_is_idempotent() {
        let app = test_app();
        send(&app, "PUT", "/notes/todo", Some(note("todo", "milk", 100))).await;

        let (status, _) = send(&app, "PUT", "/notes/todo", Some(note("todo", "milk", 100))).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn key_mismatch_is_bad_request() {
        let app = test_app();

        let (status, _) = send(&app, "PUT", "/notes/todo", Some(note("other", "x", 1))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, "GET", "/notes/other", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn list_is_sorted_and_delete_removes() {
        let app = test_app();
        for key in ["pears", "apples", "limes"] {
            send(&app, "PUT", &format!("/notes/{}", key), Some(note(key, "x", 1))).await;
        }

        let (status, _) = send(&app, "DELETE", "/notes/limes", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = send(&app, "GET", "/notes", None).await;
        assert_eq!(status, StatusCode::OK);
        let keys: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|n| n["key"].as_str().unwrap())
            .collect();
        assert_eq!(keys, vec!["apples", "pears"]);
    }
}

// ============================================================================
// HttpRemote against a live server
// ============================================================================

#[cfg(test)]
mod client_tests {
    use super::*;

    #[tokio::test]
    async fn store_then_fetch() {
        let remote = HttpRemote::new(spawn_server().await);
        let record = Record::from_parts("shopping list", "eggs", 100);

        remote.store(&record).await.unwrap();

        assert_eq!(remote.fetch("shopping list").await.unwrap(), record);
    }

    #[tokio::test]
    async fn fetch_missing_is_not_found() {
        let remote = HttpRemote::new(spawn_server().await);

        let err = remote.fetch("nope").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn stale_store_is_rejected_with_current() {
        let remote = HttpRemote::new(spawn_server().await);
        let current = Record::from_parts("todo", "new", 200);
        remote.store(&current).await.unwrap();

        match remote.store(&Record::from_parts("todo", "old", 100)).await {
            Err(RemoteError::Rejected { current: winner }) => assert_eq!(*winner, current),
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unreachable_server_is_network_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let remote = HttpRemote::new(format!("http://{}", addr));
        let err = remote.fetch("todo").await.unwrap_err();

        assert!(matches!(err, RemoteError::Network(_)));
    }
}

// ============================================================================
// Two engines sharing one server
// ============================================================================

#[cfg(test)]
mod end_to_end_tests {
    use super::*;

    const WAIT: Duration = Duration::from_secs(5);

    fn engine(base_url: &str) -> SyncEngine {
        let config = SyncConfig {
            poll_period_ms: 50,
            fetch_timeout_ms: 1000,
            ..SyncConfig::default()
        };
        SyncEngine::new(
            Arc::new(MemoryStore::new()),
            Arc::new(HttpRemote::new(base_url)),
            config,
        )
        .unwrap()
    }

    async fn wait_for_content(sub: &mut Subscription, content: &str) -> Record {
        timeout(WAIT, async {
            loop {
                match sub.next().await {
                    Some(record) if record.content() == content => return record,
                    Some(_) => continue,
                    None => panic!("subscription closed"),
                }
            }
        })
        .await
        .expect("note did not arrive in time")
    }

    #[tokio::test]
    async fn write_on_one_device_reaches_the_other() {
        let base_url = spawn_server().await;
        let phone = engine(&base_url);
        let laptop = engine(&base_url);

        let mut watching = laptop.observe("groceries");
        let written = phone.write("groceries", "milk, bread").await.unwrap();

        let seen = wait_for_content(&mut watching, "milk, bread").await;
        assert_eq!(seen, written);
    }

    #[tokio::test]
    async fn later_edit_wins_on_both_devices() {
        let base_url = spawn_server().await;
        let phone = engine(&base_url);
        let laptop = engine(&base_url);

        let mut on_phone = phone.observe("todo");
        let mut on_laptop = laptop.observe("todo");

        phone.write("todo", "draft").await.unwrap();
        wait_for_content(&mut on_laptop, "draft").await;

        let edit = laptop.write("todo", "final").await.unwrap();

        assert_eq!(wait_for_content(&mut on_phone, "final").await, edit);
        assert_eq!(wait_for_content(&mut on_laptop, "final").await, edit);
    }
}

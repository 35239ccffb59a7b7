//! `SupabaseStore` against a local axum server speaking the storage REST API.
#![cfg(feature = "server")]

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use edgequake_doc2img::{ObjectStore, StorageError, SupabaseConfig, SupabaseStore};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

const KEY: &str = "service-key";

#[derive(Default)]
struct Mock {
    objects: Mutex<BTreeMap<String, Bytes>>,
    headers: Mutex<Vec<HeaderMap>>,
}

type Shared = Arc<Mock>;

async fn upload(
    State(mock): State<Shared>,
    Path((bucket, key)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    mock.headers.lock().unwrap().push(headers);
    if key.starts_with("boom") {
        return (StatusCode::SERVICE_UNAVAILABLE, "storage offline").into_response();
    }
    let mut objects = mock.objects.lock().unwrap();
    let full = format!("{bucket}/{key}");
    if objects.contains_key(&full) {
        // Supabase answers duplicates with 400 and a 409 statusCode body.
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"statusCode": "409", "error": "Duplicate", "message": "The resource already exists"})),
        )
            .into_response();
    }
    objects.insert(full.clone(), body);
    Json(json!({ "Key": full })).into_response()
}

async fn list(
    State(mock): State<Shared>,
    Path(bucket): Path<String>,
    Json(req): Json<Value>,
) -> Json<Value> {
    let folder = format!("{bucket}/{}/", req["prefix"].as_str().unwrap_or(""));
    let objects = mock.objects.lock().unwrap();
    let entries: Vec<Value> = objects
        .keys()
        .filter_map(|k| k.strip_prefix(&folder))
        .filter(|rest| !rest.contains('/'))
        .map(|name| json!({ "name": name, "id": format!("id-{name}") }))
        .chain(std::iter::once(json!({ "name": "nested", "id": null })))
        .collect();
    Json(Value::Array(entries))
}

async fn remove(
    State(mock): State<Shared>,
    Path(bucket): Path<String>,
    Json(req): Json<Value>,
) -> Json<Value> {
    let mut objects = mock.objects.lock().unwrap();
    let removed: Vec<Value> = req["prefixes"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|k| k.as_str())
        .filter(|k| objects.remove(&format!("{bucket}/{k}")).is_some())
        .map(|k| json!({ "name": k }))
        .collect();
    Json(Value::Array(removed))
}

async fn spawn_mock() -> (String, Shared) {
    let mock = Shared::default();
    let app = Router::new()
        .route("/storage/v1/object/list/{bucket}", post(list))
        .route("/storage/v1/object/{bucket}/{*key}", post(upload))
        .route("/storage/v1/object/{bucket}", axum::routing::delete(remove))
        .with_state(mock.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), mock)
}

fn store(url: &str) -> SupabaseStore {
    SupabaseStore::new(SupabaseConfig::new(url, KEY).timeout_secs(5)).unwrap()
}

#[tokio::test]
async fn put_sends_auth_and_never_upserts() {
    let (url, mock) = spawn_mock().await;
    let store = store(&url);

    let stored = store
        .put("images/job-1/0.png", Bytes::from_static(b"png"), "image/png")
        .await
        .unwrap();

    assert_eq!(stored.key, "images/job-1/0.png");
    assert_eq!(
        stored.locator,
        format!("{url}/storage/v1/object/public/images/images/job-1/0.png")
    );
    assert!(mock.objects.lock().unwrap().contains_key("images/images/job-1/0.png"));

    let headers = mock.headers.lock().unwrap();
    let h = &headers[0];
    assert_eq!(h["authorization"], format!("Bearer {KEY}").as_str());
    assert_eq!(h["apikey"], KEY);
    assert_eq!(h["x-upsert"], "false");
    assert_eq!(h["content-type"], "image/png");
}

#[tokio::test]
async fn second_put_to_same_key_is_conflict() {
    let (url, mock) = spawn_mock().await;
    let store = store(&url);

    store
        .put("images/j/0.png", Bytes::from_static(b"first"), "image/png")
        .await
        .unwrap();
    let err = store
        .put("images/j/0.png", Bytes::from_static(b"second"), "image/png")
        .await
        .unwrap_err();

    assert!(matches!(err, StorageError::Conflict { ref key } if key == "images/j/0.png"));
    assert_eq!(
        mock.objects.lock().unwrap()["images/images/j/0.png"],
        Bytes::from_static(b"first")
    );
}

#[tokio::test]
async fn server_errors_carry_status_and_body() {
    let (url, _mock) = spawn_mock().await;

    let err = store(&url)
        .put("boom/0.png", Bytes::from_static(b"x"), "image/png")
        .await
        .unwrap_err();

    match err {
        StorageError::Http { status, body } => {
            assert_eq!(status, 503);
            assert_eq!(body, "storage offline");
        }
        other => panic!("expected HTTP error, got {other:?}"),
    }
}

#[tokio::test]
async fn list_and_delete_a_job_namespace() {
    let (url, _mock) = spawn_mock().await;
    let store = store(&url);

    for key in ["images/a/0.png", "images/a/1.png", "images/b/0.png"] {
        store
            .put(key, Bytes::from_static(b"png"), "image/png")
            .await
            .unwrap();
    }

    let keys = store.list("images/a/").await.unwrap();
    assert_eq!(keys, vec!["images/a/0.png", "images/a/1.png"]);

    assert_eq!(store.delete(&keys).await.unwrap(), 2);
    assert!(store.list("images/a/").await.unwrap().is_empty());
    assert_eq!(store.list("images/b/").await.unwrap(), vec!["images/b/0.png"]);
}

#[tokio::test]
async fn unreachable_server_is_transport_error() {
    // Bind then drop to get a port nobody listens on.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = store(&format!("http://{addr}"))
        .put("images/x/0.png", Bytes::from_static(b"x"), "image/png")
        .await
        .unwrap_err();

    assert!(matches!(err, StorageError::Transport(_)), "{err:?}");
}

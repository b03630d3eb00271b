//! HTTP backend client tests against an in-process server

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde_json::{Value, json};

use ragchat::backend::AskRoute;
use ragchat::{Backend, Document, Error, HttpBackend, Sender, SessionId};

/// Raw request bodies seen by the server, keyed by route
type Seen = Arc<Mutex<HashMap<&'static str, String>>>;

/// Serve `router` on an ephemeral port and return its base URL
async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn qa_router(seen: Seen) -> Router {
    Router::new()
        .route(
            "/sessions",
            get(|| async {
                Json(json!([
                    {"_id": "665f1c", "session_name": "physics"},
                    {"_id": "665f1d", "session_name": "history"}
                ]))
            }),
        )
        .route(
            "/create-session",
            post(|State(seen): State<Seen>, body: Bytes| async move {
                seen.lock()
                    .unwrap()
                    .insert("create", String::from_utf8_lossy(&body).into_owned());
                Json(json!({"session_id": "665f1e"}))
            }),
        )
        .route(
            "/session/{id}",
            get(|Path(id): Path<String>| async move {
                Json(json!({
                    "session_name": id,
                    "messages": [
                        {"sender": "user", "text": format!("hi from {id}")},
                        {"sender": "bot", "text": "hello"}
                    ]
                }))
            }),
        )
        .route(
            "/ask/{id}",
            post(|Path(id): Path<String>, Json(body): Json<Value>| async move {
                Json(json!({
                    "answer": format!("{id}|{}|{}", body["question"].as_str().unwrap_or_default(), body["lang"].as_str().unwrap_or_default())
                }))
            }),
        )
        .route(
            "/ask",
            post(|Json(body): Json<Value>| async move {
                Json(json!({
                    "answer": format!("shared|{}", body["question"].as_str().unwrap_or_default())
                }))
            }),
        )
        .route(
            "/tts",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                let text = params.get("text").cloned().unwrap_or_default();
                let lang = params.get("lang").cloned().unwrap_or_default();
                format!("ID3:{lang}:{text}").into_bytes()
            }),
        )
        .route(
            "/upload/{id}",
            post(|State(seen): State<Seen>, Path(id): Path<String>, body: Bytes| async move {
                seen.lock().unwrap().insert(
                    "upload",
                    format!("{id}\n{}", String::from_utf8_lossy(&body)),
                );
                StatusCode::OK
            }),
        )
        .route(
            "/scrape/{id}",
            post(|Path(_id): Path<String>, Form(form): Form<HashMap<String, String>>| async move {
                match form.get("url").map(String::as_str) {
                    Some("https://example.com/ok") => {
                        (StatusCode::OK, Json(json!({"message": "ok"}))).into_response()
                    }
                    _ => (
                        StatusCode::BAD_REQUEST,
                        Json(json!({"detail": "Firecrawl could not fetch the page"})),
                    )
                        .into_response(),
                }
            }),
        )
        .with_state(seen)
}

async fn backend(route: AskRoute) -> (HttpBackend, Seen) {
    let seen = Seen::default();
    let url = serve(qa_router(Arc::clone(&seen))).await;
    (HttpBackend::new(url, route), seen)
}

#[tokio::test]
async fn test_list_sessions_accepts_backend_field_names() {
    let (backend, _) = backend(AskRoute::PerSession).await;

    let sessions = backend.list_sessions().await.unwrap();

    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0].id, SessionId::new("665f1c"));
    assert_eq!(sessions[0].name, "physics");
}

#[tokio::test]
async fn test_create_session_sends_name_and_seed() {
    let (backend, seen) = backend(AskRoute::PerSession).await;
    let seed = Document::new("syllabus.txt", b"week one: optics".to_vec());

    let id = backend.create_session("optics", Some(seed)).await.unwrap();

    assert_eq!(id, SessionId::new("665f1e"));
    let body = seen.lock().unwrap().get("create").cloned().unwrap();
    assert!(body.contains("name=\"session_name\""));
    assert!(body.contains("optics"));
    assert!(body.contains("filename=\"syllabus.txt\""));
    assert!(body.contains("week one: optics"));
}

#[tokio::test]
async fn test_fetch_turns_encodes_session_id() {
    let (backend, _) = backend(AskRoute::PerSession).await;

    let turns = backend.fetch_turns(&SessionId::new("a b")).await.unwrap();

    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].sender, Sender::User);
    assert_eq!(turns[0].text, "hi from a b");
    assert_eq!(turns[1].sender, Sender::Bot);
}

#[tokio::test]
async fn test_ask_per_session_route() {
    let (backend, _) = backend(AskRoute::PerSession).await;

    let answer = backend
        .ask(&SessionId::new("s1"), "what is RAG?", "hi")
        .await
        .unwrap();

    assert_eq!(answer, "s1|what is RAG?|hi");
}

#[tokio::test]
async fn test_ask_shared_route() {
    let (backend, _) = backend(AskRoute::Shared).await;

    let answer = backend
        .ask(&SessionId::new("default"), "what is RAG?", "en")
        .await
        .unwrap();

    assert_eq!(answer, "shared|what is RAG?");
}

#[tokio::test]
async fn test_synthesize_passes_text_and_lang() {
    let (backend, _) = backend(AskRoute::PerSession).await;

    let audio = backend.synthesize("hello there", "en").await.unwrap();

    assert_eq!(audio, b"ID3:en:hello there");
}

#[tokio::test]
async fn test_upload_sends_multipart_file() {
    let (backend, seen) = backend(AskRoute::PerSession).await;
    let document = Document::new("paper.pdf", b"%PDF-1.4".to_vec());

    backend
        .upload_file(&SessionId::new("s1"), document)
        .await
        .unwrap();

    let body = seen.lock().unwrap().get("upload").cloned().unwrap();
    assert!(body.starts_with("s1\n"));
    assert!(body.contains("filename=\"paper.pdf\""));
    assert!(body.contains("application/pdf"));
}

#[tokio::test]
async fn test_scrape_failure_keeps_backend_detail() {
    let (backend, _) = backend(AskRoute::PerSession).await;
    let session = SessionId::new("s1");

    backend
        .scrape_url(&session, "https://example.com/ok")
        .await
        .unwrap();

    let err = backend
        .scrape_url(&session, "https://example.com/blocked")
        .await
        .unwrap_err();
    match err {
        Error::Rejected { status, detail } => {
            assert_eq!(status, 400);
            assert_eq!(detail.as_deref(), Some("Firecrawl could not fetch the page"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_missing_route_is_rejected_without_detail() {
    let url = serve(Router::new()).await;
    let backend = HttpBackend::new(url, AskRoute::PerSession);

    let err = backend.list_sessions().await.unwrap_err();

    assert!(matches!(
        err,
        Error::Rejected {
            status: 404,
            detail: None
        }
    ));
}

#[tokio::test]
async fn test_empty_tts_body_is_an_error() {
    let router = Router::new().route("/tts", get(|| async { Vec::<u8>::new() }));
    let backend = HttpBackend::new(serve(router).await, AskRoute::PerSession);

    let err = backend.synthesize("hi", "en").await.unwrap_err();

    assert!(matches!(err, Error::Network(_)));
}

#[tokio::test]
async fn test_unreachable_backend_is_a_network_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let backend = HttpBackend::new(format!("http://{addr}"), AskRoute::PerSession);
    let err = backend.list_sessions().await.unwrap_err();

    assert_eq!(err.kind(), ragchat::ErrorKind::Network);
}

//! In-process stand-in for the calculation service, used by tests.

use axum::{
    extract::{multipart::Multipart, State},
    http::StatusCode,
    routing::post,
    Router,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use url::Url;

/// Start of a zip container, which is what an xlsx body begins with.
pub const PK_BYTES: &[u8] = &[0x50, 0x4B, 0x03, 0x04, 0x14, 0x00, 0x06, 0x00];

#[derive(Debug, Clone)]
pub struct ReceivedPart {
    pub field: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

#[derive(Clone, Default)]
struct Recorder {
    hits: Arc<AtomicUsize>,
    parts: Arc<Mutex<Vec<ReceivedPart>>>,
}

pub struct StubBackend {
    base: Url,
    recorder: Recorder,
}

impl StubBackend {
    pub fn url(&self, path: &str) -> Url {
        self.base.join(path).unwrap()
    }

    pub fn hits(&self) -> usize {
        self.recorder.hits.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<ReceivedPart> {
        self.recorder.parts.lock().unwrap().clone()
    }
}

pub async fn spawn() -> StubBackend {
    let recorder = Recorder::default();
    let app = Router::new()
        .route("/echo", post(echo))
        .route("/xlsx", post(xlsx))
        .route("/fail", post(fail))
        .route("/stall", post(stall))
        .with_state(recorder.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    StubBackend {
        base: Url::parse(&format!("http://{}/", addr)).unwrap(),
        recorder,
    }
}

/// Answers one request with `response` written verbatim, then closes the
/// connection. Used for replies axum would never produce.
pub async fn spawn_raw(response: &'static [u8]) -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        // the multipart body ends with the closing boundary `--\r\n`
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        while !request.ends_with(b"--\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        socket.write_all(response).await.unwrap();
        socket.shutdown().await.unwrap();
    });
    Url::parse(&format!("http://{}/upload", addr)).unwrap()
}

async fn record(recorder: &Recorder, mut multipart: Multipart) -> Result<Vec<u8>, StatusCode> {
    recorder.hits.fetch_add(1, Ordering::SeqCst);
    let mut first = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|_| StatusCode::BAD_REQUEST)? {
        let name = field.name().unwrap_or("").to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?.to_vec();
        if first.is_empty() {
            first = data.clone();
        }
        recorder.parts.lock().unwrap().push(ReceivedPart {
            field: name,
            file_name,
            content_type,
            data,
        });
    }
    Ok(first)
}

async fn echo(State(recorder): State<Recorder>, multipart: Multipart) -> Result<Vec<u8>, StatusCode> {
    record(&recorder, multipart).await
}

async fn xlsx(State(recorder): State<Recorder>, multipart: Multipart) -> Result<Vec<u8>, StatusCode> {
    record(&recorder, multipart).await?;
    Ok(PK_BYTES.to_vec())
}

async fn fail(State(recorder): State<Recorder>, multipart: Multipart) -> StatusCode {
    let _ = record(&recorder, multipart).await;
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn stall(State(recorder): State<Recorder>) -> StatusCode {
    recorder.hits.fetch_add(1, Ordering::SeqCst);
    std::future::pending::<()>().await;
    StatusCode::OK
}

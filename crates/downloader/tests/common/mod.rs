use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::Path;
use axum::http::header::{AUTHORIZATION, CONTENT_LENGTH};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use cogflux_downloader::config::DownloaderConfig;
use cogflux_downloader::http::HttpFetcher;

/// Token the gated routes accept.
pub const TEST_TOKEN: &str = "hf_test_token_0000";

/// Size of the `/large` payload, big enough to emit progress lines.
pub const LARGE_BYTES: usize = 11 * 1024 * 1024;

/// Deterministic body served for `/files/{name}`.
pub fn file_body(name: &str) -> Vec<u8> {
    format!("weights for {name}").into_bytes()
}

/// Start a local weight host on an ephemeral port and return its base URL.
///
/// Routes:
/// - `GET /files/{name}`: 200 with [`file_body`]
/// - `GET /gated/{name}`: 200 only with `Authorization: Bearer TEST_TOKEN`, else 401
/// - `GET /missing/{name}`: 404 with a plain-text body
/// - `GET /truncated/{name}`: declares 1 MiB, sends one chunk, then errors
/// - `GET /large/{name}`: [`LARGE_BYTES`] zero bytes
/// - `GET /oversized-error/{name}`: 500 with a 1 MiB body
pub async fn spawn_weight_host() -> String {
    let app = Router::new()
        .route("/files/{name}", get(serve_file))
        .route("/gated/{name}", get(serve_gated))
        .route("/missing/{name}", get(serve_missing))
        .route("/truncated/{name}", get(serve_truncated))
        .route("/large/{name}", get(serve_large))
        .route("/oversized-error/{name}", get(serve_oversized_error));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server");
    });
    format!("http://{addr}")
}

/// Client with short timeouts for tests.
pub fn test_client() -> reqwest::Client {
    let config = DownloaderConfig {
        connect_timeout: Duration::from_secs(5),
        read_timeout: Duration::from_secs(10),
        ..DownloaderConfig::default()
    };
    HttpFetcher::build_client(&config).expect("build client")
}

async fn serve_file(Path(name): Path<String>) -> Vec<u8> {
    file_body(&name)
}

async fn serve_gated(Path(name): Path<String>, headers: HeaderMap) -> Response {
    let expected = format!("Bearer {TEST_TOKEN}");
    match headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        Some(value) if value == expected => file_body(&name).into_response(),
        _ => (
            StatusCode::UNAUTHORIZED,
            "Invalid credentials in Authorization header",
        )
            .into_response(),
    }
}

async fn serve_missing() -> Response {
    (StatusCode::NOT_FOUND, "Entry not found").into_response()
}

async fn serve_truncated() -> Response {
    let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
        Ok(Bytes::from(vec![7u8; 64 * 1024])),
        Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "upstream reset",
        )),
    ];
    Response::builder()
        .header(CONTENT_LENGTH, 1024 * 1024)
        .body(Body::from_stream(futures::stream::iter(chunks)))
        .expect("truncated response")
}

async fn serve_large() -> Vec<u8> {
    vec![0u8; LARGE_BYTES]
}

async fn serve_oversized_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "e".repeat(1024 * 1024)).into_response()
}

//! The HTTP range streaming server.
//!
//! Routes: `/favicon.ico` answers empty immediately, `/` aliases the
//! active file index, `/{index}` serves one file of the active torrent.
//! Requests arriving before any torrent is active are held on the
//! active-torrent watch until one becomes ready (bounded by
//! `ServerConfig::ready_timeout`, then 503). Served files always answer
//! `206 Partial Content` unless `full_response_ok` is set, a quirk some
//! media players depend on.

use std::net::SocketAddr;

use axum::Router;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use ebbtide_core::client::ActiveTorrent;
use ebbtide_core::config::ServerConfig;
use ebbtide_core::torrent::SwarmTorrent;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::range::{ByteRange, resolve_range};
use crate::stream::range_stream;

/// Shared state for request handlers.
#[derive(Clone)]
pub struct AppState {
    pub active: watch::Receiver<Option<ActiveTorrent>>,
    pub config: ServerConfig,
}

/// Errors that can occur while running the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("could not bind listener: {0}")]
    Bind(#[source] std::io::Error),

    #[error("server I/O failure: {0}")]
    Io(#[source] std::io::Error),
}

/// Builds the streaming router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/favicon.ico", get(favicon))
        .route("/", get(serve_root))
        .route("/{index}", get(serve_index))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds the listener and serves until the task is dropped.
///
/// Accepted connections get no idle timeout: a response body may stall
/// for minutes while the swarm fetches pieces, and disconnecting slow
/// clients here would break exactly the players this server exists for.
///
/// # Errors
/// - `ServerError::Bind` - The address could not be bound
/// - `ServerError::Io` - The accept loop failed
pub async fn run_server(
    config: ServerConfig,
    active: watch::Receiver<Option<ActiveTorrent>>,
) -> Result<(), ServerError> {
    let Some(port) = config.port else {
        info!("http server disabled by configuration");
        return Ok(());
    };

    let addr = SocketAddr::new(config.bind_address, port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(ServerError::Bind)?;
    info!(%addr, "http server listening");

    let app = router(AppState { active, config });
    axum::serve(listener, app).await.map_err(ServerError::Io)
}

async fn favicon() -> Response {
    status_only(StatusCode::OK)
}

async fn not_found() -> Response {
    status_only(StatusCode::NOT_FOUND)
}

async fn serve_root(State(state): State<AppState>, method: Method, headers: HeaderMap) -> Response {
    serve_file(state, None, method, headers).await
}

async fn serve_index(
    State(state): State<AppState>,
    Path(raw_index): Path<String>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    match raw_index.parse::<usize>() {
        Ok(index) => serve_file(state, Some(index), method, headers).await,
        Err(_) => status_only(StatusCode::NOT_FOUND),
    }
}

async fn serve_file(
    state: AppState,
    requested_index: Option<usize>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    // Readiness gate: hold the request until a torrent is active, bounded
    // so an idle server cannot accumulate suspended requests forever.
    let mut active_rx = state.active.clone();
    let wait = active_rx.wait_for(|slot| slot.is_some());
    let active = match tokio::time::timeout(state.config.ready_timeout, wait).await {
        Ok(Ok(slot)) => (*slot).clone(),
        Ok(Err(_)) | Err(_) => {
            debug!("no torrent became active in time");
            return status_only(StatusCode::SERVICE_UNAVAILABLE);
        }
    };
    let Some(active) = active else {
        return status_only(StatusCode::SERVICE_UNAVAILABLE);
    };

    let files = active.torrent.files();
    let index = requested_index.unwrap_or(active.file_index);
    let Some(file) = files.get(index) else {
        debug!(index, file_count = files.len(), "file index out of range");
        return status_only(StatusCode::NOT_FOUND);
    };
    let Some(reader) = active.torrent.reader(index) else {
        return status_only(StatusCode::NOT_FOUND);
    };

    let range_header = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok());
    let range = match resolve_range(range_header, file.length) {
        Ok(range) => range,
        Err(_) => return not_satisfiable(file.length),
    };

    let content_type = mime_guess::from_path(&file.name).first_or_octet_stream();
    let (status, content_length) = match range {
        Some(range) => (StatusCode::PARTIAL_CONTENT, range.content_length()),
        None if state.config.full_response_ok => (StatusCode::OK, file.length),
        None => (StatusCode::PARTIAL_CONTENT, file.length),
    };

    let mut builder = Response::builder()
        .status(status)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_TYPE, content_type.as_ref())
        .header(header::CONTENT_LENGTH, content_length.to_string());

    if let Some(range) = range {
        builder = builder.header(
            header::CONTENT_RANGE,
            format!("bytes {}-{}/{}", range.start, range.end, file.length),
        );
    }

    // Everything streamed starts from the computed range; a range-less
    // request reads the whole file.
    let effective = range.or(if file.length == 0 {
        None
    } else {
        Some(ByteRange {
            start: 0,
            end: file.length - 1,
        })
    });

    let body = match effective {
        Some(effective) if method != Method::HEAD => {
            Body::from_stream(range_stream(reader, effective))
        }
        _ => Body::empty(),
    };

    builder
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn status_only(status: StatusCode) -> Response {
    Response::builder()
        .status(status)
        .body(Body::empty())
        .unwrap_or_else(|_| status.into_response())
}

fn not_satisfiable(length: u64) -> Response {
    Response::builder()
        .status(StatusCode::RANGE_NOT_SATISFIABLE)
        .header(header::CONTENT_RANGE, format!("bytes */{length}"))
        .body(Body::empty())
        .unwrap_or_else(|_| StatusCode::RANGE_NOT_SATISFIABLE.into_response())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::to_bytes;
    use axum::http::Request;
    use bytes::Bytes;
    use ebbtide_core::torrent::MemoryTorrent;
    use tower::ServiceExt;

    use super::*;

    const BODY_LIMIT: usize = 16 * 1024 * 1024;

    fn test_config() -> ServerConfig {
        ServerConfig {
            ready_timeout: Duration::from_millis(200),
            ..ServerConfig::default()
        }
    }

    /// Router over a single-file torrent with all pieces already local.
    /// The returned sender keeps the active slot alive.
    fn ready_app(content: Bytes) -> (watch::Sender<Option<ActiveTorrent>>, Router) {
        let torrent = MemoryTorrent::with_content("movie.mp4", content, 16);
        torrent.complete_all();
        app_for(Arc::new(torrent), 0, test_config())
    }

    fn app_for(
        torrent: Arc<MemoryTorrent>,
        file_index: usize,
        config: ServerConfig,
    ) -> (watch::Sender<Option<ActiveTorrent>>, Router) {
        let (tx, rx) = watch::channel(Some(ActiveTorrent {
            torrent,
            file_index,
        }));
        (tx, router(AppState { active: rx, config }))
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn range_request(uri: &str, range: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(header::RANGE, range)
            .body(Body::empty())
            .unwrap()
    }

    fn hundred_bytes() -> Bytes {
        Bytes::from((0..100u8).collect::<Vec<_>>())
    }

    #[tokio::test]
    async fn test_head_request_has_headers_and_no_body() {
        let (_tx, app) = ready_app(hundred_bytes());
        let request = Request::builder()
            .method(Method::HEAD)
            .uri("/0")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            response.headers().get(header::ACCEPT_RANGES).unwrap(),
            "bytes"
        );
        assert_eq!(
            response.headers().get(header::CONTENT_LENGTH).unwrap(),
            "100"
        );
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "video/mp4"
        );

        let body = to_bytes(response.into_body(), BODY_LIMIT).await.unwrap();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_range_request_returns_exact_bytes() {
        let (_tx, app) = ready_app(hundred_bytes());
        let response = app
            .oneshot(range_request("/0", "bytes=10-19"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            response.headers().get(header::CONTENT_RANGE).unwrap(),
            "bytes 10-19/100"
        );
        assert_eq!(
            response.headers().get(header::CONTENT_LENGTH).unwrap(),
            "10"
        );

        let body = to_bytes(response.into_body(), BODY_LIMIT).await.unwrap();
        assert_eq!(&body[..], &(10..20u8).collect::<Vec<_>>()[..]);
    }

    #[tokio::test]
    async fn test_range_request_waits_for_missing_pieces() {
        let torrent = Arc::new(MemoryTorrent::with_content("movie.mp4", hundred_bytes(), 16));
        let (_tx, app) = app_for(torrent.clone(), 0, test_config());

        // Nothing downloaded yet; deliver the needed pieces shortly
        // after the request is in flight.
        let driver = torrent.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            driver.complete_byte_range(0, 99);
        });

        let response = app
            .oneshot(range_request("/0", "bytes=10-19"))
            .await
            .unwrap();
        let body = to_bytes(response.into_body(), BODY_LIMIT).await.unwrap();
        assert_eq!(&body[..], &(10..20u8).collect::<Vec<_>>()[..]);
    }

    #[tokio::test]
    async fn test_index_out_of_range_is_404() {
        let torrent = MemoryTorrent::with_files(
            vec![
                ("a.txt".to_string(), Bytes::from(vec![1u8; 4])),
                ("b.txt".to_string(), Bytes::from(vec![2u8; 4])),
                ("c.txt".to_string(), Bytes::from(vec![3u8; 4])),
            ],
            16,
        );
        let (_tx, app) = app_for(Arc::new(torrent), 0, test_config());

        let response = app.oneshot(get_request("/5")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = to_bytes(response.into_body(), BODY_LIMIT).await.unwrap();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_non_integer_path_is_404() {
        let (_tx, app) = ready_app(hundred_bytes());
        let response = app.oneshot(get_request("/abc")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_nested_path_is_404() {
        let (_tx, app) = ready_app(hundred_bytes());
        let response = app.oneshot(get_request("/a/b")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_root_aliases_active_file_index() {
        let torrent = MemoryTorrent::with_files(
            vec![
                ("small.txt".to_string(), Bytes::from(vec![1u8; 10])),
                ("movie.mp4".to_string(), Bytes::from(vec![2u8; 50])),
            ],
            16,
        );
        torrent.complete_all();
        let (_tx, app) = app_for(Arc::new(torrent), 1, test_config());

        let response = app.oneshot(get_request("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            response.headers().get(header::CONTENT_LENGTH).unwrap(),
            "50"
        );
        let body = to_bytes(response.into_body(), BODY_LIMIT).await.unwrap();
        assert_eq!(&body[..], &vec![2u8; 50][..]);
    }

    #[tokio::test]
    async fn test_request_held_until_torrent_becomes_active() {
        let (tx, rx) = watch::channel(None);
        let app = router(AppState {
            active: rx,
            config: ServerConfig {
                ready_timeout: Duration::from_secs(5),
                ..ServerConfig::default()
            },
        });

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let torrent = MemoryTorrent::with_content("late.mp4", hundred_bytes(), 16);
            torrent.complete_all();
            tx.send_replace(Some(ActiveTorrent {
                torrent: Arc::new(torrent),
                file_index: 0,
            }));
            // Keep the sender alive long enough for the request to finish.
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let response = app.oneshot(get_request("/0")).await.unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        let body = to_bytes(response.into_body(), BODY_LIMIT).await.unwrap();
        assert_eq!(body.len(), 100);
    }

    #[tokio::test]
    async fn test_ready_timeout_answers_503() {
        let (_tx, rx) = watch::channel(None);
        let app = router(AppState {
            active: rx,
            config: ServerConfig {
                ready_timeout: Duration::from_millis(50),
                ..ServerConfig::default()
            },
        });

        let response = app.oneshot(get_request("/0")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_favicon_short_circuits_even_without_active_torrent() {
        let (_tx, rx) = watch::channel(None);
        let app = router(AppState {
            active: rx,
            config: test_config(),
        });

        let response = app.oneshot(get_request("/favicon.ico")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), BODY_LIMIT).await.unwrap();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_range_is_416() {
        let (_tx, app) = ready_app(hundred_bytes());
        let response = app
            .oneshot(range_request("/0", "bytes=50-10"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(
            response.headers().get(header::CONTENT_RANGE).unwrap(),
            "bytes */100"
        );
    }

    #[tokio::test]
    async fn test_rangeless_get_is_206_by_default() {
        let (_tx, app) = ready_app(hundred_bytes());
        let response = app.oneshot(get_request("/0")).await.unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert!(response.headers().get(header::CONTENT_RANGE).is_none());
        assert_eq!(
            response.headers().get(header::CONTENT_LENGTH).unwrap(),
            "100"
        );
        let body = to_bytes(response.into_body(), BODY_LIMIT).await.unwrap();
        assert_eq!(body.len(), 100);
    }

    #[tokio::test]
    async fn test_rangeless_get_is_200_when_configured() {
        let torrent = MemoryTorrent::with_content("movie.mp4", hundred_bytes(), 16);
        torrent.complete_all();
        let config = ServerConfig {
            full_response_ok: true,
            ..test_config()
        };
        let (_tx, app) = app_for(Arc::new(torrent), 0, config);

        let response = app.oneshot(get_request("/0")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

//! HTTP receiver routes.
//!
//! Serves the receiver page and its assets, the small JSON API external
//! displays poll, and the latest mirrored frame.

use std::net::{IpAddr, UdpSocket};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{HeaderValue, Method, StatusCode, Uri, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::bridge::ReceiverBridge;
use crate::config::ServerConfig;

const CONTENT_SECURITY_POLICY: &str = "default-src 'self' 'unsafe-inline' 'unsafe-eval';";

/// Shared state behind every route.
#[derive(Clone)]
pub struct AppState {
    pub bridge: Arc<ReceiverBridge>,
    pub name: String,
    pub version: String,
    /// Address advertised by `/api/info`, resolved once at startup.
    pub ip: String,
    pub port: u16,
    pub static_dir: PathBuf,
    pub index: String,
}

impl AppState {
    pub fn new(config: &ServerConfig, bridge: Arc<ReceiverBridge>) -> Self {
        Self {
            bridge,
            name: config.receiver.name.clone(),
            version: config.receiver.version.clone(),
            ip: local_ip(),
            port: config.network.port,
            static_dir: PathBuf::from(&config.receiver.static_dir),
            index: config.receiver.index.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InfoResponse {
    pub name: String,
    pub version: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub ip: String,
    pub port: u16,
    pub protocols: [&'static str; 2],
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    /// Text the receiver page shows.
    pub mirror: &'static str,
    #[serde(rename = "hasFrame")]
    pub has_frame: bool,
}

/// Build the receiver router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/info", get(info_handler))
        .route("/api/status", get(status_handler))
        .route("/api/frame", get(frame_handler).post(post_frame_handler))
        .route("/", get(index_handler))
        .route("/index.html", get(index_handler))
        .fallback(static_handler)
        .layer(middleware::from_fn(receiver_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// LAN IPv4 address of this host, or `localhost` when there is none.
pub fn local_ip() -> String {
    let outbound = || -> std::io::Result<IpAddr> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        // No packet is sent; connecting only picks the outbound interface.
        socket.connect("192.0.2.1:80")?;
        Ok(socket.local_addr()?.ip())
    };
    match outbound() {
        Ok(IpAddr::V4(ip)) if !ip.is_loopback() && !ip.is_unspecified() => ip.to_string(),
        _ => "localhost".into(),
    }
}

// ── Middleware ───────────────────────────────────────────────────

async fn receiver_headers(request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::OK.into_response()
    } else {
        next.run(request).await
    };

    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    headers.insert("x-goog-cast-service", HeaderValue::from_static("true"));
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(CONTENT_SECURITY_POLICY),
    );
    response
}

// ── Handlers ─────────────────────────────────────────────────────

async fn info_handler(State(state): State<AppState>) -> Json<InfoResponse> {
    Json(InfoResponse {
        name: state.name.clone(),
        version: state.version.clone(),
        kind: "web-display",
        ip: state.ip.clone(),
        port: state.port,
        protocols: ["http", "ws"],
    })
}

async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "active",
        mirror: state.bridge.status().text(),
        has_frame: state.bridge.latest_frame().is_some(),
    })
}

async fn frame_handler(State(state): State<AppState>) -> Response {
    match state.bridge.latest_frame() {
        Some(frame) => Json(frame).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

/// Frames reach receivers over the bus; posted frames are only validated.
async fn post_frame_handler(body: Bytes) -> Response {
    match serde_json::from_slice::<serde_json::Value>(&body) {
        Ok(_) => {
            debug!(bytes = body.len(), "frame posted");
            Json(serde_json::json!({ "received": true })).into_response()
        }
        Err(_) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "Invalid JSON" })),
        )
            .into_response(),
    }
}

async fn index_handler(State(state): State<AppState>) -> Response {
    match tokio::fs::read(state.static_dir.join(&state.index)).await {
        Ok(content) => file_response("text/html", content),
        Err(_) => (StatusCode::NOT_FOUND, "File not found").into_response(),
    }
}

async fn static_handler(State(state): State<AppState>, uri: Uri) -> Response {
    let Some(relative) = safe_relative(uri.path()) else {
        return not_found();
    };
    match tokio::fs::read(state.static_dir.join(&relative)).await {
        Ok(content) => file_response(content_type(&relative), content),
        Err(_) => not_found(),
    }
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not found").into_response()
}

fn file_response(content_type: &'static str, content: Vec<u8>) -> Response {
    ([(header::CONTENT_TYPE, content_type)], Body::from(content)).into_response()
}

/// Request path as a path under the static root; `None` if it escapes.
fn safe_relative(path: &str) -> Option<PathBuf> {
    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    let mut out = PathBuf::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(out)
}

fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("js") => "application/javascript",
        Some("css") => "text/css",
        Some("json") => "application/json",
        Some("html") => "text/html",
        _ => "text/plain",
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use tempfile::TempDir;
    use axum::http::Request;
    use mirror_core::bus::{LocalBus, MessageBus};
    use mirror_core::controller::{WindowManager, WindowOptions};
    use mirror_core::frame::{Frame, FrameEnvelope};
    use mirror_core::message::{ContextId, Message};
    use tower::ServiceExt;

    const BROKER: ContextId = ContextId(100);

    fn make_state(static_dir: &Path) -> (Arc<LocalBus>, AppState) {
        let bus = Arc::new(LocalBus::new());
        let bridge = Arc::new(ReceiverBridge::new(bus.clone(), BROKER));
        let mut config = ServerConfig::default();
        config.receiver.static_dir = static_dir.to_string_lossy().into_owned();
        (bus, AppState::new(&config, bridge))
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(resp.into_body(), 1 << 20).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn info_reports_receiver() {
        let dir = TempDir::new().unwrap();
        let (_bus, state) = make_state(dir.path());
        let resp = router(state).oneshot(get_req("/api/info")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["x-goog-cast-service"], "true");
        assert_eq!(resp.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");

        let json = body_json(resp).await;
        assert_eq!(json["name"], "Webpage Mirror");
        assert_eq!(json["version"], "2.0.0");
        assert_eq!(json["type"], "web-display");
        assert_eq!(json["port"], 8765);
        assert_eq!(json["protocols"], serde_json::json!(["http", "ws"]));
        assert!(json["ip"].is_string());
    }

    #[tokio::test]
    async fn info_serves_ip_resolved_at_startup() {
        let dir = TempDir::new().unwrap();
        let (_bus, mut state) = make_state(dir.path());
        assert!(!state.ip.is_empty());
        state.ip = "10.1.2.3".into();

        let resp = router(state).oneshot(get_req("/api/info")).await.unwrap();
        assert_eq!(body_json(resp).await["ip"], "10.1.2.3");
    }

    #[tokio::test]
    async fn status_is_active() {
        let dir = TempDir::new().unwrap();
        let (_bus, state) = make_state(dir.path());
        let resp = router(state).oneshot(get_req("/api/status")).await.unwrap();
        let json = body_json(resp).await;
        assert_eq!(json["status"], "active");
        assert_eq!(json["mirror"], "Initializing...");
        assert_eq!(json["hasFrame"], false);
    }

    #[tokio::test]
    async fn options_short_circuits() {
        let dir = TempDir::new().unwrap();
        let (_bus, state) = make_state(dir.path());
        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/frame")
            .body(Body::empty())
            .unwrap();
        let resp = router(state).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()[header::ACCESS_CONTROL_ALLOW_METHODS],
            "GET, POST, OPTIONS"
        );
        assert_eq!(
            resp.headers()[header::CONTENT_SECURITY_POLICY],
            CONTENT_SECURITY_POLICY
        );
    }

    #[tokio::test]
    async fn post_frame_validates_json() {
        let dir = TempDir::new().unwrap();
        let (_bus, state) = make_state(dir.path());
        let app = router(state);

        let ok = Request::builder()
            .method(Method::POST)
            .uri("/api/frame")
            .body(Body::from(r#"{"frame":"/9j/"}"#))
            .unwrap();
        let resp = app.clone().oneshot(ok).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["received"], true);

        let bad = Request::builder()
            .method(Method::POST)
            .uri("/api/frame")
            .body(Body::from("{not json"))
            .unwrap();
        let resp = app.oneshot(bad).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"], "Invalid JSON");
    }

    #[tokio::test]
    async fn frame_poll_serves_latest() {
        let dir = TempDir::new().unwrap();
        let (bus, state) = make_state(dir.path());
        let app = router(state.clone());

        let resp = app.clone().oneshot(get_req("/api/frame")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let _broker = bus.register(BROKER);
        let window = state
            .bridge
            .create(WindowOptions {
                url: "mirror.html".into(),
                width: 1024,
                height: 768,
                focused: true,
            })
            .await
            .unwrap();
        let frame = FrameEnvelope::new(&Frame::new(9, 42, vec![0xFF, 0xD8]), window.target);
        let mut frames = state.bridge.subscribe_frames();
        bus.send(BROKER, window.target, Message::DisplayFrame(frame)).unwrap();
        tokio::time::timeout(Duration::from_secs(5), frames.wait_for(Option::is_some))
            .await
            .unwrap()
            .unwrap();

        let resp = app.oneshot(get_req("/api/frame")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["sequenceNumber"], 9);
        assert_eq!(json["timestamp"], 42);
        assert_eq!(json["frame"], "/9g=");
    }

    #[tokio::test]
    async fn index_and_static_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("mirror-server.html"), "<html></html>").unwrap();
        std::fs::write(dir.path().join("app.js"), "let x = 1;").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hi").unwrap();
        let (_bus, state) = make_state(dir.path());
        let app = router(state);

        for uri in ["/", "/index.html"] {
            let resp = app.clone().oneshot(get_req(uri)).await.unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
            assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/html");
        }

        let resp = app.clone().oneshot(get_req("/app.js")).await.unwrap();
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/javascript");
        let resp = app.clone().oneshot(get_req("/notes.txt")).await.unwrap();
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/plain");

        let resp = app.oneshot(get_req("/missing.css")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn missing_index_is_404() {
        let dir = TempDir::new().unwrap();
        let (_bus, state) = make_state(dir.path());
        let resp = router(state).oneshot(get_req("/")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"File not found");
    }

    #[test]
    fn traversal_is_rejected() {
        assert!(safe_relative("/../etc/passwd").is_none());
        assert!(safe_relative("/a/../../b").is_none());
        assert!(safe_relative("/").is_none());
        assert_eq!(safe_relative("/./css/site.css"), Some(PathBuf::from("css/site.css")));
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type(Path::new("a.css")), "text/css");
        assert_eq!(content_type(Path::new("a.json")), "application/json");
        assert_eq!(content_type(Path::new("README")), "text/plain");
    }
}

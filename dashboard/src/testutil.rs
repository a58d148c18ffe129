//! Loopback servers and fixtures shared by the module tests.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Bind a loopback listener and serve `app` on it. Returns the base URL.
pub async fn spawn_app(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Smallest frame the tests can decode: a 4x4 solid-color JPEG.
pub fn tiny_jpeg() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(4, 4, image::Rgb([90, 120, 150]));
    let mut buf = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, image::ImageFormat::Jpeg)
        .unwrap();
    buf.into_inner()
}

/// Counters and switches shared with a scripted dashboard server.
#[derive(Default)]
pub struct ServerHooks {
    pub frame_hits: AtomicUsize,
    pub history_hits: AtomicUsize,
    pub toggle_hits: AtomicUsize,
    /// The server's own streaming flag, flipped by each toggle.
    pub running: AtomicBool,
    /// When set, /video_feed answers 500.
    pub fail_frames: AtomicBool,
}

/// Fake dashboard server covering all five endpoints, with hit counting.
/// The history body is fixed at counts [1, 0, 0, 5, 2, 0, 1].
pub async fn spawn_emotion_server() -> (String, Arc<ServerHooks>) {
    let hooks = Arc::new(ServerHooks::default());
    let app = Router::new()
        .route("/toggle_stream", post(toggle))
        .route("/video_feed", get(frame))
        .route("/get_emotion_history", get(history))
        .route("/get_dominant_emotion", get(dominant))
        .route("/set_filter", post(set_filter))
        .with_state(Arc::clone(&hooks));
    (spawn_app(app).await, hooks)
}

async fn toggle(State(hooks): State<Arc<ServerHooks>>) -> Json<serde_json::Value> {
    hooks.toggle_hits.fetch_add(1, Ordering::SeqCst);
    let now_running = !hooks.running.fetch_xor(true, Ordering::SeqCst);
    Json(json!({ "running": now_running }))
}

async fn frame(State(hooks): State<Arc<ServerHooks>>) -> Response {
    hooks.frame_hits.fetch_add(1, Ordering::SeqCst);
    if hooks.fail_frames.load(Ordering::SeqCst) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    tiny_jpeg().into_response()
}

async fn history(State(hooks): State<Arc<ServerHooks>>) -> Json<serde_json::Value> {
    hooks.history_hits.fetch_add(1, Ordering::SeqCst);
    Json(json!({ "angry": 1, "happy": 5, "neutral": 2, "surprise": 1 }))
}

async fn dominant() -> Json<serde_json::Value> {
    Json(json!({ "dominant": "happy" }))
}

async fn set_filter(Json(body): Json<serde_json::Value>) -> Json<serde_json::Value> {
    Json(json!({ "filter": body["filter"] }))
}

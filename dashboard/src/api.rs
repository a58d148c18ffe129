use chrono::Utc;
use emocam_common::emotion::{Emotion, EmotionHistogram};
use emocam_common::frame::CapturedFrame;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// Failure classes for dashboard server requests. `Build` can only occur
/// while constructing the client; the rest happen per request.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("failed to build HTTP client: {0}")]
    Build(reqwest::Error),
    #[error("request failed: {0}")]
    Network(reqwest::Error),
    #[error("server returned HTTP {0}")]
    Status(u16),
    #[error("failed to decode response body: {0}")]
    Decode(String),
}

/// HTTP client for the emotion dashboard server.
///
/// Holds the frame sequence counter, so snapshots fetched through one
/// client are numbered in fetch order.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    seq: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct ToggleResponse {
    running: bool,
}

#[derive(Debug, Deserialize)]
struct DominantResponse {
    dominant: Option<Emotion>,
}

#[derive(Debug, Deserialize)]
struct FilterResponse {
    filter: String,
}

impl ApiClient {
    pub fn new(base_url: &str, connect_timeout: Duration) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(ApiError::Build)?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            seq: AtomicU64::new(0),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// POST /toggle_stream. The reply carries the server's streaming
    /// flag after the flip, which is authoritative for our state.
    pub async fn toggle_stream(&self) -> Result<bool, ApiError> {
        let resp = self
            .http
            .post(self.url("/toggle_stream"))
            .send()
            .await
            .map_err(ApiError::Network)?;
        let resp = check_status(resp)?;
        let body = resp.bytes().await.map_err(ApiError::Network)?;
        let reply: ToggleResponse = decode(&body)?;
        debug!(running = reply.running, "toggled stream");
        Ok(reply.running)
    }

    /// GET /video_feed for a single JPEG snapshot.
    pub async fn fetch_frame(&self) -> Result<CapturedFrame, ApiError> {
        let resp = self
            .http
            .get(self.url("/video_feed"))
            .send()
            .await
            .map_err(ApiError::Network)?;
        let resp = check_status(resp)?;
        let body = resp.bytes().await.map_err(ApiError::Network)?;
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let frame = CapturedFrame::new(body.to_vec(), Utc::now().timestamp_millis(), seq);
        debug!(seq, bytes = frame.size_bytes(), "fetched frame");
        Ok(frame)
    }

    /// GET /video_feed without consuming the body, for callers that read
    /// it as a continuous multipart stream.
    pub async fn open_feed(&self) -> Result<reqwest::Response, ApiError> {
        let resp = self
            .http
            .get(self.url("/video_feed"))
            .send()
            .await
            .map_err(ApiError::Network)?;
        check_status(resp)
    }

    /// GET /get_emotion_history. Labels the server omits come back as
    /// zero counts.
    pub async fn fetch_history(&self) -> Result<EmotionHistogram, ApiError> {
        let resp = self
            .http
            .get(self.url("/get_emotion_history"))
            .send()
            .await
            .map_err(ApiError::Network)?;
        let resp = check_status(resp)?;
        let body = resp.bytes().await.map_err(ApiError::Network)?;
        decode(&body)
    }

    /// GET /get_dominant_emotion. `None` means the server has not
    /// classified anything yet.
    pub async fn fetch_dominant(&self) -> Result<Option<Emotion>, ApiError> {
        let resp = self
            .http
            .get(self.url("/get_dominant_emotion"))
            .send()
            .await
            .map_err(ApiError::Network)?;
        let resp = check_status(resp)?;
        let body = resp.bytes().await.map_err(ApiError::Network)?;
        let reply: DominantResponse = decode(&body)?;
        Ok(reply.dominant)
    }

    /// POST /set_filter with the server-side filter name. Returns the
    /// name the server reports as applied. This is the server's own
    /// filter chain; it is independent of the client-side filter.
    pub async fn set_server_filter(&self, name: &str) -> Result<String, ApiError> {
        let resp = self
            .http
            .post(self.url("/set_filter"))
            .json(&serde_json::json!({ "filter": name }))
            .send()
            .await
            .map_err(ApiError::Network)?;
        let resp = check_status(resp)?;
        let body = resp.bytes().await.map_err(ApiError::Network)?;
        let reply: FilterResponse = decode(&body)?;
        debug!(filter = reply.filter, "set server filter");
        Ok(reply.filter)
    }
}

fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    if !resp.status().is_success() {
        return Err(ApiError::Status(resp.status().as_u16()));
    }
    Ok(resp)
}

fn decode<T: for<'de> Deserialize<'de>>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{spawn_app, tiny_jpeg};
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;

    fn client(base: &str) -> ApiClient {
        ApiClient::new(base, Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn toggle_returns_the_server_flag() {
        let app = Router::new().route(
            "/toggle_stream",
            post(|| async { Json(json!({ "running": true })) }),
        );
        let base = spawn_app(app).await;
        assert!(client(&base).toggle_stream().await.unwrap());
    }

    #[tokio::test]
    async fn fetch_frame_numbers_snapshots_in_order() {
        let app = Router::new().route("/video_feed", get(|| async { tiny_jpeg() }));
        let base = spawn_app(app).await;
        let api = client(&base);
        let first = api.fetch_frame().await.unwrap();
        let second = api.fetch_frame().await.unwrap();
        assert_eq!(first.seq, 0);
        assert_eq!(second.seq, 1);
        assert!(!first.jpeg.is_empty());
    }

    #[tokio::test]
    async fn history_decodes_partial_bodies() {
        let app = Router::new().route(
            "/get_emotion_history",
            get(|| async { Json(json!({ "happy": 4, "angry": 1 })) }),
        );
        let base = spawn_app(app).await;
        let hist = client(&base).fetch_history().await.unwrap();
        assert_eq!(hist.values(), [1, 0, 0, 4, 0, 0, 0]);
    }

    #[tokio::test]
    async fn dominant_handles_null() {
        let app = Router::new().route(
            "/get_dominant_emotion",
            get(|| async { Json(json!({ "dominant": null })) }),
        );
        let base = spawn_app(app).await;
        assert_eq!(client(&base).fetch_dominant().await.unwrap(), None);
    }

    #[tokio::test]
    async fn dominant_decodes_a_label() {
        let app = Router::new().route(
            "/get_dominant_emotion",
            get(|| async { Json(json!({ "dominant": "happy" })) }),
        );
        let base = spawn_app(app).await;
        assert_eq!(
            client(&base).fetch_dominant().await.unwrap(),
            Some(Emotion::Happy)
        );
    }

    #[tokio::test]
    async fn set_server_filter_echoes_the_applied_name() {
        let app = Router::new().route(
            "/set_filter",
            post(|Json(body): Json<serde_json::Value>| async move {
                Json(json!({ "filter": body["filter"] }))
            }),
        );
        let base = spawn_app(app).await;
        let applied = client(&base).set_server_filter("blur").await.unwrap();
        assert_eq!(applied, "blur");
    }

    #[tokio::test]
    async fn non_success_status_is_reported_as_such() {
        let app = Router::new().route(
            "/get_emotion_history",
            get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let base = spawn_app(app).await;
        match client(&base).fetch_history().await {
            Err(ApiError::Status(500)) => {}
            other => panic!("expected Status(500), got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_error() {
        let app = Router::new().route("/get_emotion_history", get(|| async { "not json" }));
        let base = spawn_app(app).await;
        match client(&base).fetch_history().await {
            Err(ApiError::Decode(_)) => {}
            other => panic!("expected Decode, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_server_is_a_network_error() {
        // bind a port and drop the listener so nothing is listening there
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);
        match client(&base).fetch_history().await {
            Err(ApiError::Network(_)) => {}
            other => panic!("expected Network, got {other:?}"),
        }
    }

    #[test]
    fn trailing_slash_in_base_url_is_normalized() {
        let api = ApiClient::new("http://localhost:5000/", Duration::from_secs(1)).unwrap();
        assert_eq!(api.url("/video_feed"), "http://localhost:5000/video_feed");
    }
}

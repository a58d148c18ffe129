use bytes::BytesMut;
use chrono::Utc;
use emocam_common::frame::CapturedFrame;
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiError};

const BOUNDARY: &[u8] = b"--frame\r\n";
const HEADER_END: &[u8] = b"\r\n\r\n";

/// Parse state for the MJPEG multipart stream.
enum ParseState {
    /// Scanning for the `--frame\r\n` boundary marker.
    SeekingBoundary,
    /// Boundary seen, scanning for the `\r\n\r\n` header terminator.
    SeekingHeaderEnd,
    /// Accumulating JPEG bytes until the next boundary.
    CollectingJpeg,
}

/// Incremental parser for a `multipart/x-mixed-replace` body. Feed it
/// chunks as they arrive; complete JPEG parts come back in order.
/// Empty parts are dropped.
pub struct MjpegParser {
    buffer: BytesMut,
    state: ParseState,
    jpeg_start: usize,
}

impl MjpegParser {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(256 * 1024),
            state: ParseState::SeekingBoundary,
            jpeg_start: 0,
        }
    }

    /// Append one chunk and return the JPEG parts it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(chunk);
        let mut parts = Vec::new();

        loop {
            match self.state {
                ParseState::SeekingBoundary => {
                    if let Some(pos) = find_subsequence(&self.buffer, BOUNDARY) {
                        // Discard everything up to and including the boundary
                        let _ = self.buffer.split_to(pos + BOUNDARY.len());
                        self.state = ParseState::SeekingHeaderEnd;
                    } else {
                        // Keep last few bytes in case the boundary spans chunks
                        if self.buffer.len() > BOUNDARY.len() {
                            let _ = self.buffer.split_to(self.buffer.len() - BOUNDARY.len());
                        }
                        break;
                    }
                }
                ParseState::SeekingHeaderEnd => {
                    if let Some(pos) = find_subsequence(&self.buffer, HEADER_END) {
                        // Discard the part headers
                        let _ = self.buffer.split_to(pos + HEADER_END.len());
                        self.jpeg_start = 0;
                        self.state = ParseState::CollectingJpeg;
                    } else {
                        break;
                    }
                }
                ParseState::CollectingJpeg => {
                    // The next boundary marks where this JPEG ends
                    if let Some(pos) = find_subsequence(&self.buffer[self.jpeg_start..], BOUNDARY) {
                        let jpeg_end = self.jpeg_start + pos;
                        // Strip the trailing \r\n before the boundary
                        let end = if jpeg_end >= 2
                            && self.buffer[jpeg_end - 2] == b'\r'
                            && self.buffer[jpeg_end - 1] == b'\n'
                        {
                            jpeg_end - 2
                        } else {
                            jpeg_end
                        };

                        let jpeg = self.buffer[..end].to_vec();
                        let _ = self.buffer.split_to(jpeg_end + BOUNDARY.len());
                        if !jpeg.is_empty() {
                            parts.push(jpeg);
                        }

                        // Already past the boundary, go straight to headers
                        self.state = ParseState::SeekingHeaderEnd;
                    } else {
                        // No boundary yet; remember how far we scanned
                        self.jpeg_start = if self.buffer.len() > BOUNDARY.len() {
                            self.buffer.len() - BOUNDARY.len()
                        } else {
                            0
                        };
                        break;
                    }
                }
            }
        }

        parts
    }
}

impl Default for MjpegParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Source strategy a stream start builds, from the `[poll] mode` setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedMode {
    Snapshot,
    Mjpeg,
}

/// Where poll ticks get their frames.
pub enum FrameSource {
    /// One GET against the feed endpoint per tick.
    Snapshot { client: Arc<ApiClient> },
    /// Background reader attached to the multipart stream; ticks take
    /// the most recent complete frame.
    Mjpeg {
        latest: watch::Receiver<Option<CapturedFrame>>,
        /// Sequence of the frame handed out last, so the same frame is
        /// never processed twice.
        last_seq: Option<u64>,
        reader: JoinHandle<()>,
    },
}

impl FrameSource {
    pub fn snapshot(client: Arc<ApiClient>) -> Self {
        FrameSource::Snapshot { client }
    }

    pub fn mjpeg(client: Arc<ApiClient>) -> Self {
        let (tx, rx) = watch::channel(None);
        let reader = tokio::spawn(run_mjpeg_reader(client, tx));
        FrameSource::Mjpeg {
            latest: rx,
            last_seq: None,
            reader,
        }
    }

    /// Produce the frame for one tick. `Ok(None)` from an Mjpeg source
    /// means no fresh frame has arrived since the previous tick.
    pub async fn next_frame(&mut self) -> Result<Option<CapturedFrame>, ApiError> {
        match self {
            FrameSource::Snapshot { client } => Ok(Some(client.fetch_frame().await?)),
            FrameSource::Mjpeg {
                latest, last_seq, ..
            } => {
                let slot = latest.borrow_and_update();
                match slot.as_ref() {
                    Some(frame) if Some(frame.seq) != *last_seq => {
                        *last_seq = Some(frame.seq);
                        Ok(Some(frame.clone()))
                    }
                    _ => Ok(None),
                }
            }
        }
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        if let FrameSource::Mjpeg { reader, .. } = self {
            reader.abort();
        }
    }
}

/// Read the multipart stream and publish each complete frame into the
/// latest-frame slot. Exits when the stream ends or errors; there is no
/// reconnect, the next stream start builds a fresh source.
async fn run_mjpeg_reader(client: Arc<ApiClient>, tx: watch::Sender<Option<CapturedFrame>>) {
    let resp = match client.open_feed().await {
        Ok(resp) => resp,
        Err(e) => {
            warn!(error = %e, "failed to attach to MJPEG feed");
            return;
        }
    };
    info!(status = %resp.status(), "attached to MJPEG feed");

    let mut byte_stream = resp.bytes_stream();
    let mut parser = MjpegParser::new();
    let mut seq: u64 = 0;

    while let Some(chunk) = byte_stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!(error = %e, "MJPEG feed read failed");
                break;
            }
        };
        for jpeg in parser.push(&chunk) {
            let frame = CapturedFrame::new(jpeg, Utc::now().timestamp_millis(), seq);
            seq += 1;
            debug!(seq = frame.seq, bytes = frame.size_bytes(), "MJPEG frame");
            if tx.send(Some(frame)).is_err() {
                // nobody is taking frames anymore
                return;
            }
        }
    }
    info!(frames = seq, "MJPEG feed ended");
}

/// Find the position of `needle` in `haystack`.
fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

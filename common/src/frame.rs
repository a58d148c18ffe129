/// One still frame captured from the video feed, with capture metadata.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// Raw JPEG bytes exactly as the server sent them.
    pub jpeg: Vec<u8>,
    /// Capture timestamp, Unix millis.
    pub captured_at_ms: i64,
    /// Sequence number within the producing source.
    pub seq: u64,
}

impl CapturedFrame {
    pub fn new(jpeg: Vec<u8>, captured_at_ms: i64, seq: u64) -> Self {
        Self {
            jpeg,
            captured_at_ms,
            seq,
        }
    }

    pub fn size_bytes(&self) -> usize {
        self.jpeg.len()
    }

    /// Dated subdirectory for archived output, e.g. "2026-02-18".
    pub fn date_dir(&self) -> String {
        self.capture_time().format("%Y-%m-%d").to_string()
    }

    /// File stem for archived output: compact UTC timestamp plus the
    /// zero-padded sequence number, e.g. "20260218T093000451Z_000042".
    /// Stems from one source sort chronologically.
    pub fn file_stem(&self) -> String {
        let ts = self.capture_time().format("%Y%m%dT%H%M%S%3fZ");
        format!("{ts}_{seq:06}", seq = self.seq)
    }

    fn capture_time(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp_millis(self.captured_at_ms)
            .unwrap_or_else(chrono::Utc::now)
    }
}

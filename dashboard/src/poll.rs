use image::{ImageReader, RgbaImage};
use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use emocam_common::frame::CapturedFrame;

use crate::api::ApiClient;
use crate::chart::EmotionChart;
use crate::feed::FrameSource;
use crate::filter::FilterKind;
use crate::sink::FrameSink;

/// Tick counters, shared with whoever wants to display them.
#[derive(Debug, Default)]
pub struct PollStats {
    pub ticks: AtomicU64,
    pub frames_rendered: AtomicU64,
    pub frame_failures: AtomicU64,
    pub chart_failures: AtomicU64,
}

/// Handle to a running poll loop.
///
/// Dropping it does not stop the loop; call [`PollHandle::stop`]. Once
/// `stop` returns the task has wound down, so no further tick can touch
/// the sink or the chart.
pub struct PollHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
    stats: Arc<PollStats>,
}

impl PollHandle {
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "poll task ended abnormally");
        }
    }

    pub fn stats(&self) -> Arc<PollStats> {
        Arc::clone(&self.stats)
    }
}

/// The recurring fetch-render-update cycle behind a running stream.
///
/// Each tick grabs a frame and the emotion histogram concurrently,
/// renders the frame through the active filter into the sink, and hands
/// the histogram to the chart. The next tick is scheduled one interval
/// after the previous one finishes, so a slow server stretches the cycle
/// instead of piling up requests.
pub struct PollLoop {
    client: Arc<ApiClient>,
    source: FrameSource,
    filter_rx: watch::Receiver<FilterKind>,
    chart: EmotionChart,
    sink: FrameSink,
    interval: Duration,
    stats: Arc<PollStats>,
    stop_rx: watch::Receiver<bool>,
}

impl PollLoop {
    /// Spawn the loop onto the runtime. The first tick runs immediately.
    pub fn spawn(
        client: Arc<ApiClient>,
        source: FrameSource,
        filter_rx: watch::Receiver<FilterKind>,
        chart: EmotionChart,
        sink: FrameSink,
        interval: Duration,
    ) -> PollHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let stats = Arc::new(PollStats::default());
        let poll = PollLoop {
            client,
            source,
            filter_rx,
            chart,
            sink,
            interval,
            stats: Arc::clone(&stats),
            stop_rx,
        };
        let task = tokio::spawn(poll.run());
        PollHandle {
            stop_tx,
            task,
            stats,
        }
    }

    async fn run(mut self) {
        info!(interval_ms = self.interval.as_millis() as u64, "poll loop started");
        loop {
            self.tick().await;

            // the tick itself may have observed (and consumed) the stop
            // signal, so check the flag before settling into the sleep
            if *self.stop_rx.borrow() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.stop_rx.changed() => {}
            }
            if *self.stop_rx.borrow() {
                break;
            }
        }
        info!("poll loop stopped");
    }

    async fn tick(&mut self) {
        let tick = self.stats.ticks.fetch_add(1, Ordering::Relaxed);
        // the active filter is read once and used for the whole tick
        let filter = *self.filter_rx.borrow();
        debug!(tick, filter = filter.name(), "tick");

        let work = async {
            tokio::join!(self.source.next_frame(), self.client.fetch_history())
        };
        let outcome = tokio::select! {
            results = work => Some(results),
            _ = self.stop_rx.changed() => None,
        };
        let Some((frame_res, hist_res)) = outcome else {
            debug!(tick, "tick abandoned, stop requested");
            return;
        };
        // a fetch that completed in the same instant as the stop signal
        // must not repaint anything
        if *self.stop_rx.borrow() {
            debug!(tick, "tick results discarded, stop requested");
            return;
        }

        match frame_res {
            Ok(Some(frame)) => self.render_frame(&frame, filter),
            Ok(None) => debug!(tick, "no fresh frame this tick"),
            Err(e) => {
                self.stats.frame_failures.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "frame fetch failed, skipping this tick's frame");
            }
        }

        match hist_res {
            Ok(hist) => self.chart.update(&hist),
            Err(e) => {
                self.stats.chart_failures.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "emotion history fetch failed, chart unchanged");
            }
        }
    }

    fn render_frame(&mut self, frame: &CapturedFrame, filter: FilterKind) {
        let mut rgba = match decode_jpeg(&frame.jpeg) {
            Some(rgba) => rgba,
            None => {
                self.stats.frame_failures.fetch_add(1, Ordering::Relaxed);
                warn!(seq = frame.seq, "failed to decode JPEG frame, skipping");
                return;
            }
        };

        filter.apply(&mut rgba);

        match self.sink.write(frame, &rgba) {
            Ok(_) => {
                self.stats.frames_rendered.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => warn!(error = %e, seq = frame.seq, "failed to write rendered frame"),
        }
    }
}

fn decode_jpeg(jpeg: &[u8]) -> Option<RgbaImage> {
    let img = ImageReader::new(Cursor::new(jpeg))
        .with_guessed_format()
        .ok()?
        .decode()
        .ok()?;
    Some(img.to_rgba8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::ChartRenderer;
    use crate::testutil::spawn_emotion_server;
    use emocam_common::emotion::Emotion;
    use std::path::PathBuf;
    use std::sync::atomic::Ordering as AtomicOrdering;
    use std::sync::Mutex;

    struct Recording {
        draws: Arc<Mutex<Vec<[u64; 7]>>>,
    }

    impl ChartRenderer for Recording {
        fn draw(&mut self, values: &[u64; 7], _dominant: Option<Emotion>) {
            self.draws.lock().unwrap().push(*values);
        }
    }

    fn recording_chart() -> (EmotionChart, Arc<Mutex<Vec<[u64; 7]>>>) {
        let draws = Arc::new(Mutex::new(Vec::new()));
        let chart = EmotionChart::new(Box::new(Recording {
            draws: Arc::clone(&draws),
        }));
        (chart, draws)
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("emocam-poll-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    async fn api(base: &str) -> Arc<ApiClient> {
        Arc::new(ApiClient::new(base, Duration::from_secs(2)).unwrap())
    }

    async fn wait_until(mut done: impl FnMut() -> bool) {
        for _ in 0..400 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached within 4s");
    }

    #[tokio::test]
    async fn first_tick_runs_immediately() {
        let (base, hooks) = spawn_emotion_server().await;
        let client = api(&base).await;
        let (chart, draws) = recording_chart();
        let dir = scratch_dir("first-tick");
        let (_tx, filter_rx) = watch::channel(FilterKind::None);

        // interval far longer than the test: only the immediate tick fires
        let handle = PollLoop::spawn(
            Arc::clone(&client),
            FrameSource::snapshot(client),
            filter_rx,
            chart,
            FrameSink::new(&dir, false),
            Duration::from_secs(120),
        );

        wait_until(|| hooks.history_hits.load(AtomicOrdering::SeqCst) >= 1).await;
        wait_until(|| !draws.lock().unwrap().is_empty()).await;
        assert_eq!(draws.lock().unwrap()[0], [1, 0, 0, 5, 2, 0, 1]);

        handle.stop().await;
        assert_eq!(hooks.history_hits.load(AtomicOrdering::SeqCst), 1);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn ticks_chain_until_stopped_and_never_after() {
        let (base, hooks) = spawn_emotion_server().await;
        let client = api(&base).await;
        let (chart, _draws) = recording_chart();
        let dir = scratch_dir("chain");
        let (_tx, filter_rx) = watch::channel(FilterKind::None);

        let handle = PollLoop::spawn(
            Arc::clone(&client),
            FrameSource::snapshot(client),
            filter_rx,
            chart,
            FrameSink::new(&dir, false),
            Duration::from_millis(20),
        );

        wait_until(|| hooks.history_hits.load(AtomicOrdering::SeqCst) >= 3).await;
        let stats = handle.stats();
        handle.stop().await;

        // stop() joins the task, so the counters are final now
        let frames = hooks.frame_hits.load(AtomicOrdering::SeqCst);
        let histories = hooks.history_hits.load(AtomicOrdering::SeqCst);
        assert!(stats.ticks.load(AtomicOrdering::Relaxed) >= 3);
        assert!(stats.frames_rendered.load(AtomicOrdering::Relaxed) >= 1);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(hooks.frame_hits.load(AtomicOrdering::SeqCst), frames);
        assert_eq!(hooks.history_hits.load(AtomicOrdering::SeqCst), histories);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn frame_failures_do_not_stall_the_chart() {
        let (base, hooks) = spawn_emotion_server().await;
        hooks.fail_frames.store(true, AtomicOrdering::SeqCst);
        let client = api(&base).await;
        let (chart, draws) = recording_chart();
        let dir = scratch_dir("frame-fail");
        let (_tx, filter_rx) = watch::channel(FilterKind::None);

        let handle = PollLoop::spawn(
            Arc::clone(&client),
            FrameSource::snapshot(client),
            filter_rx,
            chart,
            FrameSink::new(&dir, false),
            Duration::from_millis(20),
        );

        wait_until(|| hooks.history_hits.load(AtomicOrdering::SeqCst) >= 3).await;
        let stats = handle.stats();
        handle.stop().await;

        assert!(stats.frame_failures.load(AtomicOrdering::Relaxed) >= 1);
        assert_eq!(stats.frames_rendered.load(AtomicOrdering::Relaxed), 0);
        // the chart kept updating while frames failed
        assert!(!draws.lock().unwrap().is_empty());
        assert!(std::fs::metadata(dir.join("latest.png")).is_err());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn active_filter_shapes_the_rendered_output() {
        let (base, hooks) = spawn_emotion_server().await;
        let client = api(&base).await;
        let (chart, _draws) = recording_chart();
        let dir = scratch_dir("filtered");
        let (_tx, filter_rx) = watch::channel(FilterKind::Sketch);

        let handle = PollLoop::spawn(
            Arc::clone(&client),
            FrameSource::snapshot(client),
            filter_rx,
            chart,
            FrameSink::new(&dir, false),
            Duration::from_millis(20),
        );

        wait_until(|| hooks.frame_hits.load(AtomicOrdering::SeqCst) >= 2).await;
        handle.stop().await;

        // sketch collapses every pixel to a single inverted gray value;
        // JPEG noise shifts it slightly but all channels stay equal
        let rendered = image::open(dir.join("latest.png")).unwrap().to_rgba8();
        for px in rendered.pixels() {
            let [r, g, b, a] = px.0;
            assert_eq!(r, g);
            assert_eq!(g, b);
            assert!((120..=150).contains(&r), "unexpected sketch level {r}");
            assert_eq!(a, 255);
        }
        let _ = std::fs::remove_dir_all(&dir);
    }
}

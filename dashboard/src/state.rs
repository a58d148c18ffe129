use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::api::{ApiClient, ApiError};
use crate::chart::{EmotionChart, TermChart};
use crate::feed::{FeedMode, FrameSource};
use crate::filter::FilterKind;
use crate::poll::{PollHandle, PollLoop, PollStats};
use crate::sink::FrameSink;

/// Everything a stream start needs to assemble a fresh poll loop.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub interval: Duration,
    pub mode: FeedMode,
    pub output_dir: PathBuf,
    pub keep_history: bool,
}

/// Start/stop control for the video stream.
///
/// Two states, STOPPED and RUNNING. Each toggle asks the server to flip
/// its streaming flag and follows the reply, so client and server never
/// disagree about which side of the transition they landed on. A poll
/// handle exists exactly while RUNNING.
pub struct StreamControl {
    client: Arc<ApiClient>,
    filter_tx: watch::Sender<FilterKind>,
    settings: LoopSettings,
    handle: Option<PollHandle>,
}

impl StreamControl {
    pub fn new(
        client: Arc<ApiClient>,
        initial_filter: FilterKind,
        settings: LoopSettings,
    ) -> Self {
        let (filter_tx, _) = watch::channel(initial_filter);
        Self {
            client,
            filter_tx,
            settings,
            handle: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Caption for the one start/stop control, naming the action a press
    /// would perform next.
    pub fn action_label(&self) -> &'static str {
        if self.is_running() {
            "Stop Camera"
        } else {
            "Start Camera"
        }
    }

    pub fn current_filter(&self) -> FilterKind {
        *self.filter_tx.borrow()
    }

    /// Switch the client-side filter. The running loop picks it up on
    /// its next tick; frames already rendered are never reprocessed.
    pub fn set_filter(&self, filter: FilterKind) {
        let previous = self.filter_tx.send_replace(filter);
        if previous != filter {
            info!(from = previous.name(), to = filter.name(), "switched filter");
        }
    }

    pub fn stats(&self) -> Option<Arc<PollStats>> {
        self.handle.as_ref().map(|handle| handle.stats())
    }

    /// One press of the start/stop control. Returns the server's
    /// streaming flag after the flip. If the request fails nothing
    /// changes locally.
    pub async fn toggle(&mut self) -> Result<bool, ApiError> {
        let running = self.client.toggle_stream().await?;
        match (running, self.handle.is_some()) {
            (true, false) => {
                info!("STOPPED→RUNNING: starting poll loop");
                self.handle = Some(self.start_loop());
            }
            (false, true) => {
                info!("RUNNING→STOPPED: stopping poll loop");
                if let Some(handle) = self.handle.take() {
                    handle.stop().await;
                }
            }
            (true, true) => {
                warn!("server reports streaming already on, poll loop unchanged");
            }
            (false, false) => {
                warn!("server reports streaming already off");
            }
        }
        Ok(running)
    }

    /// Wind down the local loop without flipping the server, for client
    /// exit. The server keeps streaming for other clients.
    pub async fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            info!("shutting down poll loop");
            handle.stop().await;
        }
    }

    fn start_loop(&self) -> PollHandle {
        let source = match self.settings.mode {
            FeedMode::Snapshot => FrameSource::snapshot(Arc::clone(&self.client)),
            FeedMode::Mjpeg => FrameSource::mjpeg(Arc::clone(&self.client)),
        };
        let chart = EmotionChart::new(Box::new(TermChart::new()));
        let sink = FrameSink::new(&self.settings.output_dir, self.settings.keep_history);
        PollLoop::spawn(
            Arc::clone(&self.client),
            source,
            self.filter_tx.subscribe(),
            chart,
            sink,
            self.settings.interval,
        )
    }
}

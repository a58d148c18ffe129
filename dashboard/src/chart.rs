use emocam_common::emotion::{Emotion, EmotionHistogram};
use tracing::debug;

/// Rendering seam for the emotion bar chart.
///
/// The dashboard ships a terminal renderer; anything that can draw seven
/// labeled bars can stand in. `values` always arrive in canonical label
/// order and fully replace whatever was on screen.
pub trait ChartRenderer: Send {
    fn draw(&mut self, values: &[u64; 7], dominant: Option<Emotion>);
}

/// Feeds freshly fetched histograms to a renderer.
///
/// Redraws are skipped while the counts are unchanged, so a static scene
/// does not repaint the same bars five times a second.
pub struct EmotionChart {
    renderer: Box<dyn ChartRenderer + Send>,
    last: Option<[u64; 7]>,
}

impl EmotionChart {
    pub fn new(renderer: Box<dyn ChartRenderer + Send>) -> Self {
        Self {
            renderer,
            last: None,
        }
    }

    /// Replace the chart contents from a histogram response.
    pub fn update(&mut self, hist: &EmotionHistogram) {
        let values = hist.values();
        if self.last == Some(values) {
            return;
        }
        debug!(total = hist.total(), "chart values changed, redrawing");
        self.renderer.draw(&values, hist.dominant());
        self.last = Some(values);
    }
}

/// Terminal bar chart: one row per emotion, bars scaled so the largest
/// count fills the row.
pub struct TermChart {
    width: usize,
}

impl TermChart {
    pub fn new() -> Self {
        Self { width: 40 }
    }
}

impl Default for TermChart {
    fn default() -> Self {
        Self::new()
    }
}

impl ChartRenderer for TermChart {
    fn draw(&mut self, values: &[u64; 7], dominant: Option<Emotion>) {
        let max = *values.iter().max().unwrap_or(&0);
        println!();
        for (emotion, &count) in Emotion::ALL.iter().zip(values) {
            println!(
                "{:>8} | {:<width$} {}",
                emotion.label(),
                bar(count, max, self.width),
                count,
                width = self.width
            );
        }
        match dominant {
            Some(emotion) => println!("dominant: {emotion}"),
            None => println!("dominant: (none yet)"),
        }
    }
}

/// Bar of `#` cells proportional to `count / max`. Nonzero counts always
/// get at least one cell.
fn bar(count: u64, max: u64, width: usize) -> String {
    if count == 0 || max == 0 {
        return String::new();
    }
    let cells = ((count as f64 / max as f64) * width as f64).round() as usize;
    "#".repeat(cells.max(1))
}

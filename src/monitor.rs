//! Presentation tick: reads ring buffer snapshots on a fixed interval.
//!
//! Shows the newest value on a status line and, when a plot path is set,
//! redraws the waveform PNG whenever the buffer has changed since the last
//! frame. Never touches the ingest path beyond `RingBuffer` reads.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, warn};
use tokio::time::MissedTickBehavior;

use crate::draw::draw_waveform_frame;
use crate::parse::{Sample, SampleRange};
use crate::ring::RingBuffer;
use crate::shutdown::ShutdownSignal;

const LINE_COLOR: [u8; 4] = [31, 119, 180, 255];
const BG_COLOR: [u8; 4] = [255, 255, 255, 255];

pub struct PlotTarget {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

pub struct Monitor {
    buffer: Arc<RingBuffer>,
    range: SampleRange,
    tick: Duration,
    plot: Option<PlotTarget>,
    status: ProgressBar,
}

/// What the tick loop did before it stopped.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct MonitorStats {
    pub ticks: u64,
    pub frames_drawn: u64,
}

pub fn status_line(latest: Sample) -> String {
    format!("Current Audio Value: {:.2}", latest as f64)
}

impl Monitor {
    pub fn new(buffer: Arc<RingBuffer>, range: SampleRange, tick: Duration) -> Self {
        Self {
            buffer,
            range,
            tick,
            plot: None,
            status: ProgressBar::hidden(),
        }
    }

    pub fn with_plot(mut self, plot: PlotTarget) -> Self {
        self.plot = Some(plot);
        self
    }

    /// Attach a terminal spinner for the status line.
    pub fn with_status_line(mut self) -> Self {
        let bar = ProgressBar::new_spinner();
        match ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            Ok(style) => bar.set_style(style),
            Err(e) => warn!("status line style rejected: {}", e),
        }
        bar.set_message(status_line(self.buffer.latest()));
        self.status = bar;
        self
    }

    /// Tick until shutdown. Plot failures are logged and retried next change.
    pub async fn run(self, mut shutdown: ShutdownSignal) -> MonitorStats {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut stats = MonitorStats::default();
        let mut drawn_generation = None;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {}
            }
            stats.ticks += 1;

            let (generation, snapshot) = self.buffer.tagged_snapshot();
            let latest = snapshot.last().copied().unwrap_or_default();
            self.status.set_message(status_line(latest));
            self.status.tick();

            let Some(plot) = &self.plot else { continue };
            if drawn_generation == Some(generation) {
                continue;
            }
            match self.render(plot, snapshot).await {
                Ok(()) => {
                    drawn_generation = Some(generation);
                    stats.frames_drawn += 1;
                }
                Err(e) => warn!("failed to write plot {}: {}", plot.path.display(), e),
            }
        }

        self.status.finish_and_clear();
        debug!(
            "monitor stopped after {} ticks, {} frames drawn",
            stats.ticks, stats.frames_drawn
        );
        stats
    }

    async fn render(
        &self,
        plot: &PlotTarget,
        snapshot: Vec<Sample>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let path = plot.path.clone();
        let (width, height, range) = (plot.width, plot.height, self.range);
        tokio::task::spawn_blocking(move || {
            let img = draw_waveform_frame(width, height, &snapshot, &range, LINE_COLOR, BG_COLOR);
            img.save(&path)
        })
        .await??;
        Ok(())
    }
}

use std::path::Path;
use std::time::{Duration, Instant};

use chrono::Local;
use tracing::debug;

use punt_device::{DeviceBridge, parse_proc_status};
use punt_types::ResourceSample;

/// Default spacing between resource samples
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(5);

/// Liveness spinner frames
const GLYPHS: [char; 4] = ['|', '/', '-', '\\'];

/// Rate-limited memory/thread sampling of tracked processes
pub struct ResourceSampler {
    interval: Duration,
    last_attempt: Option<Instant>,

    /// Status-line summary of the most recent successful sample
    latest: Option<String>,
}

impl ResourceSampler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_attempt: None,
            latest: None,
        }
    }

    /// True if no attempt was made within the last interval
    pub fn is_due(&self, now: Instant) -> bool {
        match self.last_attempt {
            Some(last) => now.saturating_duration_since(last) >= self.interval,
            None => true,
        }
    }

    /// Query every pid once. Failed or incomplete answers are skipped; the
    /// attempt counts against the interval either way.
    pub async fn sample<B: DeviceBridge>(
        &mut self,
        bridge: &B,
        pids: &[String],
        now: Instant,
    ) -> Vec<ResourceSample> {
        self.last_attempt = Some(now);

        let mut samples = Vec::with_capacity(pids.len());
        for pid in pids {
            match bridge.proc_status(pid).await {
                Ok(status) => match parse_proc_status(pid, &status, Local::now()) {
                    Some(sample) => samples.push(sample),
                    None => debug!(%pid, "incomplete process status"),
                },
                Err(e) => debug!(%pid, error = %e, "resource sample failed"),
            }
        }

        if !samples.is_empty() {
            let summary: Vec<String> = samples.iter().map(ResourceSample::summary).collect();
            self.latest = Some(summary.join("; "));
        }
        samples
    }

    pub fn latest(&self) -> Option<&str> {
        self.latest.as_deref()
    }
}

impl Default for ResourceSampler {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_INTERVAL)
    }
}

/// Builds the transient status line shown below the record stream
pub struct StatusLine {
    started: Instant,
    frame: usize,
}

impl StatusLine {
    pub fn new(started: Instant) -> Self {
        Self { started, frame: 0 }
    }

    /// Render the next frame; every call advances the spinner
    pub fn render(
        &mut self,
        now: Instant,
        output: Option<&Path>,
        sample: Option<&str>,
        exceptions: u64,
    ) -> String {
        let glyph = GLYPHS[self.frame % GLYPHS.len()];
        self.frame = self.frame.wrapping_add(1);

        let output = output
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string());

        format!(
            "{} {} | {} | {} | exceptions: {}",
            glyph,
            format_elapsed(now.saturating_duration_since(self.started)),
            output,
            sample.unwrap_or("-"),
            exceptions
        )
    }
}

/// Elapsed time, largest unit first, zero leading units omitted
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;

    if days > 0 {
        format!("{}d {}h {}m {}s", days, hours, minutes, seconds)
    } else if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

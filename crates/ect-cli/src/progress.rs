//! Progress-bar monitor for `ect run --monitor`.

use ect_core::Monitor;
use indicatif::{ProgressBar, ProgressStyle};

/// Bar resolution. Fractional work is mapped onto this many ticks.
const TICKS: u64 = 1000;

pub struct ProgressMonitor {
    bar: ProgressBar,
    total: Option<f64>,
    worked: f64,
}

impl ProgressMonitor {
    /// A bar drawn on stderr.
    pub fn new() -> Self {
        Self::with_bar(ProgressBar::new(TICKS))
    }

    fn with_bar(bar: ProgressBar) -> Self {
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {percent:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        bar.set_style(style);
        Self {
            bar,
            total: None,
            worked: 0.0,
        }
    }

    fn position(&self) -> u64 {
        match self.total {
            Some(total) if total > 0.0 => {
                ((self.worked / total).clamp(0.0, 1.0) * TICKS as f64).round() as u64
            }
            _ => 0,
        }
    }
}

impl Monitor for ProgressMonitor {
    fn begin(&mut self, total_work: f64, label: &str) {
        self.total = Some(total_work);
        self.worked = 0.0;
        self.bar.set_position(0);
        self.bar.set_message(label.to_string());
    }

    fn progress(&mut self, amount: f64, message: Option<&str>) {
        self.worked += amount;
        self.bar.set_position(self.position());
        if let Some(message) = message {
            self.bar.set_message(message.to_string());
        }
    }

    fn done(&mut self) {
        self.bar.set_position(TICKS);
        self.bar.finish_with_message("done");
    }

    // Nothing can interrupt a CLI run yet.
    fn is_cancelled(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fractional_work_maps_to_ticks() {
        let mut monitor = ProgressMonitor::with_bar(ProgressBar::hidden());
        monitor.begin(4.0, "graph");
        monitor.progress(1.0, None);
        monitor.progress(0.5, Some("halfway there"));
        assert_eq!(monitor.bar.position(), 375);

        monitor.done();
        assert_eq!(monitor.bar.position(), TICKS);
        assert!(monitor.bar.is_finished());
    }

    #[test]
    fn test_progress_without_begin_stays_at_zero() {
        let mut monitor = ProgressMonitor::with_bar(ProgressBar::hidden());
        monitor.progress(3.0, None);
        assert_eq!(monitor.bar.position(), 0);
    }
}

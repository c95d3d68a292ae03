//! Progress monitoring and cooperative cancellation.
//!
//! A [`Monitor`] is threaded through every invocation. Operations report
//! work into it and poll [`Monitor::is_cancelled`]; nothing in the core
//! interrupts a running operation.
//!
//! Nested work reports through a [`ChildMonitor`], which owns a fixed share
//! of its parent's total and rescales whatever the child declares into that
//! share.

use crate::error::OpError;
use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Progress-reporting and cancellation-query handle.
pub trait Monitor {
    /// Start a unit of work of size `total_work`.
    fn begin(&mut self, total_work: f64, label: &str);

    /// Report `amount` units of work completed since the last report.
    fn progress(&mut self, amount: f64, message: Option<&str>);

    /// Mark the work as finished.
    fn done(&mut self);

    fn is_cancelled(&self) -> bool;

    /// Fail with [`OpError::Cancelled`] if cancellation was requested.
    fn check_cancelled(&self) -> Result<(), OpError> {
        if self.is_cancelled() {
            Err(OpError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl<'p> dyn Monitor + 'p {
    /// Derive a monitor that accounts for `work` units of this monitor's
    /// declared total.
    pub fn child(&mut self, work: f64) -> ChildMonitor<'_> {
        ChildMonitor::new(self, work)
    }
}

/// Shared cancellation request, settable from any thread.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Monitor that ignores everything and is never cancelled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullMonitor;

impl NullMonitor {
    pub fn new() -> Self {
        Self
    }
}

impl Monitor for NullMonitor {
    fn begin(&mut self, _total_work: f64, _label: &str) {}

    fn progress(&mut self, _amount: f64, _message: Option<&str>) {}

    fn done(&mut self) {}

    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Monitor rendering human-readable progress lines.
///
/// Output looks like `label: 40% message`. Write failures are ignored so a
/// closed terminal never fails an operation.
pub struct ConsoleMonitor {
    out: Box<dyn Write + Send>,
    label: String,
    total: Option<f64>,
    worked: f64,
    cancel: CancelFlag,
}

impl std::fmt::Debug for ConsoleMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleMonitor")
            .field("label", &self.label)
            .field("total", &self.total)
            .field("worked", &self.worked)
            .finish()
    }
}

impl ConsoleMonitor {
    /// Create a monitor writing to `out`.
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Box::new(out),
            label: String::new(),
            total: None,
            worked: 0.0,
            cancel: CancelFlag::new(),
        }
    }

    /// Create a monitor writing to standard output.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Total work reported so far.
    pub fn worked(&self) -> f64 {
        self.worked
    }

    /// Total work declared by the last `begin`.
    pub fn total(&self) -> Option<f64> {
        self.total
    }
}

impl Monitor for ConsoleMonitor {
    fn begin(&mut self, total_work: f64, label: &str) {
        self.label = label.to_string();
        self.total = Some(total_work);
        self.worked = 0.0;
        let _ = writeln!(self.out, "{}: started", self.label);
    }

    fn progress(&mut self, amount: f64, message: Option<&str>) {
        self.worked += amount;
        let line = match self.total {
            Some(total) if total > 0.0 => {
                let percent = (100.0 * self.worked / total).clamp(0.0, 100.0);
                format!("{}: {:.0}%", self.label, percent)
            }
            _ => format!("{}: {}", self.label, self.worked),
        };
        let _ = match message {
            Some(msg) if !msg.is_empty() => writeln!(self.out, "{line} {msg}"),
            _ => writeln!(self.out, "{line}"),
        };
    }

    fn done(&mut self) {
        let _ = writeln!(self.out, "{}: done", self.label);
        let _ = self.out.flush();
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Granularity of the work a child forwards, 2^-20 units.
///
/// Multiples of a power of two add without rounding error, so a parent
/// summing its children's reports lands exactly on its declared total.
const QUANTUM: f64 = 1.0 / 1_048_576.0;

fn quantize(work: f64) -> f64 {
    (work / QUANTUM).round() * QUANTUM
}

/// A monitor accounting for a fixed share of a parent monitor's work.
///
/// Work the child reports is scaled by `work / total` (with `total` taken
/// from the child's own `begin`) and forwarded to the parent. `done`
/// forwards whatever is left, so the parent always receives exactly `work`
/// units once the child finishes.
pub struct ChildMonitor<'a> {
    parent: &'a mut dyn Monitor,
    work: f64,
    label: String,
    total: Option<f64>,
    worked: f64,
    forwarded: f64,
    finished: bool,
}

impl<'a> ChildMonitor<'a> {
    pub fn new(parent: &'a mut dyn Monitor, work: f64) -> Self {
        Self {
            parent,
            work: work.max(0.0),
            label: String::new(),
            total: None,
            worked: 0.0,
            forwarded: 0.0,
            finished: false,
        }
    }

    fn forward(&mut self, target: f64, message: Option<&str>) {
        let delta = target - self.forwarded;
        if delta > 0.0 {
            self.forwarded = target;
            let message = message.or(Some(self.label.as_str()).filter(|l| !l.is_empty()));
            self.parent.progress(delta, message);
        }
    }
}

impl Monitor for ChildMonitor<'_> {
    fn begin(&mut self, total_work: f64, label: &str) {
        self.label = label.to_string();
        self.total = (total_work > 0.0).then_some(total_work);
        self.worked = 0.0;
    }

    fn progress(&mut self, amount: f64, message: Option<&str>) {
        if self.finished {
            return;
        }
        self.worked += amount;
        // Without a declared total, child units are parent units.
        let target = match self.total {
            Some(total) => self.work * (self.worked.min(total) / total),
            None => self.worked.min(self.work),
        };
        self.forward(quantize(target).min(self.work), message);
    }

    fn done(&mut self) {
        if self.finished {
            return;
        }
        let work = self.work;
        self.forward(work, None);
        self.forwarded = work;
        self.finished = true;
    }

    fn is_cancelled(&self) -> bool {
        self.parent.is_cancelled()
    }
}

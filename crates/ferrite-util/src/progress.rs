//! Progress reporting with cooperative cancellation.
//!
//! Long operations (pack writing, indexing, history walks) accept a
//! `ProgressMonitor`. Cancellation is cooperative: the operation polls
//! `is_cancelled` between frames and winds down with a cancellation error
//! that callers must not swallow.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Receiver for task progress. All methods have do-nothing defaults so
/// implementations only override what they display.
pub trait ProgressMonitor: Send {
    /// A new task began. `total` is `None` when the amount of work is unknown.
    fn begin(&mut self, _task: &str, _total: Option<u64>) {}

    /// `amount` additional units of the current task completed.
    fn update(&mut self, _amount: u64) {}

    /// The current task finished.
    fn end(&mut self) {}

    /// Polled between work frames; `true` aborts the operation.
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Monitor that discards all progress and never cancels.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMonitor;

impl ProgressMonitor for NullMonitor {}

/// Shared flag that turns any monitor cancellable from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

impl ProgressMonitor for CancelToken {
    fn is_cancelled(&self) -> bool {
        CancelToken::is_cancelled(self)
    }
}

/// Monitor that counts updates; used by tests to observe task structure.
#[derive(Debug, Default)]
pub struct CountingMonitor {
    pub tasks: Vec<(String, Option<u64>)>,
    pub completed: u64,
}

impl ProgressMonitor for CountingMonitor {
    fn begin(&mut self, task: &str, total: Option<u64>) {
        self.tasks.push((task.to_string(), total));
    }

    fn update(&mut self, amount: u64) {
        self.completed += amount;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_monitor_never_cancels() {
        let m = NullMonitor;
        assert!(!m.is_cancelled());
    }

    #[test]
    fn cancel_token_flips_once() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());

        let clone = token.clone();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn counting_monitor_records() {
        let mut m = CountingMonitor::default();
        m.begin("Counting objects", Some(10));
        m.update(4);
        m.update(6);
        m.end();
        assert_eq!(m.tasks.len(), 1);
        assert_eq!(m.completed, 10);
    }
}

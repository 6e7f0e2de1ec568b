//! Fire-and-forget progress reporting.
//!
//! Sinks must not block and cannot fail a run; they return nothing.

use std::sync::atomic::{AtomicU64, Ordering};

/// Receives progress events from a run.
pub trait ProgressSink {
    /// One sweep finished.
    fn tick(&self) {}

    /// Free-form status line (phase changes, simulator output).
    fn message(&self, _msg: &str) {}
}

/// Reports progress through `tracing` at info level.
#[derive(Debug, Default)]
pub struct LogProgress {
    label: String,
    ticks: AtomicU64,
}

impl LogProgress {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ticks: Default::default(),
        }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}

impl ProgressSink for LogProgress {
    fn tick(&self) {
        let n = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(label = %self.label, sweeps = n, "sweep complete");
    }

    fn message(&self, msg: &str) {
        tracing::info!(label = %self.label, "{msg}");
    }
}

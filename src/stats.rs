//! Run statistics collection for `--stats` output.

use std::time::{Duration, Instant};

/// Collects counters and phase timings for one run.
///
/// Created when `--stats` is passed, threaded as `Option<&mut RunStats>`.
/// Nothing is counted when `None`.
pub struct RunStats {
    total_start: Instant,
    phases: Vec<(&'static str, Duration)>,
    // Output stream
    pub lines_read: u64,
    pub lines_discarded: u64,
    pub records: u64,
    pub sweeps_completed: u64,
    // Batch verification
    pub result_files: u64,
    pub exit_code: Option<i32>,
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStats {
    pub fn new() -> Self {
        Self {
            total_start: Instant::now(),
            phases: Vec::new(),
            lines_read: 0,
            lines_discarded: 0,
            records: 0,
            sweeps_completed: 0,
            result_files: 0,
            exit_code: None,
        }
    }

    /// Record a completed phase with its duration.
    pub fn add_phase(&mut self, name: &'static str, duration: Duration) {
        self.phases.push((name, duration));
    }

    pub fn phases(&self) -> &[(&'static str, Duration)] {
        &self.phases
    }

    /// Print the stats table to stderr.
    pub fn display(&self) {
        let total = self.total_start.elapsed();
        eprintln!();
        eprintln!("=== mcspice Run Stats ===");

        for (name, dur) in &self.phases {
            eprintln!("  {:<24} {:>8.3}s", name, dur.as_secs_f64());
        }

        if self.lines_read > 0 {
            eprintln!("  Output lines:           {}", self.lines_read);
            eprintln!("    Discarded:            {}", self.lines_discarded);
            eprintln!("    Records:              {}", self.records);
        }
        if self.sweeps_completed > 0 {
            eprintln!("  Sweeps completed:       {}", self.sweeps_completed);
        }
        if self.result_files > 0 {
            eprintln!("  Result files:           {}", self.result_files);
        }
        if let Some(code) = self.exit_code {
            eprintln!("  Exit code:              {}", code);
        }

        eprintln!("  ─────────────────────────────────");
        eprintln!("  Total:                  {:>8.3}s", total.as_secs_f64());
    }
}

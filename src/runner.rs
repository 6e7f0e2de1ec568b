//! Streaming simulator runs.
//!
//! The simulator is launched with its `.print` listing on stdout. Each line is
//! classified by its first character:
//!
//! ```text
//! t...   title/banner line, ignored
//! x...   start of a data block        -> Data
//! y...   end of a sweep's data block  -> sweep += 1, Else
//! other  decoded as a data row only while in Data
//! ```
//!
//! A data row is `<time> <v1> <v2> ...` in SI-prefixed notation. Rows whose
//! first token is not a number (column headers) are dropped. A row with a
//! valid time but an undecodable value is dropped whole and logged at debug
//! level; it never fails the run.
//!
//! Stdout is decoded lossily, so stray non-UTF-8 bytes in banners cannot end
//! a run.
//!
//! The exit code is not inspected here: end of stdout marks completion. The
//! batch profile in [`crate::batch`] enforces a zero exit code instead.

use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, Stdio};
use std::time::Instant;

use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::error::{Result, SimError};
use crate::exec::{lossy_lines, Invocation};
use crate::progress::ProgressSink;
use crate::record::ResultRecord;
use crate::request::SimulationRequest;
use crate::script::{Profile, ScriptGenerator};
use crate::si::parse_si_decimal;
use crate::stats::RunStats;

/// Classifier state, persisted across lines of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    Data,
    Else,
}

/// What a single output line did to the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    Ignored,
    DataStart,
    SweepEnd,
    /// In `Data` but not decodable.
    Discarded,
    Record(ResultRecord),
}

/// Line-classification state machine over simulator stdout.
#[derive(Debug, Clone)]
pub struct OutputParser<'a> {
    signals: &'a [String],
    seed: u64,
    sweep: u64,
    state: ParseState,
}

impl<'a> OutputParser<'a> {
    pub fn new(request: &'a SimulationRequest) -> Self {
        Self::with_signals(request.signals(), request.seed(), request.sweep_start())
    }

    pub fn with_signals(signals: &'a [String], seed: u64, sweep_start: u64) -> Self {
        Self {
            signals,
            seed,
            sweep: sweep_start,
            state: ParseState::Else,
        }
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Current sweep index.
    pub fn sweep(&self) -> u64 {
        self.sweep
    }

    pub fn feed(&mut self, line: &str) -> LineEvent {
        match line.chars().next() {
            None | Some('t') => LineEvent::Ignored,
            Some('x') => {
                self.state = ParseState::Data;
                LineEvent::DataStart
            }
            Some('y') => {
                self.sweep += 1;
                self.state = ParseState::Else;
                LineEvent::SweepEnd
            }
            Some(_) => match self.state {
                ParseState::Else => LineEvent::Ignored,
                ParseState::Data => match self.decode(line) {
                    Some(record) => LineEvent::Record(record),
                    None => LineEvent::Discarded,
                },
            },
        }
    }

    fn decode(&self, line: &str) -> Option<ResultRecord> {
        let mut tokens = line.split_whitespace();
        let time = parse_si_decimal(tokens.next()?)?;
        let mut values = Vec::with_capacity(self.signals.len());
        for (token, name) in tokens.zip(self.signals) {
            let Some(value) = parse_si_decimal(token) else {
                tracing::debug!(
                    sweep = self.sweep,
                    signal = %name,
                    token,
                    "undecodable value, row dropped"
                );
                return None;
            };
            values.push((name.clone(), value));
        }
        Some(ResultRecord {
            time,
            seed: self.seed,
            sweep: self.sweep,
            values,
        })
    }
}

/// Drive the parser over a line source, checking `cancel` before every read.
pub fn collect_records<I>(
    lines: I,
    request: &SimulationRequest,
    cancel: &CancelToken,
    progress: Option<&dyn ProgressSink>,
    mut stats: Option<&mut RunStats>,
) -> Result<Vec<ResultRecord>>
where
    I: IntoIterator<Item = io::Result<String>>,
{
    let mut parser = OutputParser::new(request);
    let mut records = Vec::new();
    let mut lines = lines.into_iter();

    loop {
        cancel.check()?;
        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;
        if let Some(s) = stats.as_deref_mut() {
            s.lines_read += 1;
        }

        match parser.feed(&line) {
            LineEvent::Record(record) => {
                if let Some(s) = stats.as_deref_mut() {
                    s.records += 1;
                }
                records.push(record);
            }
            LineEvent::SweepEnd => {
                tracing::debug!(sweep = parser.sweep(), records = records.len(), "sweep done");
                if let Some(s) = stats.as_deref_mut() {
                    s.sweeps_completed += 1;
                }
                if let Some(p) = progress {
                    p.tick();
                }
            }
            LineEvent::Discarded => {
                if let Some(s) = stats.as_deref_mut() {
                    s.lines_discarded += 1;
                }
            }
            LineEvent::Ignored | LineEvent::DataStart => {}
        }
    }

    Ok(records)
}

/// Runs the simulator as a child process and parses its stdout.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    work_root: PathBuf,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(std::env::temp_dir().join("mcspice"))
    }
}

impl ProcessRunner {
    /// Each run works in `<work_root>/<group id>/`.
    pub fn new(work_root: impl Into<PathBuf>) -> Self {
        Self {
            work_root: work_root.into(),
        }
    }

    pub fn work_root(&self) -> &Path {
        &self.work_root
    }

    pub fn run(
        &self,
        request: &SimulationRequest,
        cancel: &CancelToken,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<Vec<ResultRecord>> {
        self.run_with_stats(request, cancel, progress, None)
    }

    pub fn run_with_stats(
        &self,
        request: &SimulationRequest,
        cancel: &CancelToken,
        progress: Option<&dyn ProgressSink>,
        stats: Option<&mut RunStats>,
    ) -> Result<Vec<ResultRecord>> {
        let _span = tracing::info_span!(
            "streaming_run",
            group = %request.group_id(),
            seed = request.seed(),
            sweeps = request.sweeps()
        )
        .entered();

        let records = self
            .execute(request, cancel, progress, stats)
            .map_err(SimError::into_run_failure)?;
        tracing::info!(records = records.len(), "streaming run complete");
        Ok(records)
    }

    fn execute(
        &self,
        request: &SimulationRequest,
        cancel: &CancelToken,
        progress: Option<&dyn ProgressSink>,
        mut stats: Option<&mut RunStats>,
    ) -> Result<Vec<ResultRecord>> {
        let dir = self.work_root.join(request.group_id().to_string());
        std::fs::create_dir_all(&dir)?;
        let script = dir.join(format!("{}.spi", Uuid::new_v4()));

        let start = Instant::now();
        ScriptGenerator::new(Profile::Streaming).generate(request, &script)?;
        if let Some(s) = stats.as_deref_mut() {
            s.add_phase("Script generation", start.elapsed());
        }

        let invocation = Invocation::new(request.simulator())
            .args(request.simulator_options().iter().cloned())
            .arg("-i")
            .arg(script.to_string_lossy())
            .current_dir(&dir);
        tracing::info!(command = %invocation, "starting simulator");

        let start = Instant::now();
        let outcome = spawn_and_collect(&invocation, request, cancel, progress, stats.as_deref_mut());
        if let Some(s) = stats.as_deref_mut() {
            s.add_phase("Simulation", start.elapsed());
        }
        remove_script(&script);
        outcome
    }
}

fn spawn_and_collect(
    invocation: &Invocation,
    request: &SimulationRequest,
    cancel: &CancelToken,
    progress: Option<&dyn ProgressSink>,
    stats: Option<&mut RunStats>,
) -> Result<Vec<ResultRecord>> {
    let mut child = invocation
        .to_command()
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()?;

    let Some(stdout) = child.stdout.take() else {
        reap(&mut child);
        return Err(SimError::RunFailed(
            "simulator stdout was not captured".to_string(),
        ));
    };

    match collect_records(lossy_lines(BufReader::new(stdout)), request, cancel, progress, stats) {
        Ok(records) => {
            let status = child.wait()?;
            tracing::debug!(code = ?status.code(), "simulator exited");
            Ok(records)
        }
        Err(e) => {
            reap(&mut child);
            Err(e)
        }
    }
}

/// Kill and wait so no child outlives its run.
fn reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn remove_script(script: &Path) {
    if let Err(e) = std::fs::remove_file(script) {
        tracing::debug!(path = %script.display(), error = %e, "could not remove script");
    }
}

//! Batch simulator runs.
//!
//! A batch run lays out a per-circuit, per-device working tree, links the
//! shared circuit assets into it, renders a script around the circuit's
//! netlist body and lets the simulator write one `*.tr0@*` file per sweep.
//!
//! ```text
//! <base>/<circuit with '/' -> '_'>/Vtn_<vtn>/Vtp_<vtp>/
//!     <run id>/      simulator working directory, sweep outputs
//!     result/
//!     netlist/       cnl -> assets, netlist -> assets, <run id>.spi
//! ```
//!
//! Unlike the streaming runner, a non-zero exit code fails the run and the
//! number of sweep outputs is verified.

use std::path::{Path, PathBuf};
use std::time::Instant;

use serde_derive::Deserialize;
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::error::{Result, SimError};
use crate::exec::{Executor, Invocation};
use crate::progress::ProgressSink;
use crate::request::SimulationRequest;
use crate::script::{BatchTemplate, Profile, ScriptGenerator};
use crate::stats::RunStats;

/// Entries linked from the circuit asset directory into each netlist dir.
pub const LINKED_ASSETS: [&str; 2] = ["cnl", "netlist"];

/// Name of the netlist body file inside the netlist directory.
pub const NETLIST_BODY: &str = "netlist";

/// Marker in the names of per-sweep transient output files.
const SWEEP_OUTPUT_MARKER: &str = ".tr0@";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BatchConfig {
    pub base_dir: PathBuf,
    /// Root of the shared circuit library; `~/` is expanded.
    pub circuit_root: PathBuf,
    /// Circuit identifier, may contain `/`.
    pub target_circuit: String,
    pub model_file: PathBuf,
}

/// Paths of one batch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub sim_dir: PathBuf,
    pub result_dir: PathBuf,
    pub netlist_dir: PathBuf,
    pub asset_dir: PathBuf,
    pub script: PathBuf,
}

impl Workspace {
    pub fn new(config: &BatchConfig, request: &SimulationRequest, run_id: Uuid) -> Self {
        let devices = request.devices();
        let root = config
            .base_dir
            .join(config.target_circuit.replace('/', "_"))
            .join(format!("Vtn_{}", devices.vtn))
            .join(format!("Vtp_{}", devices.vtp));
        let netlist_dir = root.join("netlist");
        Self {
            sim_dir: root.join(run_id.to_string()),
            result_dir: root.join("result"),
            script: netlist_dir.join(format!("{run_id}.spi")),
            netlist_dir,
            asset_dir: expand_home(&config.circuit_root)
                .join(&config.target_circuit)
                .join("HSPICE")
                .join("nominal")
                .join("netlist"),
        }
    }

    /// Create the run, result and netlist directories. Existing ones are kept.
    pub fn create_directories(&self, cancel: &CancelToken) -> Result<()> {
        for dir in [&self.sim_dir, &self.result_dir, &self.netlist_dir] {
            cancel.check()?;
            if dir.is_dir() {
                continue;
            }
            std::fs::create_dir_all(dir).map_err(|e| {
                SimError::EnvironmentSetupFailed(format!(
                    "failed to create directory {}: {e}",
                    dir.display()
                ))
            })?;
        }
        Ok(())
    }

    /// Link the shared circuit assets into the netlist directory.
    ///
    /// An existing entry of any kind at the link path is left untouched.
    pub fn link_assets(&self, cancel: &CancelToken) -> Result<()> {
        for name in LINKED_ASSETS {
            cancel.check()?;
            let from = self.asset_dir.join(name);
            let to = self.netlist_dir.join(name);
            if std::fs::symlink_metadata(&to).is_ok() {
                tracing::debug!(link = %to.display(), "link exists, skipping");
                continue;
            }
            symlink(&from, &to).map_err(|e| {
                SimError::EnvironmentSetupFailed(format!(
                    "failed to create symbolic link {} -> {}: {e}",
                    to.display(),
                    from.display()
                ))
            })?;
        }
        Ok(())
    }

    /// Read the netlist body that gets concatenated into the script.
    pub fn netlist_body(&self) -> Result<String> {
        let path = self.netlist_dir.join(NETLIST_BODY);
        if !path.exists() {
            return Err(SimError::NotFound(path));
        }
        let body = std::fs::read_to_string(&path)?;
        if body.trim().is_empty() {
            return Err(SimError::EmptyContent(path));
        }
        Ok(body)
    }

    /// Count per-sweep output files (`*.tr0@*`) in the run directory.
    pub fn count_sweep_outputs(&self) -> Result<u64> {
        let mut count = 0;
        for entry in std::fs::read_dir(&self.sim_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() && is_sweep_output(&entry.file_name().to_string_lossy())
            {
                count += 1;
            }
        }
        Ok(count)
    }
}

fn is_sweep_output(name: &str) -> bool {
    name.contains(SWEEP_OUTPUT_MARKER)
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}

#[cfg(unix)]
fn symlink(from: &Path, to: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(from, to)
}

#[cfg(not(unix))]
fn symlink(_from: &Path, _to: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "symbolic links require a unix host",
    ))
}

/// Drives one batch run to completion through an [`Executor`].
pub struct BatchOrchestrator<'a> {
    config: &'a BatchConfig,
    request: &'a SimulationRequest,
    executor: &'a dyn Executor,
    run_id: Uuid,
    workspace: Workspace,
}

impl<'a> BatchOrchestrator<'a> {
    pub fn new(
        config: &'a BatchConfig,
        request: &'a SimulationRequest,
        executor: &'a dyn Executor,
    ) -> Self {
        let run_id = Uuid::new_v4();
        Self {
            config,
            request,
            executor,
            run_id,
            workspace: Workspace::new(config, request, run_id),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// The simulator command for this run.
    pub fn invocation(&self) -> Invocation {
        Invocation::new(self.request.simulator())
            .args(self.request.simulator_options().iter().cloned())
            .arg("-i")
            .arg(self.workspace.script.to_string_lossy())
            .arg("-o")
            .arg("./hspice")
            .current_dir(&self.workspace.sim_dir)
    }

    pub fn run(&self, cancel: &CancelToken) -> Result<Uuid> {
        self.run_inner(cancel, None, None)
    }

    /// Same as [`run`](Self::run), reporting phases and simulator output to `progress`.
    pub fn run_with_feedback(
        &self,
        cancel: &CancelToken,
        progress: &dyn ProgressSink,
        stats: Option<&mut RunStats>,
    ) -> Result<Uuid> {
        self.run_inner(cancel, Some(progress), stats)
    }

    fn run_inner(
        &self,
        cancel: &CancelToken,
        progress: Option<&dyn ProgressSink>,
        stats: Option<&mut RunStats>,
    ) -> Result<Uuid> {
        let _span = tracing::info_span!(
            "batch_run",
            group = %self.request.group_id(),
            run = %self.run_id,
            circuit = %self.config.target_circuit
        )
        .entered();

        self.execute(cancel, progress, stats)
            .map_err(SimError::into_run_failure)?;
        tracing::info!(sweeps = self.request.sweeps(), "batch run complete");
        Ok(self.request.group_id())
    }

    fn execute(
        &self,
        cancel: &CancelToken,
        progress: Option<&dyn ProgressSink>,
        mut stats: Option<&mut RunStats>,
    ) -> Result<()> {
        let report = |msg: &str| {
            if let Some(p) = progress {
                p.message(msg);
            }
        };

        let start = Instant::now();
        report("preparing environment");
        self.workspace.create_directories(cancel)?;
        self.workspace.link_assets(cancel)?;
        self.write_script()?;
        if let Some(s) = stats.as_deref_mut() {
            s.add_phase("Environment setup", start.elapsed());
        }

        cancel.check()?;
        let start = Instant::now();
        report("simulating...");
        let invocation = self.invocation();
        tracing::info!(command = %invocation, "starting simulator");
        let code = self.executor.run(&invocation, &mut |line| report(line))?;
        if let Some(s) = stats.as_deref_mut() {
            s.add_phase("Simulation", start.elapsed());
            s.exit_code = Some(code);
        }
        if code != 0 {
            return Err(SimError::NonZeroExit(code));
        }

        report("verifying results");
        let found = self.workspace.count_sweep_outputs()?;
        if let Some(s) = stats.as_deref_mut() {
            s.result_files = found;
        }
        let expected = self.request.sweeps();
        if found != expected {
            return Err(SimError::IncompleteResults { expected, found });
        }
        Ok(())
    }

    fn write_script(&self) -> Result<()> {
        let template = BatchTemplate {
            target: self.config.target_circuit.clone(),
            model_file: self.config.model_file.clone(),
            netlist_body: self.workspace.netlist_body()?,
        };
        ScriptGenerator::new(Profile::Batch(template)).generate(self.request, &self.workspace.script)
    }
}

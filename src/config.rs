//! Request file loading.
//!
//! A request file is TOML (or JSON when the extension is `.json`):
//!
//! ```toml
//! simulator = "/opt/hspice/bin/hspice"
//! simulator_options = ["-mt", "4"]
//! seed = 1
//! sweeps = 500
//! temperature = 25
//! netlist = "inverter.spi"
//! vdd = 0.8
//! gnd = 0
//! signals = ["N1", "N2"]
//!
//! [vtn]
//! threshold = 0.3
//! sigma = 0.03
//! deviation = 1.0
//!
//! [vtp]
//! threshold = -0.3
//! sigma = 0.03
//! deviation = 1.0
//!
//! [time]
//! start = 0
//! step = 0.00000000001
//! stop = 0.00000002
//!
//! [batch]              # only for `mcspice batch`
//! base_dir = "/work"
//! circuit_root = "~/circuits"
//! target_circuit = "lib/inverter"
//! model_file = "/models/ptm.l"
//! ```

use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde_derive::Deserialize;
use uuid::Uuid;

use crate::batch::BatchConfig;
use crate::error::{Result, SimError};
use crate::request::{DeviceDescriptor, SimulationRequest, TimeRange};

/// On-disk shape of a request; every field optional so that validation can
/// report all problems together.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestFile {
    pub group_id: Option<Uuid>,
    pub simulator: Option<PathBuf>,
    #[serde(default)]
    pub simulator_options: Vec<String>,
    pub seed: Option<u64>,
    pub sweeps: Option<u64>,
    pub sweep_start: Option<u64>,
    pub temperature: Option<Decimal>,
    pub vtn: Option<DeviceDescriptor>,
    pub vtp: Option<DeviceDescriptor>,
    pub time: Option<TimeRange>,
    #[serde(default)]
    pub ic_commands: Vec<String>,
    pub netlist: Option<PathBuf>,
    #[serde(default)]
    pub includes: Vec<PathBuf>,
    pub vdd: Option<Decimal>,
    pub gnd: Option<Decimal>,
    #[serde(default)]
    pub signals: Vec<String>,
    pub result_file: Option<PathBuf>,
    #[serde(default)]
    pub plot_times: Vec<Decimal>,
    pub work_root: Option<PathBuf>,
    pub batch: Option<BatchConfig>,
}

/// A validated request plus run-environment settings.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub request: SimulationRequest,
    pub work_root: PathBuf,
    pub batch: Option<BatchConfig>,
}

impl RunConfig {
    pub fn batch(&self) -> Result<&BatchConfig> {
        self.batch
            .as_ref()
            .ok_or_else(|| SimError::Config("request has no [batch] section".to_string()))
    }
}

impl RequestFile {
    pub fn into_run_config(self) -> Result<RunConfig> {
        let mut builder = SimulationRequest::builder()
            .simulator_options(self.simulator_options)
            .ic_commands(self.ic_commands)
            .includes(self.includes)
            .signals(self.signals)
            .plot_times(self.plot_times);

        if let Some(id) = self.group_id {
            builder = builder.group_id(id);
        }
        if let Some(path) = self.simulator {
            builder = builder.simulator(path);
        }
        if let Some(seed) = self.seed {
            builder = builder.seed(seed);
        }
        if let Some(sweeps) = self.sweeps {
            builder = builder.sweeps(sweeps);
        }
        if let Some(start) = self.sweep_start {
            builder = builder.sweep_start(start);
        }
        if let Some(t) = self.temperature {
            builder = builder.temperature(t);
        }
        if let (Some(vtn), Some(vtp)) = (self.vtn, self.vtp) {
            builder = builder.devices(vtn, vtp);
        }
        if let Some(t) = self.time {
            builder = builder.time(t.start, t.step, t.stop);
        }
        if let Some(path) = self.netlist {
            builder = builder.netlist(path);
        }
        if let Some(v) = self.vdd {
            builder = builder.vdd(v);
        }
        if let Some(v) = self.gnd {
            builder = builder.gnd(v);
        }
        if let Some(path) = self.result_file {
            builder = builder.result_file(path);
        }

        Ok(RunConfig {
            request: builder.build()?,
            work_root: self
                .work_root
                .unwrap_or_else(|| std::env::temp_dir().join("mcspice")),
            batch: self.batch,
        })
    }
}

pub fn from_toml_str(content: &str) -> Result<RunConfig> {
    let file: RequestFile =
        toml::from_str(content).map_err(|e| SimError::Config(e.to_string()))?;
    file.into_run_config()
}

pub fn from_json_str(content: &str) -> Result<RunConfig> {
    let file: RequestFile =
        serde_json::from_str(content).map_err(|e| SimError::Config(e.to_string()))?;
    file.into_run_config()
}

/// Load a request file, choosing the format by extension.
pub fn load(path: &Path) -> Result<RunConfig> {
    if !path.exists() {
        return Err(SimError::NotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    let config = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => from_json_str(&content),
        _ => from_toml_str(&content),
    }?;
    tracing::debug!(
        path = %path.display(),
        group = %config.request.group_id(),
        "loaded request"
    );
    Ok(config)
}

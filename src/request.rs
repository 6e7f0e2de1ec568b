//! Simulation request model and fingerprinting.
//!
//! A [`SimulationRequest`] is an immutable description of one Monte Carlo
//! run: the simulator to invoke, the statistical device parameters, the
//! transient window, the circuit files and the signals to probe. It is only
//! constructed through [`SimulationRequestBuilder`], which reports every
//! missing or invalid field in a single error.

use std::fmt;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde_derive::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{Result, SimError};

/// Statistical model of a transistor threshold voltage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub threshold: Decimal,
    pub sigma: Decimal,
    pub deviation: Decimal,
}

impl DeviceDescriptor {
    pub fn new(threshold: Decimal, sigma: Decimal, deviation: Decimal) -> Self {
        Self {
            threshold,
            sigma,
            deviation,
        }
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.threshold, self.sigma, self.deviation)
    }
}

/// The N-type / P-type device pair varied by the Monte Carlo run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevicePair {
    pub vtn: DeviceDescriptor,
    pub vtp: DeviceDescriptor,
}

impl fmt::Display for DevicePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vtn:{},Vtp:{}", self.vtn, self.vtp)
    }
}

/// Transient analysis window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Decimal,
    pub step: Decimal,
    pub stop: Decimal,
}

/// Content hash identifying a logically distinct simulation definition.
///
/// 64 uppercase hex characters. Used as a dedup/cache key only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationRequest {
    group_id: Uuid,
    simulator: PathBuf,
    simulator_options: Vec<String>,
    seed: u64,
    sweeps: u64,
    sweep_start: u64,
    temperature: Decimal,
    devices: DevicePair,
    time: TimeRange,
    ic_commands: Vec<String>,
    netlist: PathBuf,
    includes: Vec<PathBuf>,
    vdd: Decimal,
    gnd: Decimal,
    signals: Vec<String>,
    result_file: Option<PathBuf>,
    plot_times: Vec<Decimal>,
}

impl SimulationRequest {
    pub fn builder() -> SimulationRequestBuilder {
        SimulationRequestBuilder::default()
    }

    pub fn group_id(&self) -> Uuid {
        self.group_id
    }

    pub fn simulator(&self) -> &Path {
        &self.simulator
    }

    pub fn simulator_options(&self) -> &[String] {
        &self.simulator_options
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn sweeps(&self) -> u64 {
        self.sweeps
    }

    pub fn sweep_start(&self) -> u64 {
        self.sweep_start
    }

    pub fn temperature(&self) -> Decimal {
        self.temperature
    }

    pub fn devices(&self) -> &DevicePair {
        &self.devices
    }

    pub fn time(&self) -> &TimeRange {
        &self.time
    }

    pub fn ic_commands(&self) -> &[String] {
        &self.ic_commands
    }

    /// Main circuit-definition file.
    pub fn netlist(&self) -> &Path {
        &self.netlist
    }

    pub fn includes(&self) -> &[PathBuf] {
        &self.includes
    }

    pub fn vdd(&self) -> Decimal {
        self.vdd
    }

    pub fn gnd(&self) -> Decimal {
        self.gnd
    }

    pub fn signals(&self) -> &[String] {
        &self.signals
    }

    pub fn result_file(&self) -> Option<&Path> {
        self.result_file.as_deref()
    }

    pub fn plot_times(&self) -> &[Decimal] {
        &self.plot_times
    }

    /// Hash of the fields that define the simulated circuit.
    ///
    /// Concatenates device pair, gnd, vdd, temperature and netlist path, then
    /// every IC command and every include path, and hashes the UTF-8 bytes
    /// with SHA-256. Simulator, seed, sweeps and signals are not hashed.
    pub fn fingerprint(&self) -> Fingerprint {
        let mut text = String::new();
        text.push_str(&self.devices.to_string());
        text.push_str(&self.gnd.to_string());
        text.push_str(&self.vdd.to_string());
        text.push_str(&self.temperature.to_string());
        text.push_str(&self.netlist.to_string_lossy());
        for ic in &self.ic_commands {
            text.push_str(ic);
        }
        for include in &self.includes {
            text.push_str(&include.to_string_lossy());
        }

        let digest = Sha256::digest(text.as_bytes());
        Fingerprint(digest.iter().map(|b| format!("{:02X}", b)).collect())
    }

    /// Serialize the full run definition, e.g. to archive it next to results.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| SimError::Config(e.to_string()))
    }
}

/// Collects request fields and validates them all at once.
#[derive(Debug, Default, Clone)]
pub struct SimulationRequestBuilder {
    group_id: Option<Uuid>,
    simulator: Option<PathBuf>,
    simulator_options: Vec<String>,
    seed: Option<u64>,
    sweeps: Option<u64>,
    sweep_start: Option<u64>,
    temperature: Option<Decimal>,
    devices: Option<DevicePair>,
    time: Option<TimeRange>,
    ic_commands: Vec<String>,
    netlist: Option<PathBuf>,
    includes: Vec<PathBuf>,
    vdd: Option<Decimal>,
    gnd: Option<Decimal>,
    signals: Vec<String>,
    result_file: Option<PathBuf>,
    plot_times: Vec<Decimal>,
}

impl SimulationRequestBuilder {
    /// Defaults to a fresh random id when not set.
    pub fn group_id(mut self, id: Uuid) -> Self {
        self.group_id = Some(id);
        self
    }

    pub fn simulator(mut self, path: impl Into<PathBuf>) -> Self {
        self.simulator = Some(path.into());
        self
    }

    pub fn simulator_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.simulator_options = options.into_iter().map(Into::into).collect();
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn sweeps(mut self, sweeps: u64) -> Self {
        self.sweeps = Some(sweeps);
        self
    }

    /// Defaults to 1.
    pub fn sweep_start(mut self, start: u64) -> Self {
        self.sweep_start = Some(start);
        self
    }

    pub fn temperature(mut self, temperature: Decimal) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn devices(mut self, vtn: DeviceDescriptor, vtp: DeviceDescriptor) -> Self {
        self.devices = Some(DevicePair { vtn, vtp });
        self
    }

    pub fn time(mut self, start: Decimal, step: Decimal, stop: Decimal) -> Self {
        self.time = Some(TimeRange { start, step, stop });
        self
    }

    pub fn ic_commands<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ic_commands = commands.into_iter().map(Into::into).collect();
        self
    }

    pub fn netlist(mut self, path: impl Into<PathBuf>) -> Self {
        self.netlist = Some(path.into());
        self
    }

    pub fn includes<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.includes = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn vdd(mut self, vdd: Decimal) -> Self {
        self.vdd = Some(vdd);
        self
    }

    pub fn gnd(mut self, gnd: Decimal) -> Self {
        self.gnd = Some(gnd);
        self
    }

    pub fn signals<I, S>(mut self, signals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.signals = signals.into_iter().map(Into::into).collect();
        self
    }

    pub fn result_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.result_file = Some(path.into());
        self
    }

    pub fn plot_times(mut self, times: impl IntoIterator<Item = Decimal>) -> Self {
        self.plot_times = times.into_iter().collect();
        self
    }

    pub fn build(self) -> Result<SimulationRequest> {
        let mut problems = Vec::new();

        fn required<T>(value: Option<T>, name: &str, problems: &mut Vec<String>) -> Option<T> {
            if value.is_none() {
                problems.push(format!("missing field `{name}`"));
            }
            value
        }

        let simulator = required(self.simulator, "simulator", &mut problems);
        let seed = required(self.seed, "seed", &mut problems);
        let sweeps = required(self.sweeps, "sweeps", &mut problems);
        let temperature = required(self.temperature, "temperature", &mut problems);
        let devices = required(self.devices, "devices", &mut problems);
        let time = required(self.time, "time", &mut problems);
        let netlist = required(self.netlist, "netlist", &mut problems);
        let vdd = required(self.vdd, "vdd", &mut problems);
        let gnd = required(self.gnd, "gnd", &mut problems);
        let sweep_start = self.sweep_start.unwrap_or(1);

        if seed == Some(0) {
            problems.push("`seed` must be at least 1".to_string());
        }
        if sweeps == Some(0) {
            problems.push("`sweeps` must be at least 1".to_string());
        }
        if sweep_start == 0 {
            problems.push("`sweep_start` must be at least 1".to_string());
        }
        if self.signals.is_empty() {
            problems.push("`signals` must name at least one signal".to_string());
        }
        if let Some(t) = &time {
            if t.step <= Decimal::ZERO {
                problems.push("`time.step` must be positive".to_string());
            }
            if t.stop < t.start {
                problems.push("`time.stop` must not precede `time.start`".to_string());
            }
        }

        match (
            simulator,
            seed,
            sweeps,
            temperature,
            devices,
            time,
            netlist,
            vdd,
            gnd,
        ) {
            (
                Some(simulator),
                Some(seed),
                Some(sweeps),
                Some(temperature),
                Some(devices),
                Some(time),
                Some(netlist),
                Some(vdd),
                Some(gnd),
            ) if problems.is_empty() => Ok(SimulationRequest {
                group_id: self.group_id.unwrap_or_else(Uuid::new_v4),
                simulator,
                simulator_options: self.simulator_options,
                seed,
                sweeps,
                sweep_start,
                temperature,
                devices,
                time,
                ic_commands: self.ic_commands,
                netlist,
                includes: self.includes,
                vdd,
                gnd,
                signals: self.signals,
                result_file: self.result_file,
                plot_times: self.plot_times,
            }),
            _ => Err(SimError::InvalidRequest(problems)),
        }
    }
}

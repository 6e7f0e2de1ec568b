//! Simulator input script generation.
//!
//! One generator renders both script flavours. [`Profile::Streaming`] produces
//! a self-contained script whose `.print` listing is parsed from stdout;
//! [`Profile::Batch`] inlines a netlist body, pulls in a model file and leaves
//! results in per-sweep `*.tr0@*` files.
//!
//! Section order is the same for both profiles:
//!
//! ```text
//! * header comments
//! .param vtn=AGAUSS(..) vtp=AGAUSS(..)
//! .option PARHIER=LOCAL / .option SEED=n
//! .temp T
//! .IC ...
//! VDD / VGND sources
//! .include lines (+ model file and netlist body for batch)
//! .tran ...
//! output options
//! .print V(..) ...          (streaming only)
//! .end
//! ```

use std::path::{Path, PathBuf};

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::error::{Result, SimError};
use crate::request::SimulationRequest;

const TOOL_NAME: &str = "mcspice";

/// Inputs only the batch profile needs.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchTemplate {
    /// Circuit identifier written in the header.
    pub target: String,
    pub model_file: PathBuf,
    /// Netlist text concatenated into the script in place of the circuit include.
    pub netlist_body: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Profile {
    Streaming,
    Batch(BatchTemplate),
}

#[derive(Debug, Clone)]
pub struct ScriptGenerator {
    profile: Profile,
}

impl ScriptGenerator {
    pub fn new(profile: Profile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Render the script and write it to `target`, replacing any existing file.
    pub fn generate(&self, request: &SimulationRequest, target: &Path) -> Result<()> {
        let generated_at = chrono::Local::now()
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();
        let script = self.render(request, &generated_at)?;
        std::fs::write(target, script)?;
        tracing::debug!(path = %target.display(), "wrote simulator script");
        Ok(())
    }

    /// Render the script text. Output depends only on the request, the
    /// profile and `generated_at`.
    pub fn render(&self, request: &SimulationRequest, generated_at: &str) -> Result<String> {
        if let Profile::Streaming = self.profile {
            if !request.netlist().exists() {
                return Err(SimError::NotFound(request.netlist().to_path_buf()));
            }
        }

        let mut lines: Vec<String> = Vec::new();

        // Header
        let target = match &self.profile {
            Profile::Streaming => request.netlist().display().to_string(),
            Profile::Batch(t) => t.target.clone(),
        };
        lines.push("* Generated for: HSPICE".to_string());
        lines.push(format!("* Generated by: {TOOL_NAME}"));
        lines.push(format!("* Target: {target}"));
        lines.push(format!("* Generated at: {generated_at}"));

        if let Profile::Batch(_) = self.profile {
            lines.push(".option MCBRIEF=2".to_string());
        }

        // Statistical parameters
        let devices = request.devices();
        lines.push(format!(
            ".param vtn=AGAUSS({},{},{}) vtp=AGAUSS({},{},{})",
            devices.vtn.threshold,
            devices.vtn.sigma,
            devices.vtn.deviation,
            devices.vtp.threshold,
            devices.vtp.sigma,
            devices.vtp.deviation,
        ));

        lines.push(".option PARHIER=LOCAL".to_string());
        lines.push(format!(".option SEED={}", request.seed()));
        lines.push(format!(".temp {}", request.temperature()));
        if !request.ic_commands().is_empty() {
            lines.push(format!(".IC {}", request.ic_commands().join(" ")));
        }

        // Supply rails
        lines.push(format!("VDD VDD! 0 {}V", request.vdd()));
        lines.push(format!("VGND GND! 0 {}V", request.gnd()));

        for include in request.includes() {
            lines.push(format!(".include '{}'", include.display()));
        }

        match &self.profile {
            Profile::Streaming => {
                lines.push(format!(".include '{}'", request.netlist().display()));
            }
            Profile::Batch(t) => {
                lines.push(format!(".include '{}'", t.model_file.display()));
                lines.push(t.netlist_body.trim_end().to_string());
            }
        }

        // Transient analysis
        let time = request.time();
        match self.profile {
            Profile::Streaming => lines.push(format!(
                ".tran {} {} start={} uic sweep monte={} firstrun={}",
                time.step,
                time.stop,
                time.start,
                request.sweeps(),
                request.sweep_start(),
            )),
            Profile::Batch(_) => lines.push(format!(
                ".tran {} {} start={} sweep monte={} firstrun={}",
                exponential(time.step),
                exponential(time.stop),
                exponential(time.start),
                exponential(Decimal::from(request.sweeps())),
                exponential(Decimal::from(request.sweep_start())),
            )),
        }

        match self.profile {
            Profile::Streaming => {
                lines.push(".option opfile=0".to_string());
                let probes: Vec<String> = request
                    .signals()
                    .iter()
                    .map(|s| format!("V({s})"))
                    .collect();
                lines.push(format!(".print {}", probes.join(" ")));
            }
            Profile::Batch(_) => {
                lines.push(".option ARTIST=2 PSF=2".to_string());
                lines.push(".option opfile=1 split_dp=2".to_string());
            }
        }

        lines.push(".end".to_string());
        Ok(lines.join("\n") + "\n")
    }
}

/// Format as `d.ddddddE+ddd`, the fixed exponential form HSPICE reads
/// without ambiguity.
pub fn exponential(value: Decimal) -> String {
    let s = format!("{:.6E}", value.to_f64().unwrap_or(0.0));
    let Some((mantissa, exp)) = s.split_once('E') else {
        return s;
    };
    let Ok(exp) = exp.parse::<i32>() else {
        return s;
    };
    let sign = if exp < 0 { '-' } else { '+' };
    format!("{mantissa}E{sign}{:03}", exp.abs())
}

//! Batch orchestration tests against a recorded executor.
#![cfg(unix)]

use std::cell::RefCell;
use std::path::PathBuf;

use mcspice::batch::{BatchConfig, BatchOrchestrator, Workspace};
use mcspice::cancel::CancelToken;
use mcspice::error::{Result, SimError};
use mcspice::exec::{Executor, Invocation, SystemExecutor};
use mcspice::progress::ProgressSink;
use mcspice::request::{DeviceDescriptor, SimulationRequest};
use mcspice::stats::RunStats;
use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

/// Stands in for the simulator: records invocations, writes `outputs`
/// sweep files into the working directory and returns `exit_code`.
struct RecordedExecutor {
    outputs: u64,
    exit_code: i32,
    stdout: Vec<&'static str>,
    calls: RefCell<Vec<Invocation>>,
}

impl RecordedExecutor {
    fn new(outputs: u64, exit_code: i32) -> Self {
        Self {
            outputs,
            exit_code,
            stdout: vec!["Opening plot unit", "job concluded"],
            calls: RefCell::new(Vec::new()),
        }
    }
}

impl Executor for RecordedExecutor {
    fn run(&self, invocation: &Invocation, on_line: &mut dyn FnMut(&str)) -> Result<i32> {
        self.calls.borrow_mut().push(invocation.clone());
        let dir = invocation.working_dir.clone().unwrap_or_default();
        for sweep in 1..=self.outputs {
            std::fs::write(dir.join(format!("hspice.tr0@{sweep}")), "")?;
        }
        // Files that must not be counted.
        std::fs::write(dir.join("hspice.st0"), "")?;
        std::fs::write(dir.join("hspice.mt0@1"), "")?;
        for line in &self.stdout {
            on_line(line);
        }
        Ok(self.exit_code)
    }
}

struct FailingExecutor;

impl Executor for FailingExecutor {
    fn run(&self, _invocation: &Invocation, _on_line: &mut dyn FnMut(&str)) -> Result<i32> {
        Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "hspice: permission denied").into())
    }
}

#[derive(Default)]
struct Collect {
    messages: RefCell<Vec<String>>,
}

impl ProgressSink for Collect {
    fn message(&self, msg: &str) {
        self.messages.borrow_mut().push(msg.to_string());
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    config: BatchConfig,
    root: PathBuf,
}

/// Circuit library with `cnl/` and a `netlist` body for `lib/inverter`.
fn fixture(body: &str) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();
    let assets = root.join("circuits/lib/inverter/HSPICE/nominal/netlist");
    std::fs::create_dir_all(assets.join("cnl")).unwrap();
    std::fs::write(assets.join("netlist"), body).unwrap();
    Fixture {
        config: BatchConfig {
            base_dir: root.join("work"),
            circuit_root: root.join("circuits"),
            target_circuit: "lib/inverter".to_string(),
            model_file: root.join("models/ptm.l"),
        },
        root,
        _dir: dir,
    }
}

fn request(sweeps: u64) -> SimulationRequest {
    SimulationRequest::builder()
        .simulator("/opt/hspice/bin/hspice")
        .simulator_options(["-mt", "2"])
        .seed(5)
        .sweeps(sweeps)
        .temperature(dec("25"))
        .devices(
            DeviceDescriptor::new(dec("0.3"), dec("0.03"), dec("1")),
            DeviceDescriptor::new(dec("-0.3"), dec("0.03"), dec("1")),
        )
        .time(dec("0"), dec("0.00000000001"), dec("0.00000002"))
        .netlist("unused.spi")
        .vdd(dec("0.8"))
        .gnd(dec("0"))
        .signals(["N1"])
        .build()
        .unwrap()
}

const BODY: &str = "M1 out in VDD! VDD! pch\nM2 out in GND! GND! nch\n";

#[test]
fn test_batch_run_succeeds() {
    let fx = fixture(BODY);
    let request = request(3);
    let executor = RecordedExecutor::new(3, 0);
    let orchestrator = BatchOrchestrator::new(&fx.config, &request, &executor);

    let group = orchestrator.run(&CancelToken::new()).unwrap();
    assert_eq!(group, request.group_id());

    let ws = orchestrator.workspace();
    let root = fx
        .root
        .join("work/lib_inverter/Vtn_0.3_0.03_1/Vtp_-0.3_0.03_1");
    assert_eq!(ws.sim_dir, root.join(orchestrator.run_id().to_string()));
    assert!(ws.sim_dir.is_dir());
    assert!(ws.result_dir.is_dir());
    assert!(ws.netlist_dir.join("cnl").is_dir());

    let script = std::fs::read_to_string(&ws.script).unwrap();
    assert!(script.contains(BODY.trim_end()));
    assert!(script.contains(&format!(".include '{}'", fx.config.model_file.display())));
    assert!(script.contains("sweep monte=3.000000E+000 firstrun=1.000000E+000"));

    let calls = executor.calls.borrow();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].working_dir.as_deref(), Some(ws.sim_dir.as_path()));
    assert!(calls[0].args.ends_with(&["-o".to_string(), "./hspice".to_string()]));
}

#[test]
fn test_incomplete_results_iff_count_differs() {
    for sweeps in 1..=4u64 {
        for outputs in 0..=5u64 {
            let fx = fixture(BODY);
            let request = request(sweeps);
            let executor = RecordedExecutor::new(outputs, 0);
            let result = BatchOrchestrator::new(&fx.config, &request, &executor)
                .run(&CancelToken::new());
            if outputs == sweeps {
                assert!(result.is_ok(), "sweeps={sweeps} outputs={outputs}");
            } else {
                match result {
                    Err(SimError::IncompleteResults { expected, found }) => {
                        assert_eq!(expected, sweeps);
                        assert_eq!(found, outputs);
                    }
                    other => panic!("sweeps={sweeps} outputs={outputs}: {other:?}"),
                }
            }
        }
    }
}

#[test]
fn test_non_zero_exit_skips_verification() {
    let fx = fixture(BODY);
    let request = request(2);
    let executor = RecordedExecutor::new(0, 137);
    let err = BatchOrchestrator::new(&fx.config, &request, &executor)
        .run(&CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, SimError::NonZeroExit(137)));
}

#[test]
fn test_missing_netlist_body() {
    let fx = fixture(BODY);
    std::fs::remove_file(
        fx.root
            .join("circuits/lib/inverter/HSPICE/nominal/netlist/netlist"),
    )
    .unwrap();
    let request = request(1);
    let executor = RecordedExecutor::new(1, 0);
    let err = BatchOrchestrator::new(&fx.config, &request, &executor)
        .run(&CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, SimError::NotFound(_)));
    assert!(executor.calls.borrow().is_empty());
}

#[test]
fn test_blank_netlist_body() {
    let fx = fixture("  \n\n");
    let request = request(1);
    let executor = RecordedExecutor::new(1, 0);
    let err = BatchOrchestrator::new(&fx.config, &request, &executor)
        .run(&CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, SimError::EmptyContent(_)));
}

#[test]
fn test_symlinks_are_idempotent() {
    let fx = fixture(BODY);
    let request = request(1);
    let ws = Workspace::new(&fx.config, &request, Uuid::new_v4());
    let cancel = CancelToken::new();
    ws.create_directories(&cancel).unwrap();
    ws.link_assets(&cancel).unwrap();
    ws.create_directories(&cancel).unwrap();
    ws.link_assets(&cancel).unwrap();

    let mut entries: Vec<String> = std::fs::read_dir(&ws.netlist_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    entries.sort();
    assert_eq!(entries, vec!["cnl", "netlist"]);
    let target = std::fs::read_link(ws.netlist_dir.join("netlist")).unwrap();
    assert_eq!(target, ws.asset_dir.join("netlist"));
}

#[test]
fn test_existing_entry_is_not_overwritten() {
    let fx = fixture(BODY);
    let request = request(1);
    let ws = Workspace::new(&fx.config, &request, Uuid::new_v4());
    let cancel = CancelToken::new();
    ws.create_directories(&cancel).unwrap();
    std::fs::write(ws.netlist_dir.join("netlist"), "local body\n").unwrap();
    ws.link_assets(&cancel).unwrap();

    assert!(std::fs::read_link(ws.netlist_dir.join("netlist")).is_err());
    assert_eq!(ws.netlist_body().unwrap(), "local body\n");
}

#[test]
fn test_cancelled_before_any_step() {
    let fx = fixture(BODY);
    let request = request(1);
    let executor = RecordedExecutor::new(1, 0);
    let cancel = CancelToken::new();
    cancel.cancel();
    let orchestrator = BatchOrchestrator::new(&fx.config, &request, &executor);
    let err = orchestrator.run(&cancel).unwrap_err();
    assert!(matches!(err, SimError::Cancelled));
    assert!(!orchestrator.workspace().sim_dir.exists());
    assert!(executor.calls.borrow().is_empty());
}

#[test]
fn test_executor_failure_is_wrapped_once() {
    let fx = fixture(BODY);
    let request = request(1);
    let err = BatchOrchestrator::new(&fx.config, &request, &FailingExecutor)
        .run(&CancelToken::new())
        .unwrap_err();
    match err {
        SimError::RunFailed(msg) => {
            assert!(msg.contains("permission denied"));
            assert!(!msg.contains("Run failed"));
        }
        other => panic!("expected RunFailed, got {other:?}"),
    }
}

#[test]
fn test_feedback_reports_phases_and_output() {
    let fx = fixture(BODY);
    let request = request(2);
    let executor = RecordedExecutor::new(2, 0);
    let progress = Collect::default();
    let mut stats = RunStats::new();
    BatchOrchestrator::new(&fx.config, &request, &executor)
        .run_with_feedback(&CancelToken::new(), &progress, Some(&mut stats))
        .unwrap();

    let messages = progress.messages.borrow();
    assert_eq!(messages.first().map(String::as_str), Some("preparing environment"));
    assert!(messages.iter().any(|m| m == "job concluded"));
    assert_eq!(messages.last().map(String::as_str), Some("verifying results"));
    assert_eq!(stats.result_files, 2);
    assert_eq!(stats.exit_code, Some(0));
}

#[test]
fn test_setup_failure_is_environment_error() {
    let fx = fixture(BODY);
    // A file where the base directory should be.
    std::fs::write(fx.root.join("work"), "").unwrap();
    let request = request(1);
    let executor = RecordedExecutor::new(1, 0);
    let err = BatchOrchestrator::new(&fx.config, &request, &executor)
        .run(&CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, SimError::EnvironmentSetupFailed(_)));
}

#[test]
fn test_non_utf8_simulator_output_does_not_fail_run() {
    let fx = fixture(BODY);
    let sim = fx.root.join("fake_hspice.sh");
    std::fs::write(
        &sim,
        "printf 'Copyright \\251 Synopsys\\n'\n: > hspice.tr0@1\n: > hspice.tr0@2\n",
    )
    .unwrap();
    let request = SimulationRequest::builder()
        .simulator("/bin/sh")
        .simulator_options([sim.to_string_lossy().into_owned()])
        .seed(5)
        .sweeps(2)
        .temperature(dec("25"))
        .devices(
            DeviceDescriptor::new(dec("0.3"), dec("0.03"), dec("1")),
            DeviceDescriptor::new(dec("-0.3"), dec("0.03"), dec("1")),
        )
        .time(dec("0"), dec("0.00000000001"), dec("0.00000002"))
        .netlist("unused.spi")
        .vdd(dec("0.8"))
        .gnd(dec("0"))
        .signals(["N1"])
        .build()
        .unwrap();
    let progress = Collect::default();

    let group = BatchOrchestrator::new(&fx.config, &request, &SystemExecutor)
        .run_with_feedback(&CancelToken::new(), &progress, None)
        .unwrap();
    assert_eq!(group, request.group_id());
    assert!(progress
        .messages
        .borrow()
        .iter()
        .any(|m| m == "Copyright \u{FFFD} Synopsys"));
}

use clap::{Parser, Subcommand};
use mcspice::batch::BatchOrchestrator;
use mcspice::cancel::CancelToken;
use mcspice::config::{self, RunConfig};
use mcspice::exec::SystemExecutor;
use mcspice::output;
use mcspice::progress::{LogProgress, ProgressSink};
use mcspice::runner::ProcessRunner;
use mcspice::script::{Profile, ScriptGenerator};
use mcspice::stats::RunStats;
use std::io;
use std::path::{Path, PathBuf};

/// Monte Carlo SPICE runner
#[derive(Parser)]
#[command(name = "mcspice", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Print run statistics to stderr
    #[arg(long, global = true)]
    stats: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run the simulator and parse its printed output
    Run {
        /// Request file (TOML, or JSON with a .json extension)
        request: PathBuf,
    },
    /// Run in batch mode, leaving per-sweep result files on disk
    Batch {
        request: PathBuf,

        /// Log progress and simulator output
        #[arg(long)]
        feedback: bool,
    },
    /// Print the request fingerprint
    Fingerprint { request: PathBuf },
    /// Write the streaming script for a request without running it
    Script { request: PathBuf, output: PathBuf },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut stats = if cli.stats { Some(RunStats::new()) } else { None };
    let cancel = CancelToken::new();

    match cli.command {
        Command::Run { request } => {
            let config = load_or_exit(&request);
            let request = &config.request;
            let progress = LogProgress::new(request.group_id().to_string());
            let records = ProcessRunner::new(&config.work_root)
                .run_with_stats(
                    request,
                    &cancel,
                    Some(&progress as &dyn ProgressSink),
                    stats.as_mut(),
                )
                .unwrap_or_else(|e| {
                    eprintln!("Run error: {}", e);
                    std::process::exit(1);
                });

            let written = match request.result_file() {
                Some(path) => std::fs::File::create(path)
                    .map_err(mcspice::error::SimError::from)
                    .and_then(|mut f| {
                        output::write_records_csv(&records, request.signals(), &mut f)
                    }),
                None => output::write_records_csv(&records, request.signals(), &mut io::stdout()),
            };
            written.unwrap_or_else(|e| {
                eprintln!("Output error: {}", e);
                std::process::exit(1);
            });
        }
        Command::Batch { request, feedback } => {
            let config = load_or_exit(&request);
            let batch = config.batch().unwrap_or_else(|e| {
                eprintln!("Config error: {}", e);
                std::process::exit(1);
            });
            let executor = SystemExecutor;
            let orchestrator = BatchOrchestrator::new(batch, &config.request, &executor);
            let result = if feedback {
                let progress = LogProgress::new(orchestrator.run_id().to_string());
                orchestrator.run_with_feedback(&cancel, &progress, stats.as_mut())
            } else {
                orchestrator.run(&cancel)
            };
            let group = result.unwrap_or_else(|e| {
                eprintln!("Batch error: {}", e);
                std::process::exit(1);
            });
            println!("{}", group);
        }
        Command::Fingerprint { request } => {
            let config = load_or_exit(&request);
            println!("{}", config.request.fingerprint());
        }
        Command::Script { request, output } => {
            let config = load_or_exit(&request);
            ScriptGenerator::new(Profile::Streaming)
                .generate(&config.request, &output)
                .unwrap_or_else(|e| {
                    eprintln!("Script error: {}", e);
                    std::process::exit(1);
                });
        }
    }

    if let Some(ref stats) = stats {
        stats.display();
    }
}

fn load_or_exit(path: &Path) -> RunConfig {
    config::load(path).unwrap_or_else(|e| {
        eprintln!("Error reading {}: {}", path.display(), e);
        std::process::exit(1);
    })
}

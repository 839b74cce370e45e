//! testrun - run a YAML test plan and report pass/fail.

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

mod render;

use clap::{Parser, Subcommand};
use eyre::WrapErr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use testrun::logsink::RunLogSink;
use testrun::Orchestrator;
use testrun_core::report::{write_tsv, REPORT_TSV, RESULTS_JSON};
use testrun_core::{Config, Directives, OutcomeCode, PlanFile, RunReport};
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Sequential test plan runner.
#[derive(Parser)]
#[command(name = "testrun", about = "Run a test plan and report pass/fail", version)]
struct Cli {
    /// Config file path (overrides .testrun/config)
    #[arg(long, global = true, env = "TESTRUN_CONFIG")]
    config: Option<PathBuf>,

    /// Host identifier used in log file names
    #[arg(long, global = true, env = "TESTRUN_HOST")]
    host: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a test plan
    Run {
        /// Path to the YAML plan
        plan: PathBuf,

        /// Base log directory
        #[arg(long, env = "TESTRUN_LOG_DIR")]
        log_dir: Option<PathBuf>,

        /// Skip writing results.json and report.tsv
        #[arg(long)]
        no_report: bool,
    },

    /// Validate a plan and show what would run
    Check {
        /// Path to the YAML plan
        plan: PathBuf,
    },
}

fn main() -> eyre::Result<ExitCode> {
    let cli = Cli::parse();
    let sink = RunLogSink::new();

    tracing_subscriber::registry()
        .with(
            fmt::layer().with_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            ),
        )
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(sink.clone())
                .with_filter(LevelFilter::DEBUG),
        )
        .init();

    let config = Config::load(cli.config.as_deref()).wrap_err("failed to load config")?;
    let host = cli.host.or_else(|| config.host.clone());

    match cli.command {
        Command::Check { plan } => {
            let plan = load_plan(&plan, host)?;
            let directives = Directives::resolve(&plan).wrap_err("invalid directives")?;
            render::print_plan(&plan, &directives);
            Ok(ExitCode::SUCCESS)
        }
        Command::Run {
            plan,
            log_dir,
            no_report,
        } => {
            let plan = load_plan(&plan, host)?;
            let log_dir = log_dir.unwrap_or_else(|| config.log_dir.clone());

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .wrap_err("failed to create tokio runtime")?;

            let report = runtime.block_on(async {
                let mut orchestrator = Orchestrator::new(&plan, &log_dir)?;
                if config.run_log {
                    orchestrator = orchestrator.with_log_sink(sink);
                }
                Ok::<_, testrun::OrchestratorError>(orchestrator.run().await)
            })?;

            render::print_report(&report);
            if !no_report {
                write_reports(&config, &log_dir, &report)?;
            }
            Ok(exit_code(report.return_code))
        }
    }
}

fn load_plan(path: &Path, host: Option<String>) -> eyre::Result<PlanFile> {
    let plan = PlanFile::from_file(path)
        .wrap_err_with(|| format!("failed to load plan {}", path.display()))?;
    Ok(match host {
        Some(host) => plan.with_host(host),
        None => plan,
    })
}

fn write_reports(config: &Config, log_dir: &Path, report: &RunReport) -> eyre::Result<()> {
    if config.results_json {
        let path = log_dir.join(RESULTS_JSON);
        report
            .write_json(&path)
            .wrap_err_with(|| format!("failed to write {}", path.display()))?;
        info!(path = %path.display(), "wrote results");
    }
    if config.report_tsv {
        let path = log_dir.join(REPORT_TSV);
        write_tsv(&path, report).wrap_err_with(|| format!("failed to write {}", path.display()))?;
        info!(path = %path.display(), "wrote report");
    }
    Ok(())
}

/// Process exit status for an aggregate outcome code.
fn exit_code(code: OutcomeCode) -> ExitCode {
    if code.is_success() {
        return ExitCode::SUCCESS;
    }
    match (code.value() & 0xff) as u8 {
        0 => ExitCode::FAILURE,
        low => ExitCode::from(low),
    }
}

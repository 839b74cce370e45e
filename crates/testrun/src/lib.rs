//! testrun - sequential test plan orchestrator
//!
//! Turns a plan (module, execution strategy, setup groups, directives) into
//! a sequence of process invocations and a hierarchical pass/fail report.
//!
//! Control flow, top-down:
//! [`Orchestrator`] → [`strategy::StrategyWalker`] →
//! [`setup::SetupRunner`] / [`executor::CommandExecutor`].

pub mod executor;
pub mod logsink;
pub mod setup;
pub mod strategy;

use chrono::Utc;
use executor::CommandExecutor;
use logsink::{RunLogGuard, RunLogSink};
use std::path::{Path, PathBuf};
use std::time::Instant;
use strategy::StrategyWalker;
use testrun_core::directives::DirectiveError;
use testrun_core::{Directives, Id, OutcomeCode, ResultRecord, RunReport, TestInfo};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("invalid directive: {0}")]
    Directive(#[from] DirectiveError),
    #[error("failed to create log directory {path}: {source}")]
    LogDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Directory for one loop iteration, under the base log directory.
pub fn loop_log_dir(base: &Path, iteration: u32) -> PathBuf {
    base.join(format!("loop{iteration}"))
}

/// Top-level entry point: runs the strategy once, or once per loop iteration.
///
/// Everything produced here is scoped to a single [`Orchestrator::run`] call.
#[derive(Debug)]
pub struct Orchestrator<'a> {
    info: &'a dyn TestInfo,
    directives: Directives,
    log_dir: PathBuf,
    log_sink: Option<RunLogSink>,
}

impl<'a> Orchestrator<'a> {
    /// Resolve directives and prepare the base log directory.
    ///
    /// This is the only fallible step; once a run starts, command failures
    /// are reported through outcome codes.
    pub fn new(info: &'a dyn TestInfo, log_dir: impl Into<PathBuf>) -> Result<Self, OrchestratorError> {
        let directives = Directives::resolve(info)?;
        let log_dir = log_dir.into();
        std::fs::create_dir_all(&log_dir).map_err(|source| OrchestratorError::LogDir {
            path: log_dir.clone(),
            source,
        })?;

        Ok(Self {
            info,
            directives,
            log_dir,
            log_sink: None,
        })
    }

    /// Mirror orchestrator logging into `{log_dir}/{module}.log` during each run.
    pub fn with_log_sink(mut self, sink: RunLogSink) -> Self {
        self.log_sink = Some(sink);
        self
    }

    pub async fn run(&self) -> RunReport {
        let module = self.info.module();
        let _log_guard = self.attach_run_log(&module.name);

        info!("***************** {} *********************************", module.name);

        let run_id = Id::new();
        let test_name = self.info.test_name();
        let started_at = Utc::now();
        let started = Instant::now();

        let executor =
            CommandExecutor::new(&self.log_dir).with_env(self.info.default_environment());

        let (return_code, results) = match self.directives.loop_count {
            None => {
                let walker = StrategyWalker::new(self.info, &executor, &self.directives);
                let pass = walker.run_once().await;
                let record = ResultRecord::new(&test_name, started.elapsed(), pass.code)
                    .with_step_codes(pass.step_codes)
                    .with_sub_tests(pass.records);
                (pass.code, vec![record])
            }
            Some(count) => self.run_loops(&executor, &test_name, count.get(), started).await,
        };

        info!(
            run_id = %run_id,
            test = %test_name,
            code = return_code.value(),
            records = results.len(),
            "run complete"
        );

        RunReport {
            run_id,
            test_name,
            host: self.info.host_identifier(),
            started_at,
            finished_at: Utc::now(),
            return_code,
            results,
        }
    }

    async fn run_loops(
        &self,
        executor: &CommandExecutor,
        test_name: &str,
        count: u32,
        started: Instant,
    ) -> (OutcomeCode, Vec<ResultRecord>) {
        let mut total = OutcomeCode::SUCCESS;
        let mut results = Vec::new();

        for iteration in 0..count {
            info!("*************** loop {} *************************", iteration);

            let dir = loop_log_dir(&self.log_dir, iteration);
            match std::fs::create_dir(&dir) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {}
                Err(err) => {
                    warn!(dir = %dir.display(), error = %err, "failed to create loop log directory");
                }
            }

            let iteration_executor = executor.in_log_dir(dir);
            let walker = StrategyWalker::new(self.info, &iteration_executor, &self.directives);
            let pass = walker.run_once().await;
            total |= pass.code;

            // Duration is measured from the start of the run, not the iteration.
            results.push(
                ResultRecord::new(format!("{test_name}_loop{iteration}"), started.elapsed(), pass.code)
                    .with_step_codes(pass.step_codes)
                    .with_sub_tests(pass.records),
            );

            if !total.is_success() && self.directives.exit_loop_on_error {
                warn!(iteration, code = total.value(), "stopping loop after failed iteration");
                break;
            }
        }

        (total, results)
    }

    fn attach_run_log(&self, module_name: &str) -> Option<RunLogGuard> {
        let sink = self.log_sink.as_ref()?;
        let path = self.log_dir.join(format!("{module_name}.log"));
        match sink.attach(&path) {
            Ok(guard) => Some(guard),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to attach run log");
                None
            }
        }
    }
}

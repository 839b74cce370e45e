//! One pass over the execution strategy.

use crate::executor::{CommandExecutor, CommandSpec};
use crate::setup::SetupRunner;
use std::time::Instant;
use testrun_core::{Directives, OutcomeCode, ResultRecord, TestInfo};
use tracing::{info, warn};

/// Result of a strategy pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassOutcome {
    /// Every setup and main command code OR-combined.
    pub code: OutcomeCode,
    /// Combined setup-and-main code per item that ran.
    pub step_codes: Vec<OutcomeCode>,
    /// One record per item that ran, in strategy order.
    pub records: Vec<ResultRecord>,
}

/// Walks the execution strategy once, applying `exitListOnError`.
#[derive(Debug)]
pub struct StrategyWalker<'a> {
    info: &'a dyn TestInfo,
    executor: &'a CommandExecutor,
    directives: &'a Directives,
}

impl<'a> StrategyWalker<'a> {
    pub fn new(info: &'a dyn TestInfo, executor: &'a CommandExecutor, directives: &'a Directives) -> Self {
        Self {
            info,
            executor,
            directives,
        }
    }

    pub async fn run_once(&self) -> PassOutcome {
        let module = self.info.module();
        let host = self.info.host_identifier();
        let strategy = self.info.execution_strategy();
        let setup = SetupRunner::new(self.info, self.executor, self.directives.global_timeout_sec);

        let mut pass = PassOutcome::default();

        for item in &strategy {
            let log_name = module.log_file_name(item.name(), &host);
            let mut item_code = OutcomeCode::SUCCESS;
            let mut step_codes = Vec::new();

            // Setup failures are recorded but never block the main command.
            if let Some(reference) = item.setup.as_deref() {
                let outcome = setup.run(reference, &module.path, &log_name).await;
                item_code |= outcome.code;
                step_codes.extend(outcome.step_codes);
            }

            let command = CommandSpec::for_item(self.info, &item.command, &module.path);
            let wait_time = item.command.wait_time(self.directives.global_timeout_sec);

            let started = Instant::now();
            let code = self.executor.run(&command, &log_name, wait_time).await;
            let record = ResultRecord::new(item.name(), started.elapsed(), code);

            item_code |= code;
            step_codes.push(code);

            info!(
                item = item.name(),
                status = record.status.as_str(),
                code = code.value(),
                duration = %record.duration,
                "item finished"
            );

            pass.code |= item_code;
            pass.step_codes.push(item_code);
            pass.records.push(record.with_step_codes(step_codes));

            // Only the main command's code decides early exit.
            if !code.is_success() && self.directives.exit_list_on_error {
                warn!(item = item.name(), "stopping strategy after failed item");
                break;
            }
        }

        pass
    }
}

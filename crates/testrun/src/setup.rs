//! Setup steps run ahead of an execution-strategy item.

use crate::executor::{CommandExecutor, CommandSpec};
use std::path::Path;
use testrun_core::{OutcomeCode, TestInfo};
use tracing::{debug, info, warn};

/// Aggregate result of one setup group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetupOutcome {
    /// All step codes OR-combined.
    pub code: OutcomeCode,
    /// Individual step codes, in run order.
    pub step_codes: Vec<OutcomeCode>,
}

/// Runs every step of a setup group; a failing step never stops the rest.
#[derive(Debug)]
pub struct SetupRunner<'a> {
    info: &'a dyn TestInfo,
    executor: &'a CommandExecutor,
    global_timeout_sec: u64,
}

impl<'a> SetupRunner<'a> {
    pub fn new(info: &'a dyn TestInfo, executor: &'a CommandExecutor, global_timeout_sec: u64) -> Self {
        Self {
            info,
            executor,
            global_timeout_sec,
        }
    }

    pub async fn run(&self, reference: &str, module_path: &Path, log_name: &str) -> SetupOutcome {
        let items = match self.info.setup_group(reference) {
            Ok(items) => items,
            Err(err) => {
                warn!(setup = reference, error = %err, "cannot resolve setup group");
                return SetupOutcome {
                    code: OutcomeCode(1),
                    step_codes: vec![OutcomeCode(1)],
                };
            }
        };

        info!(setup = reference, steps = items.len(), "running setup");

        let mut outcome = SetupOutcome::default();
        for item in &items {
            let command = CommandSpec::for_item(self.info, item, module_path);
            let wait_time = item.wait_time(self.global_timeout_sec);
            let code = self.executor.run(&command, log_name, wait_time).await;
            debug!(setup = reference, step = %item.name, code = code.value(), "setup step finished");

            outcome.code |= code;
            outcome.step_codes.push(code);
        }
        outcome
    }
}

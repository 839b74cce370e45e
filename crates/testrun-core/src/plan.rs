//! Test plan loading.
//!
//! [`TestInfo`] is the narrow contract the orchestrator consumes plan data
//! through. [`PlanFile`] implements it for YAML plans of the form:
//!
//! ```yaml
//! testName: echo_suite
//! defaultENV:
//!   CRT_PHY_ADDR_STR: "ofi+sockets"
//! module:
//!   name: echo
//!   path: scripts/echo
//!   logBaseName: echo
//!   logType: testlog
//! directives:
//!   loop: "no"
//!   exitListOnError: "yes"
//! execStrategy:
//!   - name: echo_server
//!     type: shell
//!     setup: echo_setup
//!     parameters: ["--port", "${ECHO_PORT}"]
//! setupGroups:
//!   echo_setup:
//!     - name: cleanup
//!       exe: rm
//!       parameters: ["-f", "/tmp/echo.sock"]
//! ```

use crate::types::{ExecutionItem, ModuleInfo, SetupItem};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("failed to read plan file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid plan: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("unknown setup group: {0}")]
    UnknownSetupGroup(String),
}

/// Plan data as seen by the orchestrator.
///
/// The plan is read-only for the duration of a run.
pub trait TestInfo: std::fmt::Debug + Send + Sync {
    /// Test name used for top-level result records.
    fn test_name(&self) -> String;

    /// Look up a directive, falling back to `default`.
    fn directive(&self, name: &str, default: &str) -> String;

    fn module(&self) -> ModuleInfo;

    /// Ordered execution strategy.
    fn execution_strategy(&self) -> Vec<ExecutionItem>;

    /// Ordered setup items for a setup group reference.
    fn setup_group(&self, reference: &str) -> Result<Vec<SetupItem>, PlanError>;

    /// Fully substituted argument vector for an item.
    fn parameters(&self, item: &SetupItem) -> Vec<String>;

    /// Environment overlay applied to every launched command.
    fn default_environment(&self) -> BTreeMap<String, String>;

    fn host_identifier(&self) -> String;
}

/// YAML test plan.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanFile {
    #[serde(default)]
    pub test_name: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default, rename = "defaultENV")]
    pub default_env: BTreeMap<String, String>,
    pub module: ModuleInfo,
    #[serde(default)]
    pub directives: BTreeMap<String, serde_yaml::Value>,
    #[serde(default)]
    pub exec_strategy: Vec<ExecutionItem>,
    #[serde(default)]
    pub setup_groups: BTreeMap<String, Vec<SetupItem>>,
}

impl PlanFile {
    /// Load a plan from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, PlanError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, PlanError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Override the host identifier (e.g. from the command line).
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Expand `${VAR}` from the plan environment, then the process environment.
    /// Unknown variables are left as written.
    fn substitute(&self, arg: &str) -> String {
        let mut out = String::with_capacity(arg.len());
        let mut rest = arg;

        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                out.push_str(&rest[start..]);
                return out;
            };
            let name = &after[..end];
            let value = self
                .default_env
                .get(name)
                .cloned()
                .or_else(|| std::env::var(name).ok());
            match value {
                Some(value) => out.push_str(&value),
                None => out.push_str(&rest[start..start + 3 + end]),
            }
            rest = &after[end + 1..];
        }

        out.push_str(rest);
        out
    }
}

impl TestInfo for PlanFile {
    fn test_name(&self) -> String {
        self.test_name
            .clone()
            .unwrap_or_else(|| self.module.name.clone())
    }

    fn directive(&self, name: &str, default: &str) -> String {
        match self.directives.get(name) {
            Some(serde_yaml::Value::String(s)) => s.clone(),
            Some(serde_yaml::Value::Number(n)) => n.to_string(),
            Some(serde_yaml::Value::Bool(b)) => (if *b { "yes" } else { "no" }).to_string(),
            _ => default.to_string(),
        }
    }

    fn module(&self) -> ModuleInfo {
        self.module.clone()
    }

    fn execution_strategy(&self) -> Vec<ExecutionItem> {
        self.exec_strategy.clone()
    }

    fn setup_group(&self, reference: &str) -> Result<Vec<SetupItem>, PlanError> {
        self.setup_groups
            .get(reference)
            .cloned()
            .ok_or_else(|| PlanError::UnknownSetupGroup(reference.to_string()))
    }

    fn parameters(&self, item: &SetupItem) -> Vec<String> {
        item.parameters
            .to_vec()
            .iter()
            .map(|arg| self.substitute(arg))
            .collect()
    }

    fn default_environment(&self) -> BTreeMap<String, String> {
        self.default_env.clone()
    }

    fn host_identifier(&self) -> String {
        self.host
            .clone()
            .unwrap_or_else(|| default_host(std::env::var("HOSTNAME").ok()))
    }
}

/// Host used when the plan names none: `$HOSTNAME`, then the node name,
/// then `localhost`.
fn default_host(env_host: Option<String>) -> String {
    env_host
        .filter(|h| !h.is_empty())
        .or_else(node_name)
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(unix)]
fn node_name() -> Option<String> {
    nix::unistd::gethostname()
        .ok()?
        .into_string()
        .ok()
        .filter(|h| !h.is_empty())
}

#[cfg(not(unix))]
fn node_name() -> Option<String> {
    None
}

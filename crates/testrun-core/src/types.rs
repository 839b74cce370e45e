//! Core types for the test orchestrator.
//!
//! Plan fragments (module descriptor, execution and setup items) flow down
//! into the runner; outcome codes and result records flow back up.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

/// Unique identifier for runs.
/// Uses `UUIDv7` for time-ordered lexicographic sorting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(pub String);

impl Id {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// --- Outcome codes ---

/// Integer failure indicator: 0 is success, anything else is failure.
///
/// Codes from several steps are combined with bitwise OR. This keeps the
/// "some failure bit is set" property but loses which step produced which
/// code; [`ResultRecord::step_codes`] keeps the individual values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutcomeCode(pub u32);

impl OutcomeCode {
    pub const SUCCESS: Self = Self(0);
    /// Fixed code reported for a command that exceeded its wait time.
    pub const TIMEOUT: Self = Self(1);

    pub fn is_success(self) -> bool {
        self.0 == 0
    }

    pub fn value(self) -> u32 {
        self.0
    }

    /// Convert a raw process exit code.
    pub fn from_exit_code(code: i32) -> Self {
        Self(code as u32)
    }
}

impl BitOr for OutcomeCode {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for OutcomeCode {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for OutcomeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// --- Plan fragments ---

/// How an item's executable is located.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// Raw executable name or path, used as-is.
    #[default]
    Exe,
    /// `<module path>/<exe>.sh`.
    Shell,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exe => "exe",
            Self::Shell => "shell",
        }
    }
}

/// Module descriptor from the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleInfo {
    pub name: String,
    #[serde(default)]
    pub path: PathBuf,
    #[serde(default)]
    pub log_base_name: Option<String>,
    #[serde(default)]
    pub log_type: Option<String>,
}

impl ModuleInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: PathBuf::new(),
            log_base_name: None,
            log_type: None,
        }
    }

    /// Per-item log file name: `{logBaseName}.{item}.{logType}.{host}.log`.
    pub fn log_file_name(&self, item_name: &str, host: &str) -> String {
        format!(
            "{}.{}.{}.{}.log",
            self.log_base_name.as_deref().unwrap_or(&self.name),
            item_name,
            self.log_type.as_deref().unwrap_or("testlog"),
            host
        )
    }
}

/// Argument list as written in a plan: a YAML list, or one line split with
/// shell quoting rules (`"-c 'exit 3'"` is two arguments).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Parameters(Vec<String>);

impl Parameters {
    pub fn to_vec(&self) -> Vec<String> {
        self.0.clone()
    }
}

impl<'de> Deserialize<'de> for Parameters {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            List(Vec<String>),
            Line(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::List(args) => Ok(Self(args)),
            Raw::Line(line) => shell_words::split(&line).map(Self).map_err(|err| {
                serde::de::Error::custom(format!("invalid parameters {line:?}: {err}"))
            }),
        }
    }
}

/// A single runnable command from the plan. Setup items use this shape directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandItem {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: ItemKind,
    /// Executable name or path; defaults to `name`.
    #[serde(default)]
    pub exe: Option<String>,
    /// Per-item wait time in seconds, overriding the global timeout.
    #[serde(default, deserialize_with = "deserialize_seconds")]
    pub waittime: Option<u64>,
    #[serde(default)]
    pub parameters: Parameters,
}

/// Setup items cannot reference further setup groups.
pub type SetupItem = CommandItem;

impl CommandItem {
    /// Resolve the program to launch.
    pub fn program(&self, module_path: &Path) -> PathBuf {
        let exe = self.exe.as_deref().unwrap_or(&self.name);
        match self.kind {
            ItemKind::Shell => module_path.join(format!("{exe}.sh")),
            ItemKind::Exe => PathBuf::from(exe),
        }
    }

    /// Effective wait time: the item's own override, else the global timeout.
    pub fn wait_time(&self, global_timeout_sec: u64) -> Duration {
        Duration::from_secs(self.waittime.unwrap_or(global_timeout_sec))
    }
}

/// One entry of the execution strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionItem {
    #[serde(flatten)]
    pub command: CommandItem,
    /// Reference to a setup group run before the main command.
    #[serde(default)]
    pub setup: Option<String>,
}

impl ExecutionItem {
    pub fn name(&self) -> &str {
        &self.command.name
    }
}

/// Wait times appear both as YAML integers and as quoted strings.
fn deserialize_seconds<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(u64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Int(secs)) => Ok(Some(secs)),
        Some(Raw::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid waittime: {text}"))),
    }
}

// --- Results ---

/// Pass/fail status of a result record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestStatus {
    Pass,
    Fail,
}

impl TestStatus {
    pub fn from_code(code: OutcomeCode) -> Self {
        if code.is_success() {
            Self::Pass
        } else {
            Self::Fail
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
        }
    }
}

/// Result of one execution-strategy item, or of a whole pass over the strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub name: String,
    /// Wall-clock seconds, two decimal places.
    pub duration: String,
    pub return_code: OutcomeCode,
    pub status: TestStatus,
    /// Always empty; output is not inspected.
    #[serde(default)]
    pub error: String,
    /// Individual outcome codes that were OR-combined into `return_code`
    /// (or, for a pass record, one per item).
    #[serde(default)]
    pub step_codes: Vec<OutcomeCode>,
    #[serde(rename = "SubTests", default, skip_serializing_if = "Vec::is_empty")]
    pub sub_tests: Vec<ResultRecord>,
}

impl ResultRecord {
    pub fn new(name: impl Into<String>, elapsed: Duration, return_code: OutcomeCode) -> Self {
        Self {
            name: name.into(),
            duration: format_duration(elapsed),
            return_code,
            status: TestStatus::from_code(return_code),
            error: String::new(),
            step_codes: Vec::new(),
            sub_tests: Vec::new(),
        }
    }

    pub fn with_step_codes(mut self, codes: Vec<OutcomeCode>) -> Self {
        self.step_codes = codes;
        self
    }

    pub fn with_sub_tests(mut self, sub_tests: Vec<ResultRecord>) -> Self {
        self.sub_tests = sub_tests;
        self
    }

    pub fn passed(&self) -> bool {
        self.status == TestStatus::Pass
    }
}

/// Format elapsed time as seconds with two decimals.
pub fn format_duration(elapsed: Duration) -> String {
    format!("{:.2}", elapsed.as_secs_f64())
}

//! Typed run directives.
//!
//! Plans carry directives as loosely typed strings (`"yes"`, `"no"`, `"3"`).
//! They are resolved once, before any command runs, into [`Directives`].

use crate::plan::TestInfo;
use std::num::NonZeroU32;
use thiserror::Error;

/// Default wait time for a command when neither the item nor the plan sets one.
pub const DEFAULT_TIMEOUT_SEC: u64 = 1800;

pub const EXIT_LIST_ON_ERROR: &str = "exitListOnError";
pub const EXIT_LOOP_ON_ERROR: &str = "exitLoopOnError";
pub const LOOP: &str = "loop";
pub const GLOBAL_TIMEOUT: &str = "globalTimeout";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DirectiveError {
    #[error("invalid boolean value for {key}: {value}")]
    InvalidBool { key: String, value: String },
    #[error("invalid integer value for {key}: {value}")]
    InvalidInt { key: String, value: String },
}

/// Run-control options resolved from the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Directives {
    /// Stop the strategy pass at the first failing item.
    pub exit_list_on_error: bool,
    /// Stop looping once any iteration has failed.
    pub exit_loop_on_error: bool,
    /// Number of iterations; `None` runs the strategy once without loop directories.
    pub loop_count: Option<NonZeroU32>,
    /// Wait time for items without their own override.
    pub global_timeout_sec: u64,
}

impl Default for Directives {
    fn default() -> Self {
        Self {
            exit_list_on_error: false,
            exit_loop_on_error: true,
            loop_count: None,
            global_timeout_sec: DEFAULT_TIMEOUT_SEC,
        }
    }
}

impl Directives {
    /// Resolve every directive through the plan collaborator.
    pub fn resolve(info: &dyn TestInfo) -> Result<Self, DirectiveError> {
        let exit_list_on_error = parse_bool(
            EXIT_LIST_ON_ERROR,
            &info.directive(EXIT_LIST_ON_ERROR, "no"),
        )?;
        let exit_loop_on_error = parse_bool(
            EXIT_LOOP_ON_ERROR,
            &info.directive(EXIT_LOOP_ON_ERROR, "yes"),
        )?;
        let loop_count = parse_loop(&info.directive(LOOP, "no"))?;
        let global_timeout_sec = parse_positive(
            GLOBAL_TIMEOUT,
            &info.directive(GLOBAL_TIMEOUT, &DEFAULT_TIMEOUT_SEC.to_string()),
        )?;

        Ok(Self {
            exit_list_on_error,
            exit_loop_on_error,
            loop_count,
            global_timeout_sec,
        })
    }
}

/// Parse a boolean directive (case-insensitive).
pub fn parse_bool(key: &str, value: &str) -> Result<bool, DirectiveError> {
    match value.trim().to_lowercase().as_str() {
        "yes" | "y" | "true" | "1" | "on" => Ok(true),
        "no" | "n" | "false" | "0" | "off" => Ok(false),
        _ => Err(DirectiveError::InvalidBool {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Parse the `loop` directive: `"no"` or a positive iteration count.
///
/// `"0"` is rejected rather than run as an empty loop, so a plan that asks
/// for zero iterations fails before anything runs.
fn parse_loop(value: &str) -> Result<Option<NonZeroU32>, DirectiveError> {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("no") {
        return Ok(None);
    }
    trimmed
        .parse::<NonZeroU32>()
        .map(Some)
        .map_err(|_| DirectiveError::InvalidInt {
            key: LOOP.to_string(),
            value: value.to_string(),
        })
}

fn parse_positive(key: &str, value: &str) -> Result<u64, DirectiveError> {
    match value.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(DirectiveError::InvalidInt {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

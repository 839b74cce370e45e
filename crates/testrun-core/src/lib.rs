pub mod config;
pub mod directives;
pub mod plan;
pub mod report;
pub mod types;

pub use config::Config;
pub use directives::Directives;
pub use plan::{PlanFile, TestInfo};
pub use report::{ReportRow, ReportWriter, RunReport};
pub use types::*;

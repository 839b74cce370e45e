//! Run reports.
//!
//! Two artifacts are produced in the base log directory:
//! - `results.json`: the full [`RunReport`] with the result record tree.
//! - `report.tsv`: one row per result record, depth-first.
//!
//! TSV columns: `timestamp_ms`, level, name, duration, `return_code`, status, `step_codes`

use crate::types::{Id, OutcomeCode, ResultRecord, TestStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub const RESULTS_JSON: &str = "results.json";
pub const REPORT_TSV: &str = "report.tsv";

/// Everything the caller gets back from one orchestrated run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Id,
    pub test_name: String,
    pub host: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub return_code: OutcomeCode,
    pub results: Vec<ResultRecord>,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.return_code.is_success()
    }

    /// Write the report as pretty JSON.
    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writeln!(writer)?;
        writer.flush()
    }

    /// Flatten the result tree into report rows.
    pub fn rows(&self) -> Vec<ReportRow> {
        let timestamp_ms = self.finished_at.timestamp_millis();
        let mut rows = Vec::new();
        for record in &self.results {
            push_rows(&mut rows, record, 0, timestamp_ms);
        }
        rows
    }
}

fn push_rows(rows: &mut Vec<ReportRow>, record: &ResultRecord, level: u32, timestamp_ms: i64) {
    rows.push(ReportRow::from_record(timestamp_ms, level, record));
    for child in &record.sub_tests {
        push_rows(rows, child, level + 1, timestamp_ms);
    }
}

/// A single row in the report.tsv file.
#[derive(Debug, Clone)]
pub struct ReportRow {
    /// Unix timestamp in milliseconds.
    pub timestamp_ms: i64,
    /// Tree depth: 0 for a run or loop iteration, 1 for its items.
    pub level: u32,
    pub name: String,
    pub duration: String,
    pub return_code: OutcomeCode,
    pub status: TestStatus,
    pub step_codes: Vec<OutcomeCode>,
}

impl ReportRow {
    pub fn from_record(timestamp_ms: i64, level: u32, record: &ResultRecord) -> Self {
        Self {
            timestamp_ms,
            level,
            name: record.name.clone(),
            duration: record.duration.clone(),
            return_code: record.return_code,
            status: record.status,
            step_codes: record.step_codes.clone(),
        }
    }

    /// Format as a TSV line.
    fn to_tsv_line(&self) -> String {
        let step_codes = self
            .step_codes
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");

        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.timestamp_ms,
            self.level,
            sanitize_field(&self.name),
            self.duration,
            self.return_code,
            self.status.as_str(),
            step_codes,
        )
    }
}

/// Sanitize a field value to prevent TSV breakage.
fn sanitize_field(value: &str) -> String {
    value.replace(['\t', '\n', '\r'], " ")
}

/// TSV header row.
const HEADER: &str = "timestamp_ms\tlevel\tname\tduration\treturn_code\tstatus\tstep_codes";

/// Writer for report.tsv files.
pub struct ReportWriter {
    writer: BufWriter<File>,
}

impl std::fmt::Debug for ReportWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportWriter")
            .field("writer", &"BufWriter<File>")
            .finish()
    }
}

impl ReportWriter {
    /// Create a new report writer, writing header if the file is new.
    pub fn new(path: &Path) -> std::io::Result<Self> {
        let exists = path.exists();
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        let mut writer = BufWriter::new(file);

        if !exists {
            writeln!(writer, "{HEADER}")?;
        }

        Ok(Self { writer })
    }

    pub fn write_row(&mut self, row: &ReportRow) -> std::io::Result<()> {
        writeln!(self.writer, "{}", row.to_tsv_line())
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

/// Append every row of a run report to a TSV file.
pub fn write_tsv(path: &Path, report: &RunReport) -> std::io::Result<()> {
    let mut writer = ReportWriter::new(path)?;
    for row in report.rows() {
        writer.write_row(&row)?;
    }
    writer.flush()
}

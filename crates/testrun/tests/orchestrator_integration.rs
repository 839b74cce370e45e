//! End-to-end runs of YAML plans through the orchestrator.
//!
//! Covers plan loading, setup groups, timeouts, loop isolation, and report output.

use std::path::Path;
use tempfile::TempDir;
use testrun::{loop_log_dir, Orchestrator};
use testrun_core::report::{write_tsv, REPORT_TSV, RESULTS_JSON};
use testrun_core::{OutcomeCode, PlanFile, RunReport, TestStatus};

fn write_plan(dir: &Path, yaml: &str) -> PlanFile {
    let path = dir.join("plan.yml");
    std::fs::write(&path, yaml).unwrap();
    PlanFile::from_file(&path).unwrap()
}

const ECHO_PLAN: &str = r#"
testName: echo_suite
host: node1
defaultENV:
  ECHO_MESSAGE: "hello from plan"
module:
  name: echo
  logBaseName: cart_echo
directives:
  globalTimeout: 30
execStrategy:
  - name: greet
    exe: sh
    setup: prepare
    parameters: ["-c", "echo \"$ECHO_MESSAGE\" ${ECHO_MESSAGE}"]
  - name: hang
    exe: sleep
    waittime: 1
    parameters: ["10"]
  - name: fail
    exe: sh
    parameters: ["-c", "exit 4"]
setupGroups:
  prepare:
    - name: first
      exe: sh
      parameters: ["-c", "echo setting up"]
    - name: second
      exe: sh
      parameters: ["-c", "exit 2"]
"#;

#[tokio::test]
async fn single_pass_produces_full_tree_and_logs() {
    let dir = TempDir::new().unwrap();
    let plan = write_plan(dir.path(), ECHO_PLAN);
    let log_dir = dir.path().join("logs");

    let report = Orchestrator::new(&plan, &log_dir).unwrap().run().await;

    // setup (2) | timeout (1) | exit 4
    assert_eq!(report.return_code, OutcomeCode(7));
    assert_eq!(report.results.len(), 1);

    let top = &report.results[0];
    assert_eq!(top.name, "echo_suite");
    assert_eq!(top.status, TestStatus::Fail);

    let items = &top.sub_tests;
    assert_eq!(items.len(), 3);
    assert_eq!(items[0].name, "greet");
    assert_eq!(items[0].status, TestStatus::Pass);
    assert_eq!(
        items[0].step_codes,
        vec![OutcomeCode(0), OutcomeCode(2), OutcomeCode(0)]
    );
    assert_eq!(items[1].return_code, OutcomeCode::TIMEOUT);
    assert_eq!(items[1].status, TestStatus::Fail);
    assert_eq!(items[2].return_code, OutcomeCode(4));

    let greet_log =
        std::fs::read_to_string(log_dir.join("cart_echo.greet.testlog.node1.log")).unwrap();
    assert!(greet_log.contains("setting up"));
    assert!(greet_log.contains("Command failed: 2"));
    // Both the process environment and plan substitution see defaultENV.
    assert!(greet_log.contains("hello from plan hello from plan"));

    let hang_log =
        std::fs::read_to_string(log_dir.join("cart_echo.hang.testlog.node1.log")).unwrap();
    assert!(hang_log.contains("Command: sleep 10"));
    assert!(hang_log.contains("Command time out"));
}

#[tokio::test]
async fn looping_run_isolates_iterations() {
    let dir = TempDir::new().unwrap();
    let plan = write_plan(
        dir.path(),
        r#"
testName: soak
host: node1
module:
  name: soak
directives:
  loop: "2"
  exitLoopOnError: "no"
execStrategy:
  - name: flaky
    exe: sh
    parameters: ["-c", "echo iteration; exit 1"]
"#,
    );
    let log_dir = dir.path().join("logs");

    let report = Orchestrator::new(&plan, &log_dir).unwrap().run().await;

    assert_eq!(report.results.len(), 2);
    assert_eq!(report.results[0].name, "soak_loop0");
    assert_eq!(report.results[1].name, "soak_loop1");
    assert_eq!(report.return_code, OutcomeCode(1));

    for iteration in 0..2 {
        let log = loop_log_dir(&log_dir, iteration).join("soak.flaky.testlog.node1.log");
        let content = std::fs::read_to_string(&log).unwrap();
        assert_eq!(content.matches("Command failed: 1").count(), 1);
    }
    assert!(!log_dir.join("soak.flaky.testlog.node1.log").exists());
}

#[tokio::test]
async fn reports_are_written_to_base_log_dir() {
    let dir = TempDir::new().unwrap();
    let plan = write_plan(
        dir.path(),
        r#"
testName: quick
host: node1
module:
  name: quick
execStrategy:
  - name: ok
    exe: "true"
"#,
    );
    let log_dir = dir.path().join("logs");

    let report = Orchestrator::new(&plan, &log_dir).unwrap().run().await;
    assert!(report.passed());

    report.write_json(&log_dir.join(RESULTS_JSON)).unwrap();
    write_tsv(&log_dir.join(REPORT_TSV), &report).unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(log_dir.join(RESULTS_JSON)).unwrap())
            .unwrap();
    assert_eq!(json["results"][0]["name"], "quick");
    assert_eq!(json["results"][0]["status"], "PASS");
    assert_eq!(json["results"][0]["SubTests"][0]["name"], "ok");
    assert_eq!(json["results"][0]["SubTests"][0]["error"], "");

    let parsed: RunReport = serde_json::from_value(json).unwrap();
    assert_eq!(parsed.results, report.results);

    let tsv = std::fs::read_to_string(log_dir.join(REPORT_TSV)).unwrap();
    assert_eq!(tsv.lines().count(), 3);
}

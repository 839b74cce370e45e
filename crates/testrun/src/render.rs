//! Terminal output for the testrun CLI.

use testrun_core::{Directives, ExecutionItem, ResultRecord, RunReport, TestInfo, TestStatus};

/// Print the result tree of a finished run.
pub fn print_report(report: &RunReport) {
    println!();
    println!(
        "{:<40}  {:<6}  {:>10}  {:>6}",
        "NAME", "STATUS", "DURATION", "CODE"
    );
    println!("{}", "-".repeat(68));

    for record in &report.results {
        print_record(record, 0);
    }

    println!();
    println!(
        "{} on {}: {} (code {})",
        report.test_name,
        report.host,
        format_status(if report.passed() {
            TestStatus::Pass
        } else {
            TestStatus::Fail
        }),
        report.return_code
    );
}

fn print_record(record: &ResultRecord, depth: usize) {
    let name = format!("{}{}", "  ".repeat(depth), record.name);
    println!(
        "{:<40}  {:<6}  {:>10}  {:>6}",
        truncate(&name, 40),
        format_status(record.status),
        record.duration,
        record.return_code
    );
    for child in &record.sub_tests {
        print_record(child, depth + 1);
    }
}

/// Print the resolved plan without running anything.
pub fn print_plan(info: &dyn TestInfo, directives: &Directives) {
    let module = info.module();
    println!("Test:    {}", info.test_name());
    println!("Module:  {} ({})", module.name, module.path.display());
    println!("Host:    {}", info.host_identifier());
    println!();
    println!("  Loop:               {}", directives.loop_count.map_or_else(|| "no".to_string(), |n| n.to_string()));
    println!("  Exit list on error: {}", yes_no(directives.exit_list_on_error));
    println!("  Exit loop on error: {}", yes_no(directives.exit_loop_on_error));
    println!("  Global timeout:     {}s", directives.global_timeout_sec);
    println!();

    let strategy = info.execution_strategy();
    if strategy.is_empty() {
        println!("Execution strategy is empty.");
        return;
    }

    println!("Execution strategy:");
    for (index, item) in strategy.iter().enumerate() {
        print_item(info, directives, index + 1, item);
    }
}

fn print_item(info: &dyn TestInfo, directives: &Directives, index: usize, item: &ExecutionItem) {
    let module = info.module();
    let wait = item.command.wait_time(directives.global_timeout_sec).as_secs();
    let args = info.parameters(&item.command).join(" ");
    println!(
        "  {index}. {} [{}] {} {}  (wait {wait}s)",
        item.name(),
        item.command.kind.as_str(),
        item.command.program(&module.path).display(),
        args
    );

    let Some(reference) = item.setup.as_deref() else {
        return;
    };
    match info.setup_group(reference) {
        Ok(steps) => {
            for step in &steps {
                println!(
                    "       setup {}: {} {}",
                    step.name,
                    step.program(&module.path).display(),
                    info.parameters(step).join(" ")
                );
            }
        }
        Err(err) => println!("       setup {reference}: {err}"),
    }
}

fn format_status(status: TestStatus) -> &'static str {
    status.as_str()
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

/// Truncate a string to max length, adding "..." if truncated.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_keeps_short_names() {
        assert_eq!(truncate("ping", 10), "ping");
    }

    #[test]
    fn truncate_shortens_long_names() {
        assert_eq!(truncate("a_really_long_item_name", 10), "a_reall...");
    }
}

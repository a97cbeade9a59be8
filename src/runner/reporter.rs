use colored::Colorize;

use crate::runner::types::{RequestResult, RequestStatus, RunRecord, RunStatus, RunSummary};
use crate::script::ScriptResult;

pub struct TestReporter {
    verbose: bool,
}

impl TestReporter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// 打印运行开始
    pub fn print_header(&self, runner_name: &str, total: usize) {
        println!("\nRunning {} requests from {}...\n", total, runner_name.bold());
    }

    /// 打印单个请求结果
    pub fn print_result(&self, result: &RequestResult) {
        let number = result.index + 1;

        if result.status == RequestStatus::Skipped {
            println!(
                " {} [{}] {} - {} {} {}",
                "⊘".dimmed(),
                number,
                result.name,
                result.method.cyan(),
                result.url,
                format!("(skipped: {})", result.skip_reason.as_deref().unwrap_or("")).dimmed()
            );
            return;
        }

        let success = result.is_success();
        let symbol = if success { "✓".green() } else { "✗".red() };
        let status = result
            .response_status
            .map(|s| format!(" {}", s))
            .unwrap_or_default();

        println!(
            " {} [{}] {} - {} {}{} ({}ms)",
            symbol,
            number,
            result.name,
            result.method.cyan(),
            result.url,
            status,
            result.duration_ms
        );

        if let Some(error) = &result.error {
            println!("   {}: {}", "Error".red().bold(), error);
        }

        if self.verbose
            && let Some(response) = &result.response
        {
            let body = serde_json::to_string_pretty(&response.data)
                .unwrap_or_else(|_| response.data.to_string());
            for line in body.lines() {
                println!("   {}", line.dimmed());
            }
        }

        if let Some(script) = &result.pre_request_script {
            self.print_script("pre-request", script);
        }
        if let Some(script) = &result.test_script {
            self.print_script("test", script);
        }
    }

    fn print_script(&self, phase: &str, script: &ScriptResult) {
        if self.verbose {
            for log in &script.logs {
                println!("   {} [{}] {}", phase.dimmed(), log.level, log.message);
            }
        }

        // 显示断言结果
        if !script.test_results.is_empty() {
            println!("   Assertions:");
            for assertion in &script.test_results {
                if assertion.passed {
                    println!("     {} {}", "✓".green(), assertion.message);
                } else {
                    println!("     {} {}", "✗".red(), assertion.message.red());
                }
            }
        }

        for error in &script.errors {
            let label = if script.timed_out { "Timeout" } else { "Script error" };
            println!("   {} ({}): {}", label.yellow().bold(), phase, error);
        }
    }

    /// 打印运行摘要
    pub fn print_summary(&self, record: &RunRecord) {
        let summary: &RunSummary = &record.summary;

        println!("\n{}", "━".repeat(50));
        println!("{}", "Summary".bold());
        println!("{}", "━".repeat(50));

        if summary.skipped > 0 {
            println!(
                "  {}: {} passed, {} failed, {} skipped, {} total",
                "Requests".bold(),
                summary.passed.to_string().green(),
                summary.failed.to_string().red(),
                summary.skipped.to_string().dimmed(),
                summary.total
            );
        } else if summary.failed == 0 {
            println!(
                "  {}: {} passed, {} total",
                "Requests".bold(),
                summary.passed.to_string().green(),
                summary.total
            );
        } else {
            println!(
                "  {}: {} passed, {} failed, {} total",
                "Requests".bold(),
                summary.passed.to_string().green(),
                summary.failed.to_string().red(),
                summary.total
            );
        }

        // 显示断言统计
        if summary.total_assertions > 0 {
            if summary.failed_assertions == 0 {
                println!(
                    "  {}: {} passed, {} total",
                    "Assertions".bold(),
                    summary.passed_assertions.to_string().green(),
                    summary.total_assertions
                );
            } else {
                println!(
                    "  {}: {} passed, {} failed, {} total",
                    "Assertions".bold(),
                    summary.passed_assertions.to_string().green(),
                    summary.failed_assertions.to_string().red(),
                    summary.total_assertions
                );
            }
        }

        let status = match record.status {
            RunStatus::Completed => record.status.as_str().green(),
            RunStatus::Running => record.status.as_str().normal(),
            RunStatus::Stopped | RunStatus::FailedFast => record.status.as_str().yellow(),
        };
        println!("  {}: {}", "Status".bold(), status);
        println!(
            "  {}: {:.3}s",
            "Duration".bold(),
            record.total_time_ms as f64 / 1000.0
        );
        println!();
    }
}

impl Default for TestReporter {
    fn default() -> Self {
        Self::new(false)
    }
}

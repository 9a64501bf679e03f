//! Console result lines and the final summary table.

use std::time::Duration;

use crate::llm::TokenUsage;
use crate::runner::{SuiteReport, TestOutcome};

/// One line per test, printed as each suite finishes.
pub fn print_suite(report: &SuiteReport) {
    println!();
    println!("Suite: {}", report.suite);
    for outcome in &report.outcomes {
        println!("  {}", format_outcome(outcome));
    }
}

fn format_outcome(outcome: &TestOutcome) -> String {
    let mark = if outcome.passed { "✓" } else { "✗" };
    let duration = format_duration(Duration::from_millis(outcome.duration_ms));
    let mut line = format!(
        "{} {} ({} actions, {})",
        mark, outcome.name, outcome.action_count, duration
    );
    if let Some(tier) = &outcome.healed_by {
        line.push_str(&format!(" [healed by {}]", tier));
    }
    if !outcome.passed {
        line.push_str(&format!(" — {}", outcome.reason));
    }
    line
}

/// Aggregate table across all suites in the invocation.
pub fn print_summary(reports: &[SuiteReport]) {
    let mut passed = 0usize;
    let mut failed = 0usize;
    let mut usage = TokenUsage::default();
    let mut total = Duration::ZERO;

    println!();
    println!("{:<30} {:>8} {:>8} {:>10}", "suite", "passed", "failed", "duration");
    for report in reports {
        let suite_passed = report.outcomes.iter().filter(|o| o.passed).count();
        let suite_failed = report.outcomes.len() - suite_passed;
        passed += suite_passed;
        failed += suite_failed;
        usage += report.usage;
        total += Duration::from_millis(report.duration_ms);
        println!(
            "{:<30} {:>8} {:>8} {:>10}",
            report.suite,
            suite_passed,
            suite_failed,
            format_duration(Duration::from_millis(report.duration_ms))
        );
    }

    println!();
    println!(
        "{} passed, {} failed in {}",
        passed,
        failed,
        format_duration(total)
    );
    if usage.total() > 0 {
        println!(
            "Tokens: {} in / {} out",
            usage.input_tokens, usage.output_tokens
        );
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs >= 60.0 {
        format!("{}m{:02}s", (secs / 60.0) as u64, (secs % 60.0) as u64)
    } else {
        format!("{:.1}s", secs)
    }
}

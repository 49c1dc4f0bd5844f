//! Console rendering of run results

use crate::runner::{StepResult, StepStatus, Verbosity};
use crate::suite::SuiteSummary;
use colored::Colorize;
use std::fmt::Write;

/// Force colors on or off
pub fn set_color(enabled: bool) {
    colored::control::set_override(enabled);
}

/// One status line per result, nested steps indented below their parent
pub fn render_result(result: &StepResult, verbosity: Verbosity) -> String {
    let mut out = String::new();
    render_line(&mut out, result, verbosity);
    if result.is_failed() {
        out.push_str(&render_failure(result));
    }
    out
}

fn render_line(out: &mut String, result: &StepResult, verbosity: Verbosity) {
    let indent = "  ".repeat(result.level);
    let label = format!("{}:{}", result.file, result.name);
    let line = match result.status() {
        StepStatus::Passed => format!("{}{} {}", indent, "✓".green(), label),
        StepStatus::Failed => format!("{}{} {}", indent, "✗".red(), label.bold()),
        StepStatus::Skipped => format!("{}{} {} {}", indent, "-".yellow(), label, "(skipped)".dimmed()),
    };
    let _ = write!(out, "{}", line);
    if let Some(poll) = &result.poll {
        let elapsed = poll.finish.duration_since(poll.start);
        let _ = write!(
            out,
            " {}",
            format!("(polled {} time(s) in {:.1?})", poll.attempts, elapsed).dimmed()
        );
    }
    out.push('\n');

    if verbosity >= Verbosity::Verbose {
        for step in &result.steps {
            render_line(out, step, verbosity);
        }
    }
}

/// Failure details: title, message and the expected/actual blocks
pub fn render_failure(result: &StepResult) -> String {
    let failed = result.failed_step();
    let mut out = String::new();
    let indent = "  ".repeat(result.level + 1);

    if failed.name != result.name || failed.level != result.level {
        let _ = writeln!(out, "{}{} {}", indent, "at step".dimmed(), failed.name);
    }
    if result.poll_condition_failed {
        let _ = writeln!(out, "{}{}", indent, "poll condition failed".yellow());
    }

    match (result.test_error(), &result.error) {
        (Some(test_err), _) => {
            let _ = writeln!(out, "{}{}", indent, test_err.title.red());
            for line in test_err.message.lines() {
                let _ = writeln!(out, "{}{}", indent, line);
            }
            let _ = writeln!(out, "{}{}", indent, "expected:".bold());
            for line in test_err.expected.lines() {
                let _ = writeln!(out, "{}  {}", indent, line.green());
            }
            let _ = writeln!(out, "{}{}", indent, "actual:".bold());
            for line in test_err.actual.lines() {
                let _ = writeln!(out, "{}  {}", indent, line.red());
            }
        }
        (None, Some(err)) => {
            let _ = writeln!(out, "{}{}", indent, err.to_string().red());
        }
        (None, None) => {}
    }
    out
}

/// `3 passed, 1 failed, 0 skipped`
pub fn render_summary(summary: &SuiteSummary) -> String {
    let passed = format!("{} passed", summary.passed);
    let failed = format!("{} failed", summary.failed);
    let failed = if summary.failed > 0 { failed.red().bold() } else { failed.normal() };
    format!(
        "{}, {}, {} skipped ({} file(s))",
        passed.green(),
        failed,
        summary.skipped,
        summary.files.len()
    )
}

/// Print results according to verbosity. Quiet prints failures only.
pub fn print_summary(summary: &SuiteSummary, verbosity: Verbosity) {
    if verbosity == Verbosity::Silent {
        return;
    }
    for result in &summary.results {
        if verbosity == Verbosity::Quiet && !result.is_failed() {
            continue;
        }
        print!("{}", render_result(result, verbosity));
    }
    println!("{}", render_summary(summary));
}

/// List the files a dry run would execute
pub fn print_dry_run(summary: &SuiteSummary, verbosity: Verbosity) {
    if verbosity == Verbosity::Silent {
        return;
    }
    for file in &summary.files {
        println!("{} {}", "✓".green(), file.display());
    }
    println!("{} file(s) valid", summary.files.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TestError;

    fn plain() {
        set_color(false);
    }

    #[test]
    fn test_render_passed_result() {
        plain();
        let result = StepResult::new("create user", "users.yaml", 0);
        assert_eq!(render_result(&result, Verbosity::Normal), "✓ users.yaml:create user\n");
    }

    #[test]
    fn test_render_failure_blocks() {
        plain();
        let mut result = StepResult::new("check", "doc.yaml", 0);
        result.fail(TestError::new("response body differs", "{\"a\":1}", "{\"a\":2}", "at path $.a values do not match").into());

        let text = render_result(&result, Verbosity::Normal);
        assert!(text.starts_with("✗ doc.yaml:check\n"));
        assert!(text.contains("response body differs"));
        assert!(text.contains("expected:\n    {\"a\":1}"));
        assert!(text.contains("actual:\n    {\"a\":2}"));
    }

    #[test]
    fn test_verbose_shows_nested_steps() {
        plain();
        let mut result = StepResult::new("parent", "doc.yaml", 0);
        result.steps.push(StepResult::new("child", "doc.yaml", 1));

        assert!(!render_result(&result, Verbosity::Normal).contains("child"));
        assert!(render_result(&result, Verbosity::Verbose).contains("  ✓ doc.yaml:child"));
    }

    #[test]
    fn test_render_summary() {
        plain();
        let summary = SuiteSummary {
            passed: 2,
            failed: 1,
            skipped: 0,
            ..Default::default()
        };
        assert_eq!(render_summary(&summary), "2 passed, 1 failed, 0 skipped (0 file(s))");
    }
}

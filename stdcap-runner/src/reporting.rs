//! Reporting of run results.

use anyhow::Result;
use colored::Colorize;
use std::io::Write;
use stdcap_core::{CollectReport, ItemReport, Outcome, Phase, Section};

use crate::args::OutputFormat;
use crate::runner::RunResults;

const RULE_WIDTH: usize = 80;

/// Reports the result of one case as soon as it completes.
pub fn report_progress<W: Write>(
    writer: &mut W,
    report: &ItemReport,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Pretty => {
            let status = if report.failed() {
                "FAILED".bright_red()
            } else {
                "PASSED".bright_green()
            };
            writeln!(writer, "{} {status}", report.name)?;
        }
        OutputFormat::Terse => {
            let marker = if report.failed() { "F".red() } else { ".".green() };
            write!(writer, "{marker}")?;
        }
    }

    writer.flush()?;
    Ok(())
}

/// Reports collection errors, failing cases with their captured output, and a summary.
pub fn report_results<W: Write>(
    writer: &mut W,
    results: &RunResults,
    format: OutputFormat,
) -> Result<()> {
    if matches!(format, OutputFormat::Terse) && !results.item_reports.is_empty() {
        writeln!(writer)?;
    }

    let collect_errors: Vec<_> = results
        .collect_reports
        .iter()
        .filter(|r| r.failure.is_some())
        .collect();
    if !collect_errors.is_empty() {
        write_banner(writer, "=", "ERRORS")?;
        for report in collect_errors {
            write_collect_error(writer, report)?;
        }
    }

    let failures: Vec<_> = results.item_reports.iter().filter(|r| r.failed()).collect();
    if !failures.is_empty() {
        write_banner(writer, "=", "FAILURES")?;
        for report in failures {
            write_failure(writer, report, format)?;
        }
    }

    write_summary(writer, results)
}

fn write_collect_error<W: Write>(writer: &mut W, report: &CollectReport) -> Result<()> {
    write_banner(writer, "_", &format!("ERROR collecting {}", report.source))?;
    if let Some(failure) = &report.failure {
        writeln!(writer, "{}", failure.bright_red())?;
    }
    write_sections(writer, &report.sections)
}

fn write_failure<W: Write>(writer: &mut W, report: &ItemReport, format: OutputFormat) -> Result<()> {
    write_banner(writer, "_", &report.name)?;

    for (phase, outcome) in &report.outcomes {
        if let Outcome::Failed(message) = outcome {
            writeln!(writer, "{} {}", format!("{phase}:").cyan(), message.bright_red())?;
        }
    }

    // Terse output keeps only the call phase's output.
    if matches!(format, OutputFormat::Terse) {
        let call_sections: Vec<_> = report
            .sections
            .iter()
            .filter(|s| s.title.ends_with(&Phase::Call.to_string()))
            .cloned()
            .collect();
        write_sections(writer, &call_sections)
    } else {
        write_sections(writer, &report.sections)
    }
}

fn write_sections<W: Write>(writer: &mut W, sections: &[Section]) -> Result<()> {
    for section in sections {
        write_banner(writer, "-", &section.title)?;
        write!(writer, "{}", section.content)?;
        if !section.content.ends_with('\n') {
            writeln!(writer)?;
        }
    }
    Ok(())
}

fn write_summary<W: Write>(writer: &mut W, results: &RunResults) -> Result<()> {
    let failed = results.failed_count();
    let errors = results.error_count();

    let mut parts = vec![];
    if failed > 0 {
        parts.push(format!("{failed} failed").red());
    }
    parts.push(format!("{} passed", results.passed_count()).green());
    if errors > 0 {
        parts.push(format!("{errors} error(s)").red());
    }

    let summary = parts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");

    if results.interrupted {
        write_banner(writer, "!", "interrupted")?;
    }
    writeln!(writer, "{summary}")?;

    Ok(())
}

fn write_banner<W: Write>(writer: &mut W, fill: &str, title: &str) -> Result<()> {
    let title = format!(" {title} ");
    let width = RULE_WIDTH.saturating_sub(title.chars().count());
    let left = width / 2;
    writeln!(
        writer,
        "{}{title}{}",
        fill.repeat(left),
        fill.repeat(width - left)
    )?;
    Ok(())
}

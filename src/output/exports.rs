use anyhow::Result;
use clap::ValueEnum;
use std::io::Write;

use super::summary::render_report;
use crate::insights::DashboardReport;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable tables
    #[default]
    Summary,
    /// The full report as JSON
    Json,
    /// One row per build
    Csv,
}

/// Exports a report in the requested format.
///
/// - Summary: terminal tables, the default
/// - JSON: programmatic access to the whole report
/// - CSV: spreadsheet analysis, one row per build
pub fn export_report(
    report: &DashboardReport,
    format: OutputFormat,
    pretty: bool,
    output: &mut dyn Write,
) -> Result<()> {
    match format {
        OutputFormat::Summary => {
            write!(output, "{}", render_report(report))?;
            Ok(())
        }
        OutputFormat::Json => export_json(report, pretty, output),
        OutputFormat::Csv => export_csv(report, output),
    }
}

fn export_json(report: &DashboardReport, pretty: bool, output: &mut dyn Write) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(report)?
    } else {
        serde_json::to_string(report)?
    };
    writeln!(output, "{json}")?;
    Ok(())
}

fn export_csv(report: &DashboardReport, output: &mut dyn Write) -> Result<()> {
    writeln!(
        output,
        "Pipeline,Datetime,Build,Passed,Failed,Total,Pass Rate (%),Fail Rate (%),Link,Stale"
    )?;

    for pipeline in &report.pipelines {
        for record in &pipeline.records {
            writeln!(
                output,
                "{},{},{},{},{},{},{:.2},{:.2},{},{}",
                csv_field(&pipeline.name),
                record.datetime.map(|dt| dt.to_rfc3339()).unwrap_or_default(),
                csv_field(&record.build),
                record.passed,
                record.failed,
                record.total,
                record.pass_rate,
                record.fail_rate,
                csv_field(&record.link),
                pipeline.stale
            )?;
        }
    }

    Ok(())
}

fn csv_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

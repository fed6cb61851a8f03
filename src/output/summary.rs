use std::fmt::Write;

use comfy_table::Cell;

use crate::config::Config;
use crate::insights::{AggregatedRecord, DashboardReport, PipelineReport};

use super::styling::{bright, bright_red, bright_yellow, cyan, dim, pass_rate};
use super::tables::{
    color_coded_fail_rate_cell, color_coded_pass_rate_cell, create_table, cyan_header,
};

/// Renders a human-readable report of a render cycle.
///
/// Displays an overview followed by one section per pipeline:
/// - a staleness warning when newer runs exist than the cached data shows
/// - fetch warnings (failed build listings or test result requests)
/// - a table of builds, newest first, with color-coded pass and fail rates
///
/// Color coding:
/// - Green: pass rate >80%, fail rate <25%
/// - Yellow: pass rate 50-80%, fail rate 25-50%
/// - Red: pass rate <50%, fail rate ≥50%
pub fn render_report(report: &DashboardReport) -> String {
    let mut output = String::new();

    add_section_header(&mut output, "📊", "Overview");
    let _ = writeln!(
        output,
        "  {} {}\n  {} {}\n  {} {}\n  {} {}\n  {} {}\n  {} {}\n",
        dim("Project:"),
        cyan(format!("{}/{}", report.organization, report.project)),
        dim("Pipelines:"),
        bright_yellow(report.pipelines.len()),
        dim("Builds analyzed:"),
        bright_yellow(report.total_builds()),
        dim("Max builds:"),
        bright_yellow(
            report
                .max_builds
                .map_or_else(|| "all".to_string(), |count| count.to_string())
        ),
        dim("Build filter:"),
        bright_yellow(report.filter.as_deref().unwrap_or("none")),
        dim("Collected at:"),
        dim(report.collected_at.format("%Y-%m-%d %H:%M UTC"))
    );

    for pipeline in &report.pipelines {
        render_pipeline(&mut output, pipeline);
    }

    output
}

/// Prints the configured projects, pipelines, filters and build counts.
pub fn print_pipelines(config: &Config) {
    println!("{}", render_pipelines(config));
}

fn add_section_header(output: &mut String, emoji: &str, title: &str) {
    let _ = writeln!(output, "{} {}", bright(emoji), bright(title).underlined());
}

fn render_pipeline(output: &mut String, pipeline: &PipelineReport) {
    add_section_header(output, "🧪", &pipeline.name);
    let _ = writeln!(output, "  {}", dim(&pipeline.link));

    if pipeline.stale {
        let _ = writeln!(
            output,
            "  {}",
            bright_yellow(format!(
                "⚠ New pipeline run available for {}! The data below is outdated. Clear cache and refresh to see updates.",
                pipeline.name
            ))
        );
    }

    for warning in &pipeline.warnings {
        let _ = writeln!(output, "  {}", bright_red(format!("✗ {warning}")));
    }

    if pipeline.records.is_empty() {
        let _ = writeln!(
            output,
            "  {}\n",
            bright_yellow(format!(
                "No build data available for pipeline {} (ID: {}).",
                pipeline.name, pipeline.pipeline_id
            ))
        );
        return;
    }

    if let Some(latest) = newest_first(&pipeline.records).first() {
        let _ = writeln!(
            output,
            "  {} {} {}",
            dim("Latest build:"),
            cyan(&latest.build),
            pass_rate(latest.pass_rate, latest.total)
        );
    }

    let mut table = create_table();
    table.set_header(cyan_header(&[
        "Datetime",
        "Build",
        "Passed",
        "Failed",
        "Total",
        "Pass Rate",
        "Fail Rate",
        "Link",
    ]));

    for record in newest_first(&pipeline.records) {
        table.add_row(vec![
            Cell::new(
                record
                    .datetime
                    .map_or_else(|| "N/A".to_string(), |dt| dt.format("%Y-%m-%d %H:%M").to_string()),
            ),
            Cell::new(&record.build),
            Cell::new(record.passed),
            Cell::new(record.failed),
            Cell::new(record.total),
            color_coded_pass_rate_cell(record.pass_rate, record.total),
            color_coded_fail_rate_cell(record.fail_rate, record.total),
            Cell::new(&record.link),
        ]);
    }

    let _ = writeln!(output, "{table}\n");
}

/// Records sorted by start time, newest first; builds that never started go last.
fn newest_first(records: &[AggregatedRecord]) -> Vec<&AggregatedRecord> {
    let mut sorted: Vec<&AggregatedRecord> = records.iter().collect();
    sorted.sort_by(|a, b| b.datetime.cmp(&a.datetime));
    sorted
}

fn render_pipelines(config: &Config) -> String {
    let mut output = String::new();

    add_section_header(&mut output, "🗂", "Projects");
    for (name, project) in &config.projects {
        let _ = writeln!(
            output,
            "  {} {}",
            cyan(name),
            dim(format!("({}/{})", config.organization, project.project))
        );
        for (pipeline, id) in &project.pipelines {
            let marker = if project.default_pipeline.as_deref() == Some(pipeline.as_str()) {
                " (default)"
            } else {
                ""
            };
            let _ = writeln!(output, "    {pipeline} {}{marker}", dim(format!("#{id}")));
        }
    }

    add_section_header(&mut output, "🔎", "Build filters");
    let _ = writeln!(output, "  None {}", dim("(no filter)"));
    for (name, pattern) in &config.build_filters {
        let _ = writeln!(output, "  {name} {}", dim(format!("contains \"{pattern}\"")));
    }

    if !config.max_builds_option.is_empty() {
        add_section_header(&mut output, "🔢", "Max builds");
        let labels: Vec<String> = config
            .max_builds_option
            .iter()
            .map(|count| format!("Last {count} builds"))
            .collect();
        let _ = writeln!(output, "  {}", labels.join(", "));
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn create_test_record(build: &str, day: Option<u32>, passed: u64, failed: u64, total: u64) -> AggregatedRecord {
        AggregatedRecord {
            datetime: day.map(|d| Utc.with_ymd_and_hms(2024, 1, d, 8, 0, 0).unwrap()),
            build: build.to_string(),
            passed,
            failed,
            total,
            pass_rate: if total > 0 { passed as f64 / total as f64 * 100.0 } else { 0.0 },
            fail_rate: if total > 0 { failed as f64 / total as f64 * 100.0 } else { 0.0 },
            link: format!("https://dev.azure.com/contoso/web/_build/results?buildId={build}"),
        }
    }

    fn create_test_report(pipelines: Vec<PipelineReport>) -> DashboardReport {
        DashboardReport {
            provider: "Azure Pipelines".to_string(),
            organization: "contoso".to_string(),
            project: "web".to_string(),
            collected_at: Utc::now(),
            max_builds: Some(10),
            filter: None,
            pipelines,
        }
    }

    fn create_test_pipeline(name: &str, stale: bool, records: Vec<AggregatedRecord>) -> PipelineReport {
        PipelineReport {
            name: name.to_string(),
            pipeline_id: 12,
            link: "https://dev.azure.com/contoso/web/_build?definitionId=12".to_string(),
            stale,
            records,
            warnings: vec![],
        }
    }

    #[test]
    fn test_render_report_overview() {
        let report = create_test_report(vec![]);

        let output = render_report(&report);

        assert!(output.contains("contoso/web"));
        assert!(output.contains("Builds analyzed:"));
        assert!(output.contains("Max builds:"));
    }

    #[test]
    fn test_render_report_lists_builds_newest_first() {
        let report = create_test_report(vec![create_test_pipeline(
            "CI",
            false,
            vec![
                create_test_record("1.0", Some(1), 7, 3, 10),
                create_test_record("1.2", Some(3), 10, 0, 10),
                create_test_record("1.1", Some(2), 5, 5, 10),
            ],
        )]);

        let output = render_report(&report);

        let newest = output.find("2024-01-03 08:00").unwrap();
        let middle = output.find("2024-01-02 08:00").unwrap();
        let oldest = output.find("2024-01-01 08:00").unwrap();
        assert!(newest < middle && middle < oldest);
        assert!(output.contains("70.00%"));
        assert!(output.contains("30.00%"));
    }

    #[test]
    fn test_render_report_warns_about_stale_pipeline() {
        let report = create_test_report(vec![create_test_pipeline(
            "CI",
            true,
            vec![create_test_record("1.0", Some(1), 1, 0, 1)],
        )]);

        let output = render_report(&report);

        assert!(output.contains("New pipeline run available for CI!"));
        assert!(output.contains("1.0"));
    }

    #[test]
    fn test_render_report_shows_empty_pipeline_and_warnings() {
        let mut pipeline = create_test_pipeline("Nightly", false, vec![]);
        pipeline
            .warnings
            .push("Error fetching builds for pipeline 12: boom".to_string());
        let report = create_test_report(vec![pipeline]);

        let output = render_report(&report);

        assert!(output.contains("No build data available for pipeline Nightly (ID: 12)."));
        assert!(output.contains("Error fetching builds for pipeline 12: boom"));
    }

    #[test]
    fn test_newest_first_puts_unstarted_builds_last() {
        let records = vec![
            create_test_record("queued", None, 0, 0, 0),
            create_test_record("1.0", Some(1), 1, 0, 1),
            create_test_record("1.1", Some(2), 1, 0, 1),
        ];

        let sorted: Vec<_> = newest_first(&records).iter().map(|r| r.build.as_str()).collect();

        assert_eq!(sorted, vec!["1.1", "1.0", "queued"]);
    }

    #[test]
    fn test_render_pipelines_lists_configuration() {
        let config: Config = serde_yaml::from_str(
            r"
organization: contoso
projects:
  Web:
    project: web
    pipelines:
      CI: 12
      Nightly: 13
    default_pipeline: Nightly
build_filters:
  Releases: release_
max_builds_option: [10, 25]
",
        )
        .unwrap();

        let output = render_pipelines(&config);

        assert!(output.contains("contoso/web"));
        assert!(output.contains("CI"));
        assert!(output.contains("(default)"));
        assert!(output.contains("release_"));
        assert!(output.contains("Last 10 builds, Last 25 builds"));
    }
}

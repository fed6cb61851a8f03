mod exports;
mod progress;
mod styling;
mod summary;
mod tables;

pub use exports::{export_report, OutputFormat};
pub use progress::RenderProgress;
pub use styling::{bright_green, bright_red, dim, magenta_bold};
pub use summary::{print_pipelines, render_report};

/// Prints the `testlens` banner to stderr.
///
/// Displays the tool name, version, and description at the start of execution.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("🧪 testlens"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("Azure Pipelines Test Results")
    );
}

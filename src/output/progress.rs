use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::styling::{bright_green, bright_yellow};

/// Spinner shown on stderr while a render cycle fetches data.
pub struct RenderProgress {
    pb: ProgressBar,
}

impl RenderProgress {
    pub fn start(project: &str, pipelines: usize) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_draw_target(ProgressDrawTarget::stderr());
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("  {msg} {spinner}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(
            bright_yellow(format!(
                "Fetching test results for {pipelines} pipelines of {project}"
            ))
            .to_string(),
        );
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        Self { pb }
    }

    pub fn finish(self, builds: usize) {
        self.pb.finish_with_message(
            bright_green(format!("Aggregated test results of {builds} builds ✓")).to_string(),
        );
        eprintln!();
    }
}

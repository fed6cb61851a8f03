use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{Interval, MissedTickBehavior};

use crate::config::Config;
use crate::output::{
    bright_green, bright_red, dim, export_report, print_pipelines, OutputFormat, RenderProgress,
};
use crate::providers::{resolve_filter, AzureProvider, BuildSource};

#[derive(Parser)]
#[command(name = "testlens")]
#[command(author, version, about = "Azure Pipelines test results dashboard", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./testlens.yaml, ./config.yml, ...)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Summary)]
    format: OutputFormat,

    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the test results of every pipeline once
    Report(RenderArgs),

    /// Re-render on the refresh interval and flag pipelines with newer runs
    Watch(RenderArgs),

    /// List configured projects, pipelines and build filters
    Pipelines,
}

#[derive(Args)]
struct RenderArgs {
    /// Personal access token (overrides the config `pat` and AZURE_PAT)
    #[arg(short, long)]
    token: Option<String>,

    /// Project display name (defaults to the first configured project)
    #[arg(short = 'P', long)]
    project: Option<String>,

    /// Maximum number of builds per pipeline
    #[arg(short = 'n', long)]
    max_builds: Option<u32>,

    /// Named build filter ("None" disables filtering)
    #[arg(short = 'F', long)]
    filter: Option<String>,
}

/// A fully resolved render request.
struct RenderPlan<'a> {
    project: &'a str,
    pipelines: usize,
    max_builds: Option<u32>,
    filter: Option<&'a str>,
}

enum WatchCommand {
    ClearCache,
    Refresh,
    Quit,
    Unknown,
}

impl WatchCommand {
    fn parse(line: &str) -> Self {
        match line.trim() {
            "c" | "clear" => Self::ClearCache,
            "r" | "refresh" | "" => Self::Refresh,
            "q" | "quit" => Self::Quit,
            _ => Self::Unknown,
        }
    }
}

impl Cli {
    fn load_config(&self) -> Result<Config> {
        let config = Config::load(self.config.as_deref())?;
        config.validate()?;
        Ok(config)
    }

    fn provider_and_plan<'a>(
        config: &'a Config,
        args: &'a RenderArgs,
    ) -> Result<(AzureProvider, RenderPlan<'a>)> {
        let (name, project) = config.project(args.project.as_deref())?;
        let token = config.token(args.token.as_deref())?;
        let max_builds = config.resolve_max_builds(args.max_builds)?;
        let filter = resolve_filter(&config.build_filters, args.filter.as_deref())?;

        let provider = AzureProvider::from_config(config, project, &token)
            .with_context(|| format!("Failed to create Azure client for project '{name}'"))?;

        let plan = RenderPlan {
            project: name,
            pipelines: project.pipelines.len(),
            max_builds,
            filter,
        };
        Ok((provider, plan))
    }

    async fn render<S: BuildSource + 'static>(
        &self,
        provider: &AzureProvider<S>,
        plan: &RenderPlan<'_>,
    ) -> Result<()> {
        let progress = RenderProgress::start(plan.project, plan.pipelines);
        let report = provider.collect_report(plan.max_builds, plan.filter).await;
        progress.finish(report.total_builds());

        let stale = report.stale_pipelines().count();
        if stale > 0 {
            warn!("{stale} pipelines have newer runs than the cached data");
        }

        if let Some(output_path) = &self.output {
            let mut file = std::fs::File::create(output_path)
                .with_context(|| format!("Failed to create {}", output_path.display()))?;
            export_report(&report, self.format, self.pretty, &mut file)?;
            info!("Report written to: {}", output_path.display());
        } else {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            export_report(&report, self.format, self.pretty, &mut handle)?;
            handle.flush()?;
        }

        Ok(())
    }

    async fn execute_report(&self, args: &RenderArgs) -> Result<()> {
        let config = self.load_config()?;
        let (provider, plan) = Self::provider_and_plan(&config, args)?;

        info!("Collecting Azure test results for project: {}", plan.project);
        self.render(&provider, &plan).await
    }

    async fn execute_watch(&self, args: &RenderArgs) -> Result<()> {
        let config = self.load_config()?;
        let (provider, plan) = Self::provider_and_plan(&config, args)?;

        let refresh = config.refresh_interval();
        let detector = provider.staleness_detector().spawn(refresh);
        let mut ticker = refresh.map(refresh_ticker);

        eprintln!(
            "{}",
            dim("Commands: [c] clear cache, [r] refresh, [q] quit (Ctrl-C also quits)")
        );
        if ticker.is_none() {
            self.render(&provider, &plan).await?;
        }

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdin_open = true;

        let result = loop {
            tokio::select! {
                _ = next_tick(ticker.as_mut()) => {
                    if let Err(e) = self.render(&provider, &plan).await {
                        break Err(e);
                    }
                }
                line = lines.next_line(), if stdin_open => {
                    let line = match line {
                        Ok(Some(line)) => line,
                        Ok(None) => {
                            stdin_open = false;
                            continue;
                        }
                        Err(e) => break Err(e).context("Failed to read from stdin"),
                    };
                    match WatchCommand::parse(&line) {
                        WatchCommand::ClearCache => {
                            provider.clear_cache();
                            eprintln!("{}", bright_green("Cache cleared ✓"));
                        }
                        WatchCommand::Refresh => {}
                        WatchCommand::Quit => break Ok(()),
                        WatchCommand::Unknown => {
                            eprintln!("{}", bright_red(format!("Unknown command: {}", line.trim())));
                            continue;
                        }
                    }
                    if let Err(e) = self.render(&provider, &plan).await {
                        break Err(e);
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, stopping watch");
                    break Ok(());
                }
            }
        };

        if let Some(handle) = detector {
            handle.abort();
        }

        result
    }

    fn execute_pipelines(&self) -> Result<()> {
        let config = self.load_config()?;
        print_pipelines(&config);
        Ok(())
    }

    pub async fn execute(&self) -> Result<()> {
        match &self.command {
            Commands::Report(args) => self.execute_report(args).await,
            Commands::Watch(args) => self.execute_watch(args).await,
            Commands::Pipelines => self.execute_pipelines(),
        }
    }
}

fn refresh_ticker(period: Duration) -> Interval {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Waits for the next refresh, or forever when auto refresh is off.
async fn next_tick(ticker: Option<&mut Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

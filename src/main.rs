mod burndown;
mod cli;
mod config;
mod error;
mod model;
mod providers;
mod sync;
mod timelog;
mod util;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use burndown::Granularity;
use config::{AppConfig, Overrides};
use providers::gitlab::GitLabClient;
use providers::{StateFilter, Tracker};

#[derive(Parser)]
#[command(
    name = "issue-sync",
    about = "Keep GitLab issues in line with a spreadsheet, log time and chart burn-down",
    version,
    propagate_version = true
)]
struct Cli {
    /// GitLab base URL (overrides [gitlab].url)
    #[arg(long, global = true)]
    url: Option<String>,

    /// Personal access token
    #[arg(long, global = true, env = "GITLAB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Project id or full path, e.g. "group/project"
    #[arg(long, global = true)]
    project: Option<String>,

    /// Group that owns epics, milestones and iterations
    #[arg(long, global = true)]
    group: Option<String>,

    /// Debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export issues to CSV
    Pull {
        #[arg(long, short = 'o', default_value = "open_issues.csv")]
        output: PathBuf,

        /// opened, closed or all
        #[arg(long, default_value = "opened")]
        state: StateFilter,
    },

    /// Apply a CSV sheet to the tracker
    Update {
        #[arg(long, short = 'i')]
        input: PathBuf,

        /// Print the planned changes without sending them
        #[arg(long)]
        dry_run: bool,
    },

    /// Close open issues the sheet no longer lists
    Close {
        #[arg(long, short = 'i')]
        input: PathBuf,

        /// Confirmation token, asked for interactively when omitted
        #[arg(long)]
        confirm: Option<String>,
    },

    /// Log today's hours on in-progress issues
    LogTime {
        /// Share per assignee, e.g. "alice: 0.5, bob: 100%"
        #[arg(long, short = 'a')]
        allocation: String,

        /// Hours in a working day (overrides [time].base_daily_hours)
        #[arg(long)]
        hours: Option<f64>,

        /// Labels that mark an issue as in progress
        #[arg(long, value_delimiter = ',')]
        labels: Option<Vec<String>>,

        #[arg(long)]
        dry_run: bool,
    },

    /// Created, completed and open issue counts over time
    Burndown {
        /// daily or monthly
        #[arg(long, short = 'g', default_value = "daily")]
        granularity: Granularity,

        /// Write the series to this CSV file
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Read created_at/closed_at from a CSV instead of the tracker
        #[arg(long, short = 'i')]
        input: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = config::load_config()?;
    let overrides = Overrides {
        url: cli.url,
        token: cli.token,
        project_id: cli.project,
        group_id: cli.group,
    };

    match cli.command {
        Commands::Pull { output, state } => {
            let tracker = connect(&config, &overrides).await?;
            cli::handle_pull(&tracker, &output, state).await
        }
        Commands::Update { input, dry_run } => {
            let tracker = connect(&config, &overrides).await?;
            cli::handle_update(&tracker, &input, dry_run).await
        }
        Commands::Close { input, confirm } => {
            let tracker = connect(&config, &overrides).await?;
            cli::handle_close(&tracker, &input, confirm).await
        }
        Commands::LogTime {
            allocation,
            hours,
            labels,
            dry_run,
        } => {
            let time = config.time();
            let hours = hours.unwrap_or(time.base_daily_hours);
            let labels = labels.unwrap_or(time.status_labels);
            let tracker = connect(&config, &overrides).await?;
            cli::handle_log_time(&tracker, &allocation, hours, &labels, dry_run).await
        }
        Commands::Burndown {
            granularity,
            output,
            input,
        } => {
            let records = match input {
                Some(path) => {
                    let file = std::fs::File::open(&path)
                        .with_context(|| format!("Failed to open {}", path.display()))?;
                    util::table::read_burndown_records(file)?
                }
                None => {
                    let tracker = connect(&config, &overrides).await?;
                    cli::fetch_burndown_records(&tracker).await?
                }
            };
            cli::handle_burndown(&records, granularity, output.as_deref()).map(|_| ())
        }
    }
}

/// Builds the client and makes sure the project selector resolves before
/// any command touches it.
async fn connect(config: &AppConfig, overrides: &Overrides) -> Result<GitLabClient> {
    let tracker_config = config.tracker_config(overrides)?;
    let client = GitLabClient::new(&tracker_config);
    let project = client
        .check_project()
        .await
        .with_context(|| format!("Cannot access project '{}'", tracker_config.project_id))?;
    info!(tracker = client.name(), %project, "connected");
    Ok(client)
}

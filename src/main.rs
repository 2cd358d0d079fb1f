use anyhow::Context;
use changelog_gen::{Config, Pipeline};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    name = "changelog-gen",
    version,
    author,
    about = "Generate CHANGELOG.md from git history with LLM-extracted entries",
    long_about = "Generate and maintain Keep a Changelog documents from exported git history.\n\n\
    This tool reads a commit log with diffs, submits size-bounded batches to a \
    chat-completion service, de-duplicates the extracted entries, and merges them \
    idempotently into CHANGELOG.md. Re-runs skip commits already recorded in the \
    document's processed-commit markers.\n\n\
    USAGE EXAMPLES:\n  \
      # Update CHANGELOG.md from the default commit export\n  \
      changelog-gen\n\n  \
      # Backfill a changelog from scratch with release dates\n  \
      changelog-gen --commit-log history.txt --tag-dates \"$(git tag -l --format='%(refname:short): %(creatordate:short)')\"\n\n  \
      # Release run: turn unreleased changes into a version section\n  \
      changelog-gen --current-version v0.7.0 --last-tag v0.6.2\n\n  \
      # Inspect batching without calling the API\n  \
      changelog-gen --dry-run"
)]
struct Cli {
    /// Path to the exported commit log with diffs
    #[arg(long, default_value = "commits_with_diffs.txt", value_name = "PATH")]
    commit_log: PathBuf,

    /// Path to the changelog document to update or create
    #[arg(long, default_value = "CHANGELOG.md", value_name = "PATH")]
    changelog: PathBuf,

    /// Current version label (a tag name on release runs)
    #[arg(long, env = "VERSION", default_value = "", value_name = "TAG")]
    current_version: String,

    /// Previous release tag
    #[arg(long, env = "LAST_TAG", default_value = "", value_name = "TAG")]
    last_tag: String,

    /// Branch the run operates on (informational)
    #[arg(long, env = "BRANCH", default_value = "", value_name = "NAME")]
    branch: String,

    /// Whether the working tree was dirty when history was exported
    #[arg(long, env = "IS_DIRTY")]
    dirty: bool,

    /// Run date (YYYY-MM-DD); defaults to today
    #[arg(long, env = "DATE", default_value = "", value_name = "DATE")]
    date: String,

    /// Tag release-date table, one "vX.Y.Z: YYYY-MM-DD" line per tag
    #[arg(long, env = "TAG_DATES", default_value = "", value_name = "TABLE")]
    tag_dates: String,

    /// Bearer token for the completion service
    #[arg(long, env = "GITHUB_TOKEN", default_value = "", hide_env_values = true)]
    token: String,

    /// Chat-completion endpoint URL
    #[arg(
        long,
        default_value = "https://models.inference.ai.azure.com/chat/completions",
        value_name = "URL"
    )]
    api_url: String,

    /// Model identifier sent with each request
    #[arg(long, default_value = "gpt-4o-mini", value_name = "MODEL")]
    model: String,

    /// Character ceiling per commit batch (~4 chars per token)
    #[arg(long, default_value_t = 20_000)]
    max_batch_chars: usize,

    /// Retry ceiling for rate-limited requests
    #[arg(long, default_value_t = 5)]
    max_retries: usize,

    /// Dry run (no API calls, no changelog write)
    #[arg(long)]
    dry_run: bool,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_tracing(cli.verbose)?;

    let config = Config::builder()
        .commit_log(cli.commit_log)
        .changelog(cli.changelog)
        .version(cli.current_version)
        .last_tag(cli.last_tag)
        .branch(cli.branch)
        .dirty(cli.dirty)
        .date(cli.date)
        .tag_dates(cli.tag_dates)
        .api_url(cli.api_url)
        .api_token(cli.token)
        .model(cli.model)
        .max_batch_chars(cli.max_batch_chars)
        .max_retries(cli.max_retries)
        .dry_run(cli.dry_run)
        .build()
        .context("Failed to build configuration")?;

    let stats = Pipeline::new(config)
        .context("Failed to create pipeline")?
        .run()
        .context("Changelog generation failed")?;

    stats.print_summary();

    Ok(())
}

fn setup_tracing(verbosity: u8) -> anyhow::Result<()> {
    let filter = match verbosity {
        0 => EnvFilter::new("changelog_gen=info"),
        1 => EnvFilter::new("changelog_gen=debug"),
        _ => EnvFilter::new("changelog_gen=trace"),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_thread_ids(false))
        .init();

    Ok(())
}

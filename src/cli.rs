//! Command-line interface

use clap::{Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::auth;
use crate::client::GmailMailboxClient;
use crate::config::Config;
use crate::error::Result;
use crate::mirror::Mirror;
use crate::rules::{Action, RuleSet};
use crate::runner::{self, RunReport, REPORT_DATE_FORMAT};

#[derive(Parser, Debug)]
#[command(name = "gmail-rules")]
#[command(version = "0.1.0")]
#[command(about = "Mirror a Gmail mailbox locally and apply declarative rules to it", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Path to OAuth2 credentials file
    #[arg(long, default_value = "credentials.json")]
    pub credentials: PathBuf,

    /// Path to token cache file
    #[arg(long, default_value = ".gmail-rules/token.json")]
    pub token_cache: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Authenticate with Gmail API
    Auth {
        /// Force re-authentication even if token exists
        #[arg(long)]
        force: bool,
    },

    /// Pull new messages into the local mirror
    Sync {
        /// Re-request every message instead of only those after the watermark
        #[arg(long)]
        full: bool,
    },

    /// Run a ruleset against the mirror and apply its actions to Gmail
    Apply {
        /// Ruleset JSON file
        #[arg(short, long)]
        rules: PathBuf,

        /// Don't sync before evaluating rules
        #[arg(long)]
        skip_sync: bool,

        /// Dry run mode (report planned actions, change nothing)
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate a ruleset without running it
    Check {
        /// Ruleset JSON file
        #[arg(short, long)]
        rules: PathBuf,
    },

    /// Show what the mirror currently holds
    Status,

    /// Generate example configuration file
    InitConfig {
        /// Path to create config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

/// Progress reporter using indicatif
pub struct ProgressReporter {
    multi: MultiProgress,
    spinner_style: ProgressStyle,
    bar_style: ProgressStyle,
}

impl ProgressReporter {
    /// Share an existing MultiProgress, e.g. the one log output is routed through
    pub fn with_multi_progress(multi: MultiProgress) -> Self {
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed:>6}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

        let bar_style = ProgressStyle::default_bar()
            .template("[{elapsed:>6}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");

        Self {
            multi,
            spinner_style,
            bar_style,
        }
    }

    pub fn add_spinner(&self, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(self.spinner_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Bar whose length is unknown until the remote listing returns
    pub fn add_progress_bar(&self, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new(0));
        pb.set_style(self.bar_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Finish a spinner and clear it from the multi-progress display
    pub fn finish_spinner(&self, pb: &ProgressBar, msg: &str) {
        pb.finish_and_clear();
        let _ = self.multi.println(format!("  ✓ {}", msg));
    }
}

async fn connect(cli: &Cli, reporter: &ProgressReporter) -> Result<GmailMailboxClient> {
    let spinner = reporter.add_spinner("Authenticating with Gmail API...");
    let hub = auth::initialize_gmail_hub(&cli.credentials, &cli.token_cache).await?;
    reporter.finish_spinner(&spinner, "Gmail API authenticated");
    Ok(GmailMailboxClient::new(hub))
}

async fn sync_with_progress(
    client: &GmailMailboxClient,
    mirror: &mut Mirror,
    config: &Config,
    incremental: bool,
    reporter: &ProgressReporter,
) -> Result<usize> {
    let bar = reporter.add_progress_bar("Fetching messages");
    let tick = bar.clone();
    let merged = runner::run_sync(
        client,
        mirror,
        incremental,
        config.sync.max_concurrent_fetches,
        Some(Arc::new(move || {
            tick.inc_length(1);
            tick.inc(1);
        })),
    )
    .await;
    bar.finish_and_clear();
    merged
}

/// `sync` command: returns the number of messages merged
pub async fn run_sync_command(cli: &Cli, full: bool, multi: MultiProgress) -> Result<usize> {
    let reporter = ProgressReporter::with_multi_progress(multi);
    let config = Config::load(&cli.config).await?;
    let mut mirror = config.mirror.open()?;
    let client = connect(cli, &reporter).await?;

    sync_with_progress(&client, &mut mirror, &config, !full, &reporter).await
}

/// `apply` command: optional sync, then the ruleset run
pub async fn run_apply_command(
    cli: &Cli,
    rules: &Path,
    skip_sync: bool,
    dry_run: bool,
    multi: MultiProgress,
) -> Result<RunReport> {
    let reporter = ProgressReporter::with_multi_progress(multi);
    let config = Config::load(&cli.config).await?;
    let dry_run = dry_run || config.execution.dry_run;

    // Validate before touching the network
    let ruleset = RuleSet::load(rules).await?;

    let mut mirror = config.mirror.open()?;
    let client = connect(cli, &reporter).await?;

    if !skip_sync {
        let merged = sync_with_progress(&client, &mut mirror, &config, true, &reporter).await?;
        info!("Incremental sync merged {} messages", merged);
    }

    let spinner = reporter.add_spinner(&format!("Applying {} rules...", ruleset.rules.len()));
    let report = runner::run_ruleset(&client, &mut mirror, &ruleset, dry_run).await?;
    reporter.finish_spinner(&spinner, &report.summary());

    Ok(report)
}

/// Render a run report: failures first, then successes (or the plan)
pub fn format_report(report: &RunReport) -> String {
    let mut out = String::new();
    out.push_str("\n========================================\n");
    if report.dry_run {
        out.push_str("Ruleset Run (DRY RUN)\n");
    } else {
        out.push_str("Ruleset Run\n");
    }
    out.push_str("========================================\n");
    out.push_str(&format!("Run ID: {}\n", report.run_id));
    out.push_str(&format!(
        "Duration: {} ms\n",
        (report.completed_at - report.started_at).num_milliseconds()
    ));

    if report.dry_run {
        out.push_str(&format!("\nPlanned actions ({}):\n", report.planned.len()));
        for record in &report.planned {
            out.push_str(&format!("  [{}] {}\n", record.rule, record.line()));
        }
    } else {
        out.push_str(&format!("\nFailed actions ({}):\n", report.failed.len()));
        for failed in &report.failed {
            out.push_str(&format!("  [{}] {}\n", failed.record.rule, failed.line()));
        }
        out.push_str(&format!("\nSucceeded actions ({}):\n", report.succeeded.len()));
        for record in &report.succeeded {
            out.push_str(&format!("  [{}] {}\n", record.rule, record.line()));
        }
    }
    out.push_str("========================================");
    out
}

/// One line per rule: name, operator, predicate count and actions
pub fn format_ruleset(ruleset: &RuleSet) -> String {
    let mut out = format!("{} rules\n", ruleset.rules.len());
    for rule in &ruleset.rules {
        let actions: Vec<String> = rule.actions.iter().map(Action::to_string).collect();
        out.push_str(&format!(
            "  - {}: {} of {} conditions -> {}\n",
            rule.name,
            rule.condition.operator,
            rule.condition.predicates.len(),
            actions.join(", ")
        ));
        for predicate in &rule.condition.predicates {
            out.push_str(&format!("      {}\n", predicate));
        }
    }
    out
}

/// Mirror summary for the `status` command
pub fn format_status(mirror: &Mirror) -> Result<String> {
    let mut out = String::new();
    out.push_str("\n========================================\n");
    out.push_str("Mirror Status\n");
    out.push_str("========================================\n");
    out.push_str(&format!("Messages: {}\n", mirror.count()?));
    out.push_str(&format!("Unread: {}\n", mirror.unread_count()?));
    match mirror.latest_timestamp()? {
        Some(at) => out.push_str(&format!("Watermark: {}\n", at.format(REPORT_DATE_FORMAT))),
        None => out.push_str("Watermark: none (mirror is empty)\n"),
    }
    for (mailbox, count) in mirror.mailbox_counts()? {
        out.push_str(&format!("  {:<6} {}\n", mailbox.label(), count));
    }
    out.push_str("========================================");
    Ok(out)
}

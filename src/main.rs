use anyhow::Result;
use clap::Parser;
use gmail_rules::cli::{self, Cli, Commands};
use gmail_rules::config::Config;
use gmail_rules::error::GmailError;
use gmail_rules::rules::RuleSet;
use indicatif::MultiProgress;
use std::io::Write;
use std::process;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Buffers one log event and prints it above any active progress bars
#[derive(Clone)]
struct ProgressAwareWriter {
    multi: Arc<MultiProgress>,
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl Write for ProgressAwareWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.extend_from_slice(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let Ok(mut buffer) = self.buffer.lock() else {
            return Ok(());
        };
        if !buffer.is_empty() {
            let line = String::from_utf8_lossy(&buffer);
            let line = line.trim_end_matches('\n');
            if !line.is_empty() {
                let _ = self.multi.println(line);
            }
            buffer.clear();
        }
        Ok(())
    }
}

impl Drop for ProgressAwareWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

#[derive(Clone)]
struct ProgressAwareMakeWriter {
    multi: Arc<MultiProgress>,
}

impl<'a> MakeWriter<'a> for ProgressAwareMakeWriter {
    type Writer = ProgressAwareWriter;

    fn make_writer(&'a self) -> Self::Writer {
        ProgressAwareWriter {
            multi: Arc::clone(&self.multi),
            buffer: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        if let Some(hint) = e.downcast_ref::<GmailError>().and_then(hint_for) {
            eprintln!("\nHint: {}", hint);
        }
        eprintln!("\nFor help, run: gmail-rules --help");
        process::exit(1);
    }
}

fn hint_for(error: &GmailError) -> Option<&'static str> {
    match error {
        GmailError::AuthError(_) => Some(
            "download OAuth client credentials from the Google Cloud console and run `gmail-rules auth`",
        ),
        GmailError::InvalidRuleset(_) | GmailError::RulesetParse(_) => {
            Some("run `gmail-rules check --rules <file>` to validate a ruleset")
        }
        GmailError::MirrorDiverged { .. } => {
            Some("the mirror is behind Gmail; run `gmail-rules sync --full` to rebuild it")
        }
        GmailError::RateLimitExceeded { .. } => Some("wait a moment and run the command again"),
        _ => None,
    }
}

async fn run() -> Result<()> {
    // aws-lc-rs everywhere except Windows, where ring avoids the NASM/CMake toolchain
    #[cfg(not(windows))]
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    #[cfg(windows)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let default_directive = if cli.verbose {
        "gmail_rules=debug,warn"
    } else {
        "gmail_rules=info,warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let multi_progress = Arc::new(MultiProgress::new());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(ProgressAwareMakeWriter {
            multi: Arc::clone(&multi_progress),
        })
        .with_target(false)
        .init();

    match &cli.command {
        Commands::Auth { force } => {
            if *force && cli.token_cache.exists() {
                tokio::fs::remove_file(&cli.token_cache).await?;
                tracing::info!("Removed existing token cache");
            }

            let hub =
                gmail_rules::auth::initialize_gmail_hub(&cli.credentials, &cli.token_cache).await?;
            println!("Successfully authenticated with Gmail API");
            println!("Token cached at: {:?}", cli.token_cache);

            let (_, profile) = hub
                .users()
                .get_profile("me")
                .add_scope(gmail_rules::auth::REQUIRED_SCOPES[0])
                .doit()
                .await
                .map_err(GmailError::from)?;
            println!(
                "Connected to account: {}",
                profile.email_address.unwrap_or_default()
            );
            Ok(())
        }

        Commands::Sync { full } => {
            let merged = cli::run_sync_command(&cli, *full, (*multi_progress).clone()).await?;
            println!("Synced {} messages", merged);
            Ok(())
        }

        Commands::Apply {
            rules,
            skip_sync,
            dry_run,
        } => {
            if *dry_run {
                println!("Running in DRY RUN mode - no changes will be made");
            }
            let report = cli::run_apply_command(
                &cli,
                rules,
                *skip_sync,
                *dry_run,
                (*multi_progress).clone(),
            )
            .await?;
            println!("{}", cli::format_report(&report));
            Ok(())
        }

        Commands::Check { rules } => {
            let ruleset = RuleSet::load(rules).await?;
            println!("{} is valid", rules.display());
            print!("{}", cli::format_ruleset(&ruleset));
            Ok(())
        }

        Commands::Status => {
            let config = Config::load(&cli.config).await?;
            let mirror = config.mirror.open()?;
            println!("{}", cli::format_status(&mirror)?);
            Ok(())
        }

        Commands::InitConfig { output, force } => {
            if output.exists() && !*force {
                return Err(GmailError::ConfigError(format!(
                    "Configuration file already exists at {:?}. Use --force to overwrite.",
                    output
                ))
                .into());
            }

            Config::create_example(output).await?;
            println!("Created example configuration file at: {:?}", output);
            println!("\nKey settings to review:");
            println!("  - mirror.path: where the local mirror lives (\":memory:\" for none)");
            println!("  - sync.max_concurrent_fetches: parallel message downloads (1-50)");
            println!("  - execution.dry_run: report planned actions without applying them");
            Ok(())
        }
    }
}

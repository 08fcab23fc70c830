//! Gmail Rules
//!
//! Mirrors a Gmail mailbox into a local SQLite store and applies declarative
//! rules ("if the subject contains X and the sender is Y, move to Z") to it.
//!
//! # Overview
//!
//! - **Sync**: incremental or full pull of messages into the mirror, keyed by
//!   Gmail message id and bounded by a derived date watermark
//! - **Rules**: JSON rulesets of typed predicates joined by ANY/ALL, validated
//!   in full at load time
//! - **Actions**: mark read, mark unread, or move between mailboxes, applied
//!   to Gmail first and to the mirror only once Gmail confirms
//!
//! # Example Usage
//!
//! ```no_run
//! use gmail_rules::{auth, client::GmailMailboxClient, config::Config, rules::RuleSet, runner};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml".as_ref()).await?;
//!     let mut mirror = config.mirror.open()?;
//!
//!     let hub = auth::initialize_gmail_hub(
//!         "credentials.json".as_ref(),
//!         ".gmail-rules/token.json".as_ref(),
//!     ).await?;
//!     let client = GmailMailboxClient::new(hub);
//!
//!     runner::run_sync(&client, &mut mirror, true, config.sync.max_concurrent_fetches, None).await?;
//!
//!     let ruleset = RuleSet::load("rules.json".as_ref()).await?;
//!     let report = runner::run_ruleset(&client, &mut mirror, &ruleset, false).await?;
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`auth`] - OAuth2 authentication and Gmail API initialization
//! - [`client`] - Remote mailbox trait and its Gmail implementation
//! - [`cli`] - Command-line interface and report rendering
//! - [`config`] - Configuration management
//! - [`error`] - Error types and result aliases
//! - [`executor`] - Applies a single action to a single message
//! - [`mime`] - Raw RFC 822 decoding into message records
//! - [`mirror`] - SQLite mirror of message metadata
//! - [`models`] - Message records and mailbox transitions
//! - [`predicate`] - Typed field predicates and date literals
//! - [`rules`] - Rules, rulesets and the ruleset loader
//! - [`runner`] - Sync and ruleset orchestration
//! - [`sync`] - Incremental and full mirror reconciliation

pub mod auth;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod mime;
pub mod mirror;
pub mod models;
pub mod predicate;
pub mod rules;
pub mod runner;
pub mod sync;

// Re-export commonly used types for convenience
pub use error::{ActionFailure, GmailError, Result, RuleViolation};

// Core data models
pub use models::{EmailRecord, Mailbox, RawMessage};

// Rules
pub use predicate::Predicate;
pub use rules::{Action, Condition, MatchOperator, Rule, RuleSet};

// Config types
pub use config::{Config, ExecutionConfig, MirrorConfig, SyncConfig};

// Mailbox access and storage
pub use client::{GmailMailboxClient, MailboxClient};
pub use mirror::{MatchedEmail, Mirror};

// Execution
pub use executor::{ActionExecutor, ActionOutcome};
pub use runner::{run_ruleset, run_ruleset_file, run_sync, ActionRecord, FailedAction, RunReport};
pub use sync::{SyncOutcome, SyncReconciler};

// CLI types (for binary usage)
pub use cli::{Cli, Commands, ProgressReporter};

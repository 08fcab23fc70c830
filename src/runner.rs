//! Orchestration of sync and ruleset runs, plus their reports

use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

use crate::client::MailboxClient;
use crate::error::{ActionFailure, Result};
use crate::executor::{ActionExecutor, ActionOutcome};
use crate::mirror::{MatchedEmail, Mirror};
use crate::rules::{Action, RuleSet};
use crate::sync::{ProgressCallback, SyncReconciler};

/// Date format used in report lines
pub const REPORT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// One action for one message, attributed to the rule that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRecord {
    pub rule: String,
    pub email: MatchedEmail,
    pub action: Action,
}

impl ActionRecord {
    /// `id  sender  date  action`
    pub fn line(&self) -> String {
        format!(
            "{}  {}  {}  {}",
            self.email.id,
            self.email.from_email,
            self.email.date.format(REPORT_DATE_FORMAT),
            self.action
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FailedAction {
    pub record: ActionRecord,
    pub reason: ActionFailure,
}

impl FailedAction {
    pub fn line(&self) -> String {
        format!("{}  ({})", self.record.line(), self.reason)
    }
}

/// Aggregate result of one ruleset run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub dry_run: bool,
    pub succeeded: Vec<ActionRecord>,
    pub failed: Vec<FailedAction>,
    /// Populated instead of `succeeded`/`failed` in dry run mode
    pub planned: Vec<ActionRecord>,
}

impl RunReport {
    fn new(dry_run: bool) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4().to_string(),
            started_at: now,
            completed_at: now,
            dry_run,
            succeeded: Vec::new(),
            failed: Vec::new(),
            planned: Vec::new(),
        }
    }

    /// Succeeded actions for a single rule, in run order
    pub fn succeeded_for<'r>(&'r self, rule: &'r str) -> impl Iterator<Item = &'r ActionRecord> {
        self.succeeded.iter().filter(move |r| r.rule == rule)
    }

    pub fn summary(&self) -> String {
        if self.dry_run {
            format!("{} actions planned (dry run)", self.planned.len())
        } else {
            format!(
                "{} actions succeeded, {} failed",
                self.succeeded.len(),
                self.failed.len()
            )
        }
    }
}

/// Bring the mirror up to date with the remote mailbox.
///
/// Returns the number of messages merged.
pub async fn run_sync(
    client: &dyn MailboxClient,
    mirror: &mut Mirror,
    incremental: bool,
    max_concurrent_fetches: usize,
    on_progress: Option<ProgressCallback>,
) -> Result<usize> {
    let mut reconciler = SyncReconciler::new(client, max_concurrent_fetches);
    if let Some(callback) = on_progress {
        reconciler = reconciler.with_progress(callback);
    }
    let outcome = reconciler.sync(mirror, incremental).await?;
    Ok(outcome.merged)
}

/// Evaluate every rule against the mirror and apply its actions.
///
/// Rules run in declaration order; each rule's matches are computed before any
/// of its actions run, and every action is applied to every match in order.
/// Per-action failures are collected. Only a mirror failure aborts the run.
pub async fn run_ruleset(
    client: &dyn MailboxClient,
    mirror: &mut Mirror,
    ruleset: &RuleSet,
    dry_run: bool,
) -> Result<RunReport> {
    let mut report = RunReport::new(dry_run);
    info!(
        "Starting ruleset run {} ({} rules{})",
        report.run_id,
        ruleset.rules.len(),
        if dry_run { ", dry run" } else { "" }
    );

    for rule in &ruleset.rules {
        let matches = mirror.find_matching(&rule.condition)?;
        info!("Rule '{}' matched {} emails", rule.name, matches.len());

        for email in matches {
            for action in &rule.actions {
                let record = ActionRecord {
                    rule: rule.name.clone(),
                    email: email.clone(),
                    action: *action,
                };

                if dry_run {
                    report.planned.push(record);
                    continue;
                }

                let outcome = ActionExecutor::new(client, mirror)
                    .apply(&email.id, *action)
                    .await?;
                match outcome {
                    ActionOutcome::Applied | ActionOutcome::Unchanged => {
                        report.succeeded.push(record)
                    }
                    ActionOutcome::Failed(reason) => {
                        warn!("{} on {} failed: {}", action, email.id, reason);
                        report.failed.push(FailedAction { record, reason });
                    }
                }
            }
        }
    }

    report.completed_at = Utc::now();
    info!("Ruleset run {} finished: {}", report.run_id, report.summary());
    Ok(report)
}

/// Load the ruleset at `path` and run it
pub async fn run_ruleset_file(
    client: &dyn MailboxClient,
    mirror: &mut Mirror,
    path: &Path,
    dry_run: bool,
) -> Result<RunReport> {
    let ruleset = RuleSet::load(path).await?;
    run_ruleset(client, mirror, &ruleset, dry_run).await
}

//! Rule and ruleset model
//!
//! Rulesets are JSON documents:
//!
//! ```json
//! {
//!   "rules": [
//!     {
//!       "name": "Spam from the billing robot",
//!       "conditions": {
//!         "operator": "ALL",
//!         "rules": [
//!           {"field": "from_email", "predicate": "Equals", "value": "robot@example.net"},
//!           {"field": "date", "predicate": "LessThan", "value": "30d"}
//!         ]
//!       },
//!       "actions": [{"type": "move_message", "folder": "SPAM"}]
//!     }
//!   ]
//! }
//! ```
//!
//! Loading is two-pass: serde parses the untyped document, then every rule is
//! validated into the typed model. All violations are collected and reported
//! together, and no partial ruleset is ever returned.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fmt;
use std::path::Path;

use crate::error::{GmailError, Result, RuleViolation};
use crate::models::Mailbox;
use crate::predicate::{Predicate, SqlFilter};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RulesetDocument {
    rules: Vec<RuleDocument>,
}

#[derive(Debug, Deserialize)]
struct RuleDocument {
    name: String,
    conditions: ConditionDocument,
    actions: Vec<ActionDocument>,
}

#[derive(Debug, Deserialize)]
struct ConditionDocument {
    operator: MatchOperator,
    rules: Vec<PredicateDocument>,
}

#[derive(Debug, Deserialize)]
struct PredicateDocument {
    field: String,
    predicate: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct ActionDocument {
    #[serde(rename = "type")]
    kind: ActionKind,
    #[serde(default)]
    folder: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ActionKind {
    MarkAsRead,
    MarkAsUnread,
    MoveMessage,
}

/// How a rule's predicates combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum MatchOperator {
    #[serde(rename = "ANY")]
    Any,
    #[serde(rename = "ALL")]
    All,
}

impl fmt::Display for MatchOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchOperator::Any => f.write_str("ANY"),
            MatchOperator::All => f.write_str("ALL"),
        }
    }
}

/// Predicates joined by a single operator.
///
/// With no predicates, `All` matches every message and `Any` matches none.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub operator: MatchOperator,
    pub predicates: Vec<Predicate>,
}

impl Condition {
    pub fn matches(&self, record: &crate::models::EmailRecord) -> bool {
        match self.operator {
            MatchOperator::All => self.predicates.iter().all(|p| p.matches(record)),
            MatchOperator::Any => self.predicates.iter().any(|p| p.matches(record)),
        }
    }

    pub fn to_sql(&self) -> SqlFilter {
        if self.predicates.is_empty() {
            let clause = match self.operator {
                MatchOperator::All => "1",
                MatchOperator::Any => "0",
            };
            return SqlFilter {
                clause: clause.to_string(),
                params: Vec::new(),
            };
        }

        let joiner = match self.operator {
            MatchOperator::All => " AND ",
            MatchOperator::Any => " OR ",
        };

        let mut clauses = Vec::with_capacity(self.predicates.len());
        let mut params = Vec::new();
        for predicate in &self.predicates {
            let sql = predicate.to_sql();
            clauses.push(format!("({})", sql.clause));
            params.extend(sql.params);
        }

        SqlFilter {
            clause: clauses.join(joiner),
            params,
        }
    }
}

/// A state change applied to one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    MarkRead,
    MarkUnread,
    MoveTo(Mailbox),
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::MarkRead => f.write_str("MarkRead"),
            Action::MarkUnread => f.write_str("MarkUnread"),
            Action::MoveTo(mailbox) => write!(f, "MoveTo({})", mailbox),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub name: String,
    pub condition: Condition,
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RuleSet {
    pub rules: Vec<Rule>,
}

impl RuleSet {
    /// Load and validate a ruleset file
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            GmailError::RulesetParse(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let ruleset = Self::from_json(&content)?;
        tracing::info!(
            "Loaded {} rules from {}",
            ruleset.rules.len(),
            path.display()
        );
        Ok(ruleset)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Self::from_json_at(content, Utc::now())
    }

    /// Parse and validate, resolving relative dates against `now`
    pub fn from_json_at(content: &str, now: DateTime<Utc>) -> Result<Self> {
        let document: RulesetDocument =
            serde_json::from_str(content).map_err(|e| GmailError::RulesetParse(e.to_string()))?;

        let mut rules = Vec::with_capacity(document.rules.len());
        let mut violations = Vec::new();

        for rule in document.rules {
            match validate_rule(rule, now) {
                Ok(rule) => rules.push(rule),
                Err(mut found) => violations.append(&mut found),
            }
        }

        if !violations.is_empty() {
            return Err(GmailError::InvalidRuleset(violations));
        }

        Ok(Self { rules })
    }
}

fn validate_rule(
    document: RuleDocument,
    now: DateTime<Utc>,
) -> std::result::Result<Rule, Vec<RuleViolation>> {
    let mut violations = Vec::new();
    let violation = |location: String, reason: String| RuleViolation {
        rule: document.name.clone(),
        location,
        reason,
    };

    let mut predicates = Vec::with_capacity(document.conditions.rules.len());
    for (index, condition) in document.conditions.rules.iter().enumerate() {
        match Predicate::parse_at(&condition.field, &condition.predicate, &condition.value, now) {
            Ok(predicate) => predicates.push(predicate),
            Err(e) => violations.push(violation(
                format!("conditions[{}].{}", index, condition.field),
                e.to_string(),
            )),
        }
    }

    let mut actions = Vec::with_capacity(document.actions.len());
    for (index, action) in document.actions.iter().enumerate() {
        let location = format!("actions[{}]", index);
        match (action.kind, action.folder.as_deref()) {
            (ActionKind::MarkAsRead, _) => actions.push(Action::MarkRead),
            (ActionKind::MarkAsUnread, _) => actions.push(Action::MarkUnread),
            (ActionKind::MoveMessage, None) => violations.push(violation(
                location,
                "`folder` must be provided when `type` is move_message".to_string(),
            )),
            (ActionKind::MoveMessage, Some(folder)) => match folder.parse::<Mailbox>() {
                Ok(mailbox) => actions.push(Action::MoveTo(mailbox)),
                Err(reason) => violations.push(violation(location, reason)),
            },
        }
    }

    if !violations.is_empty() {
        return Err(violations);
    }

    Ok(Rule {
        name: document.name,
        condition: Condition {
            operator: document.conditions.operator,
            predicates,
        },
        actions,
    })
}

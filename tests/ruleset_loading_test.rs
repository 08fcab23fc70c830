//! Ruleset files loaded from disk, valid and invalid

use gmail_rules::error::GmailError;
use gmail_rules::models::Mailbox;
use gmail_rules::rules::{Action, MatchOperator, RuleSet};
use std::path::PathBuf;
use tempfile::TempDir;

async fn write_rules(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("rules.json");
    tokio::fs::write(&path, content).await.unwrap();
    path
}

fn violations(error: GmailError) -> Vec<gmail_rules::RuleViolation> {
    match error {
        GmailError::InvalidRuleset(violations) => violations,
        other => panic!("expected InvalidRuleset, got {:?}", other),
    }
}

#[tokio::test]
async fn test_load_valid_ruleset() {
    let dir = TempDir::new().unwrap();
    let path = write_rules(
        &dir,
        r#"{
          "rules": [
            {
              "name": "Old newsletters",
              "conditions": {
                "operator": "ALL",
                "rules": [
                  {"field": "from_email", "predicate": "Contains", "value": "newsletter"},
                  {"field": "date", "predicate": "LessThan", "value": "2 months"}
                ]
              },
              "actions": [{"type": "mark_as_read"}, {"type": "move_message", "folder": "Trash"}]
            },
            {
              "name": "Nothing",
              "conditions": {"operator": "ANY", "rules": []},
              "actions": []
            }
          ]
        }"#,
    )
    .await;

    let ruleset = RuleSet::load(&path).await.unwrap();

    assert_eq!(ruleset.rules.len(), 2);
    let first = &ruleset.rules[0];
    assert_eq!(first.name, "Old newsletters");
    assert_eq!(first.condition.operator, MatchOperator::All);
    assert_eq!(first.condition.predicates.len(), 2);
    assert_eq!(
        first.actions,
        vec![Action::MarkRead, Action::MoveTo(Mailbox::Trash)]
    );
    assert!(ruleset.rules[1].condition.predicates.is_empty());
}

#[tokio::test]
async fn test_move_without_folder_names_the_action() {
    let dir = TempDir::new().unwrap();
    let path = write_rules(
        &dir,
        r#"{"rules": [{
            "name": "Broken mover",
            "conditions": {"operator": "ANY", "rules": [
                {"field": "subject", "predicate": "Contains", "value": "sale"}]},
            "actions": [{"type": "mark_as_read"}, {"type": "move_message"}]
        }]}"#,
    )
    .await;

    let found = violations(RuleSet::load(&path).await.unwrap_err());

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].rule, "Broken mover");
    assert_eq!(found[0].location, "actions[1]");
    assert!(found[0].reason.contains("folder"));
}

#[tokio::test]
async fn test_mismatched_operators_list_valid_names() {
    let dir = TempDir::new().unwrap();
    let path = write_rules(
        &dir,
        r#"{"rules": [{
            "name": "Confused",
            "conditions": {"operator": "ALL", "rules": [
                {"field": "subject", "predicate": "GreaterThan", "value": "x"},
                {"field": "date", "predicate": "Contains", "value": "2024"}]},
            "actions": [{"type": "mark_as_read"}]
        }]}"#,
    )
    .await;

    let found = violations(RuleSet::load(&path).await.unwrap_err());

    assert_eq!(found.len(), 2);
    assert_eq!(found[0].location, "conditions[0].subject");
    assert!(found[0].reason.contains("'Contains'"));
    assert!(found[0].reason.contains("'DoesNotEqual'"));
    assert_eq!(found[1].location, "conditions[1].date");
    assert!(found[1].reason.contains("'GreaterThan' or 'LessThan'"));
}

#[tokio::test]
async fn test_violations_from_every_rule_are_collected() {
    let dir = TempDir::new().unwrap();
    let path = write_rules(
        &dir,
        r#"{"rules": [
            {"name": "good", "conditions": {"operator": "ANY", "rules": []}, "actions": []},
            {"name": "bad date", "conditions": {"operator": "ANY", "rules": [
                {"field": "date", "predicate": "LessThan", "value": "yesterday"}]}, "actions": []},
            {"name": "bad field", "conditions": {"operator": "ANY", "rules": [
                {"field": "mailbox", "predicate": "Equals", "value": "INBOX"},
                {"field": "cc", "predicate": "Equals", "value": "x"}]}, "actions": []},
            {"name": "bad folder", "conditions": {"operator": "ANY", "rules": []},
             "actions": [{"type": "move_message", "folder": "Archive"}]}
        ]}"#,
    )
    .await;

    let found = violations(RuleSet::load(&path).await.unwrap_err());
    let rules: Vec<&str> = found.iter().map(|v| v.rule.as_str()).collect();

    assert_eq!(rules, vec!["bad date", "bad field", "bad field", "bad folder"]);
    assert!(found[0].reason.starts_with("Invalid date value 'yesterday'"));
    assert!(found[3].reason.contains("Archive"));
}

#[tokio::test]
async fn test_structural_errors_are_parse_errors() {
    let dir = TempDir::new().unwrap();

    for content in [
        "{not json",
        r#"{"rules": [{"name": "x", "conditions": {"operator": "SOME", "rules": []}, "actions": []}]}"#,
        r#"{"rules": [{"name": "x", "conditions": {"operator": "ANY", "rules": []}, "actions": [{"type": "archive"}]}]}"#,
        r#"{"rules": [{"name": "x", "actions": []}]}"#,
    ] {
        let path = write_rules(&dir, content).await;
        let result = RuleSet::load(&path).await;
        assert!(
            matches!(result, Err(GmailError::RulesetParse(_))),
            "{} should fail to parse",
            content
        );
    }
}

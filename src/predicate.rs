//! Typed predicates over email record fields
//!
//! A rule condition names a field, an operator and a literal. Parsing resolves
//! the field to its kind (text or timestamp), checks the operator against the
//! operators that kind supports, and resolves temporal literals once, so a
//! parsed [`Predicate`] can no longer fail at evaluation time.
//!
//! Predicates evaluate two ways with identical results: in memory against an
//! [`EmailRecord`], and as a parameterised SQL clause over the mirror table.

use chrono::{DateTime, Duration, Months, NaiveDateTime, Utc};
use rusqlite::types::Value;
use std::fmt;

use crate::error::{GmailError, Result};
use crate::models::EmailRecord;

/// Fixed pattern accepted for absolute timestamps (interpreted as UTC)
pub const ABSOLUTE_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Text-valued record fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextField {
    Id,
    FromName,
    FromEmail,
    ToName,
    ToEmail,
    Subject,
    Body,
}

impl TextField {
    pub fn name(&self) -> &'static str {
        match self {
            TextField::Id => "id",
            TextField::FromName => "from_name",
            TextField::FromEmail => "from_email",
            TextField::ToName => "to_name",
            TextField::ToEmail => "to_email",
            TextField::Subject => "subject",
            TextField::Body => "body",
        }
    }

    /// Column expression; optional names compare as the empty string
    fn column(&self) -> &'static str {
        match self {
            TextField::FromName => "COALESCE(from_name, '')",
            TextField::ToName => "COALESCE(to_name, '')",
            other => other.name(),
        }
    }

    fn value<'a>(&self, record: &'a EmailRecord) -> &'a str {
        match self {
            TextField::Id => &record.id,
            TextField::FromName => record.from_name.as_deref().unwrap_or(""),
            TextField::FromEmail => &record.from_email,
            TextField::ToName => record.to_name.as_deref().unwrap_or(""),
            TextField::ToEmail => &record.to_email,
            TextField::Subject => &record.subject,
            TextField::Body => &record.body,
        }
    }
}

/// Timestamp-valued record fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeField {
    Date,
}

impl TimeField {
    pub fn name(&self) -> &'static str {
        match self {
            TimeField::Date => "date",
        }
    }

    fn value(&self, record: &EmailRecord) -> DateTime<Utc> {
        match self {
            TimeField::Date => record.date,
        }
    }
}

/// Semantic type of a named record field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text(TextField),
    Time(TimeField),
    /// Known field that predicates cannot address (mailbox, read)
    Unsupported,
}

/// Resolve a rule's field name against the email record
pub fn resolve_field(name: &str) -> Result<FieldKind> {
    let kind = match name {
        "id" => FieldKind::Text(TextField::Id),
        "from_name" => FieldKind::Text(TextField::FromName),
        "from_email" => FieldKind::Text(TextField::FromEmail),
        "to_name" => FieldKind::Text(TextField::ToName),
        "to_email" => FieldKind::Text(TextField::ToEmail),
        "subject" => FieldKind::Text(TextField::Subject),
        "body" => FieldKind::Text(TextField::Body),
        "date" => FieldKind::Time(TimeField::Date),
        "mailbox" | "read" => FieldKind::Unsupported,
        other => return Err(GmailError::UnknownField(other.to_string())),
    };
    Ok(kind)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringOperator {
    Contains,
    DoesNotContain,
    Equals,
    DoesNotEqual,
}

impl StringOperator {
    pub const ALL: [StringOperator; 4] = [
        StringOperator::Contains,
        StringOperator::DoesNotContain,
        StringOperator::Equals,
        StringOperator::DoesNotEqual,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StringOperator::Contains => "Contains",
            StringOperator::DoesNotContain => "DoesNotContain",
            StringOperator::Equals => "Equals",
            StringOperator::DoesNotEqual => "DoesNotEqual",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name {
            "NotContains" => Some(StringOperator::DoesNotContain),
            "NotEquals" => Some(StringOperator::DoesNotEqual),
            _ => Self::ALL.into_iter().find(|op| op.name() == name),
        }
    }

    fn apply(&self, haystack: &str, needle: &str) -> bool {
        match self {
            StringOperator::Contains => haystack.contains(needle),
            StringOperator::DoesNotContain => !haystack.contains(needle),
            StringOperator::Equals => haystack == needle,
            StringOperator::DoesNotEqual => haystack != needle,
        }
    }

    fn sql(&self, column: &str) -> String {
        match self {
            StringOperator::Contains => format!("instr({}, ?) > 0", column),
            StringOperator::DoesNotContain => format!("instr({}, ?) = 0", column),
            StringOperator::Equals => format!("{} = ?", column),
            StringOperator::DoesNotEqual => format!("{} <> ?", column),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateOperator {
    GreaterThan,
    LessThan,
}

impl DateOperator {
    pub const ALL: [DateOperator; 2] = [DateOperator::GreaterThan, DateOperator::LessThan];

    pub fn name(&self) -> &'static str {
        match self {
            DateOperator::GreaterThan => "GreaterThan",
            DateOperator::LessThan => "LessThan",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }
}

/// Render operator names the way error messages list them: 'A', 'B' or 'C'
fn describe_names(names: &[&str]) -> String {
    let quoted: Vec<String> = names.iter().map(|n| format!("'{}'", n)).collect();
    match quoted.split_last() {
        Some((last, rest)) if !rest.is_empty() => format!("{} or {}", rest.join(", "), last),
        Some((last, _)) => last.clone(),
        None => String::new(),
    }
}

/// A validated field/operator/value test
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Text {
        field: TextField,
        operator: StringOperator,
        value: String,
    },
    Date {
        field: TimeField,
        operator: DateOperator,
        value: DateTime<Utc>,
    },
}

/// SQL boolean expression with positional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFilter {
    pub clause: String,
    pub params: Vec<Value>,
}

impl Predicate {
    /// Parse a predicate, resolving relative dates against the current time
    pub fn parse(field: &str, operator: &str, value: &str) -> Result<Self> {
        Self::parse_at(field, operator, value, Utc::now())
    }

    /// Parse a predicate, resolving relative dates against `now`
    pub fn parse_at(field: &str, operator: &str, value: &str, now: DateTime<Utc>) -> Result<Self> {
        match resolve_field(field)? {
            FieldKind::Text(text_field) => {
                let op = StringOperator::parse(operator).ok_or_else(|| {
                    let names: Vec<_> = StringOperator::ALL.iter().map(|o| o.name()).collect();
                    GmailError::UnsupportedPredicate {
                        field: field.to_string(),
                        predicate: operator.to_string(),
                        kind: "String".to_string(),
                        valid: describe_names(&names),
                    }
                })?;
                Ok(Predicate::Text {
                    field: text_field,
                    operator: op,
                    value: value.to_string(),
                })
            }
            FieldKind::Time(time_field) => {
                let op = DateOperator::parse(operator).ok_or_else(|| {
                    let names: Vec<_> = DateOperator::ALL.iter().map(|o| o.name()).collect();
                    GmailError::UnsupportedPredicate {
                        field: field.to_string(),
                        predicate: operator.to_string(),
                        kind: "DateTime".to_string(),
                        valid: describe_names(&names),
                    }
                })?;
                Ok(Predicate::Date {
                    field: time_field,
                    operator: op,
                    value: parse_date_literal(value, now)?,
                })
            }
            FieldKind::Unsupported => Err(GmailError::UnsupportedFieldType(field.to_string())),
        }
    }

    /// Evaluate against a record in memory
    pub fn matches(&self, record: &EmailRecord) -> bool {
        match self {
            Predicate::Text {
                field,
                operator,
                value,
            } => operator.apply(field.value(record), value),
            Predicate::Date {
                field,
                operator: DateOperator::GreaterThan,
                value,
            } => field.value(record) > *value,
            Predicate::Date {
                field,
                operator: DateOperator::LessThan,
                value,
            } => field.value(record) < *value,
        }
    }

    /// Compile to a clause over the mirror's `email` table
    pub fn to_sql(&self) -> SqlFilter {
        match self {
            Predicate::Text {
                field,
                operator,
                value,
            } => SqlFilter {
                clause: operator.sql(field.column()),
                params: vec![Value::Text(value.clone())],
            },
            Predicate::Date {
                field,
                operator,
                value,
            } => {
                let cmp = match operator {
                    DateOperator::GreaterThan => ">",
                    DateOperator::LessThan => "<",
                };
                SqlFilter {
                    clause: format!("{} {} ?", field.name(), cmp),
                    params: vec![Value::Integer(value.timestamp_millis())],
                }
            }
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Text {
                field,
                operator,
                value,
            } => write!(f, "{} {} {:?}", field.name(), operator.name(), value),
            Predicate::Date {
                field,
                operator,
                value,
            } => write!(f, "{} {} {}", field.name(), operator.name(), value.to_rfc3339()),
        }
    }
}

/// Resolve a temporal literal.
///
/// Tried in order: `<n>d` / `<n> days` (n days before `now`), `<n>m` /
/// `<n> months` (n calendar months before `now`), an absolute
/// `%Y-%m-%dT%H:%M:%S` timestamp in UTC, then RFC 3339.
pub fn parse_date_literal(value: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let invalid = || GmailError::InvalidDateFormat(value.to_string());
    let trimmed = value.trim();

    if let Some(count) = strip_unit(trimmed, &["days", "d"]) {
        let days = count.ok_or_else(invalid)?;
        return now
            .checked_sub_signed(Duration::days(i64::from(days)))
            .ok_or_else(invalid);
    }

    if let Some(count) = strip_unit(trimmed, &["months", "m"]) {
        let months = count.ok_or_else(invalid)?;
        return now.checked_sub_months(Months::new(months)).ok_or_else(invalid);
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, ABSOLUTE_DATE_FORMAT) {
        return Ok(naive.and_utc());
    }

    DateTime::parse_from_rfc3339(trimmed)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| invalid())
}

/// `Some(Some(n))` for a well-formed count, `Some(None)` when the unit
/// matched but the count did not parse, `None` when no unit matched.
fn strip_unit(value: &str, units: &[&str]) -> Option<Option<u32>> {
    units
        .iter()
        .find_map(|unit| value.strip_suffix(unit))
        .map(|count| count.trim().parse::<u32>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Mailbox;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 31, 12, 0, 0).unwrap()
    }

    fn record() -> EmailRecord {
        EmailRecord {
            id: "msg-1".to_string(),
            from_name: None,
            from_email: "billing@example.net".to_string(),
            to_name: Some("Me".to_string()),
            to_email: "me@example.com".to_string(),
            subject: "Consider upgrading your plan".to_string(),
            date: Utc.with_ymd_and_hms(2025, 2, 1, 9, 30, 0).unwrap(),
            mailbox: Mailbox::Inbox,
            read: false,
            body: "Your invoice is ready.".to_string(),
        }
    }

    #[test]
    fn test_string_operators_are_case_sensitive() {
        let contains = Predicate::parse("subject", "Contains", "Consider").unwrap();
        assert!(contains.matches(&record()));

        let lower = Predicate::parse("subject", "Contains", "consider").unwrap();
        assert!(!lower.matches(&record()));

        let not_contains = Predicate::parse("subject", "DoesNotContain", "consider").unwrap();
        assert!(not_contains.matches(&record()));
    }

    #[test]
    fn test_equality_operators() {
        let equals = Predicate::parse("from_email", "Equals", "billing@example.net").unwrap();
        assert!(equals.matches(&record()));

        let not_equals = Predicate::parse("from_email", "NotEquals", "billing@example.net").unwrap();
        assert!(!not_equals.matches(&record()));

        // Absent display names compare as empty
        let empty_name = Predicate::parse("from_name", "Equals", "").unwrap();
        assert!(empty_name.matches(&record()));
    }

    #[test]
    fn test_date_operators() {
        let before = Predicate::parse("date", "LessThan", "2025-02-14T04:52:12").unwrap();
        assert!(before.matches(&record()));

        let after = Predicate::parse("date", "GreaterThan", "2025-02-14T04:52:12").unwrap();
        assert!(!after.matches(&record()));
    }

    #[test]
    fn test_temporal_operator_on_string_field_is_rejected() {
        let err = Predicate::parse("subject", "GreaterThan", "10d").unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, GmailError::UnsupportedPredicate { .. }));
        assert!(message.contains("'GreaterThan' is not supported for String"));
        assert!(message.contains("'Contains', 'DoesNotContain', 'Equals' or 'DoesNotEqual'"));
    }

    #[test]
    fn test_string_operator_on_date_field_is_rejected() {
        let err = Predicate::parse("date", "Contains", "2024").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("for DateTime field 'date'"));
        assert!(message.contains("'GreaterThan' or 'LessThan'"));
    }

    #[test]
    fn test_field_resolution_errors() {
        assert!(matches!(
            Predicate::parse("read", "Equals", "true"),
            Err(GmailError::UnsupportedFieldType(_))
        ));
        assert!(matches!(
            Predicate::parse("mailbox", "Equals", "INBOX"),
            Err(GmailError::UnsupportedFieldType(_))
        ));
        assert!(matches!(
            Predicate::parse("size", "Equals", "1"),
            Err(GmailError::UnknownField(_))
        ));
    }

    #[test]
    fn test_relative_days() {
        let now = fixed_now();
        let expected = now - Duration::days(10);
        assert_eq!(parse_date_literal("10d", now).unwrap(), expected);
        assert_eq!(parse_date_literal("10 days", now).unwrap(), expected);
        assert_eq!(parse_date_literal(" 10 d ", now).unwrap(), expected);
    }

    #[test]
    fn test_relative_months_are_calendar_months() {
        let now = fixed_now();
        // March 31 minus one month clamps to the end of February
        let expected = Utc.with_ymd_and_hms(2025, 2, 28, 12, 0, 0).unwrap();
        assert_eq!(parse_date_literal("1m", now).unwrap(), expected);
        assert_eq!(parse_date_literal("1 months", now).unwrap(), expected);
    }

    #[test]
    fn test_absolute_dates() {
        let now = fixed_now();
        assert_eq!(
            parse_date_literal("2025-02-14T04:52:12", now).unwrap(),
            Utc.with_ymd_and_hms(2025, 2, 14, 4, 52, 12).unwrap()
        );
        assert_eq!(
            parse_date_literal("2025-02-14T04:52:12+05:30", now).unwrap(),
            Utc.with_ymd_and_hms(2025, 2, 13, 23, 22, 12).unwrap()
        );
    }

    #[test]
    fn test_invalid_dates() {
        let now = fixed_now();
        for value in ["yesterday", "xd", "ten days", "2025/02/14", "", "3 weeks"] {
            assert!(
                matches!(
                    parse_date_literal(value, now),
                    Err(GmailError::InvalidDateFormat(_))
                ),
                "expected {:?} to be rejected",
                value
            );
        }
    }

    #[test]
    fn test_malformed_relative_date_fails_at_parse_time() {
        let err = Predicate::parse("date", "LessThan", "many days").unwrap_err();
        assert!(matches!(err, GmailError::InvalidDateFormat(_)));
    }

    #[test]
    fn test_to_sql() {
        let predicate = Predicate::parse("from_name", "DoesNotContain", "Bot").unwrap();
        let sql = predicate.to_sql();
        assert_eq!(sql.clause, "instr(COALESCE(from_name, ''), ?) = 0");
        assert_eq!(sql.params, vec![Value::Text("Bot".to_string())]);

        let predicate = Predicate::parse("date", "GreaterThan", "2024-01-01T00:00:00").unwrap();
        let sql = predicate.to_sql();
        assert_eq!(sql.clause, "date > ?");
        assert_eq!(
            sql.params,
            vec![Value::Integer(
                Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
                    .unwrap()
                    .timestamp_millis()
            )]
        );
    }

    proptest! {
        #[test]
        fn prop_contains_and_does_not_contain_are_complements(
            subject in "[a-zA-Z ]{0,24}",
            needle in "[a-zA-Z]{0,4}",
        ) {
            let mut email = record();
            email.subject = subject;
            let contains = Predicate::parse("subject", "Contains", &needle).unwrap();
            let excludes = Predicate::parse("subject", "DoesNotContain", &needle).unwrap();
            prop_assert_ne!(contains.matches(&email), excludes.matches(&email));
        }

        #[test]
        fn prop_relative_days_subtract_exactly(days in 0u32..20_000) {
            let now = fixed_now();
            let parsed = parse_date_literal(&format!("{}d", days), now).unwrap();
            prop_assert_eq!(now - parsed, Duration::days(i64::from(days)));
        }
    }
}

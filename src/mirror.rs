//! Local SQLite mirror of Gmail message metadata
//!
//! The mirror is a single `email` table keyed by the Gmail message id. The
//! sync watermark is not stored; it is always derived as `MAX(date)`.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;

use crate::error::{GmailError, Result};
use crate::models::{EmailRecord, Mailbox};
use crate::rules::Condition;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS email (
    id TEXT PRIMARY KEY,
    from_name TEXT,
    from_email TEXT NOT NULL,
    to_name TEXT,
    to_email TEXT NOT NULL,
    subject TEXT NOT NULL,
    date INTEGER NOT NULL,
    mailbox TEXT NOT NULL,
    read INTEGER NOT NULL,
    body TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_email_to_email ON email(to_email);
CREATE INDEX IF NOT EXISTS idx_email_date ON email(date);
";

const SELECT_COLUMNS: &str =
    "id, from_name, from_email, to_name, to_email, subject, date, mailbox, read, body";

/// The part of a record reported alongside rule results
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedEmail {
    pub id: String,
    pub from_email: String,
    pub date: DateTime<Utc>,
}

/// Persistent mirror handle; one writer per run
pub struct Mirror {
    conn: Connection,
}

impl Mirror {
    /// Open (or create) the mirror database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        tracing::debug!("Opened mirror at {:?}", path);
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Insert or overwrite every record by id, committed as one transaction
    pub fn upsert_batch(&mut self, records: &[EmailRecord]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO email (id, from_name, from_email, to_name, to_email, subject, date, mailbox, read, body)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(id) DO UPDATE SET
                    from_name = excluded.from_name,
                    from_email = excluded.from_email,
                    to_name = excluded.to_name,
                    to_email = excluded.to_email,
                    subject = excluded.subject,
                    date = excluded.date,
                    mailbox = excluded.mailbox,
                    read = excluded.read,
                    body = excluded.body",
            )?;

            for record in records {
                stmt.execute(params![
                    record.id,
                    record.from_name,
                    record.from_email,
                    record.to_name,
                    record.to_email,
                    record.subject,
                    record.date.timestamp_millis(),
                    record.mailbox.label(),
                    record.read,
                    record.body,
                ])?;
            }
        }
        tx.commit()?;
        Ok(records.len())
    }

    pub fn get(&self, id: &str) -> Result<Option<EmailRecord>> {
        let sql = format!("SELECT {} FROM email WHERE id = ?1", SELECT_COLUMNS);
        let record = self
            .conn
            .query_row(&sql, params![id], row_to_record)
            .optional()?;
        Ok(record)
    }

    /// Latest mirrored timestamp, if any message is mirrored
    pub fn latest_timestamp(&self) -> Result<Option<DateTime<Utc>>> {
        let millis: Option<i64> = self
            .conn
            .query_row("SELECT MAX(date) FROM email", [], |row| row.get(0))?;
        Ok(millis.and_then(DateTime::from_timestamp_millis))
    }

    /// Sync watermark; the minimum representable time for an empty mirror
    pub fn watermark(&self) -> Result<DateTime<Utc>> {
        Ok(self.latest_timestamp()?.unwrap_or(DateTime::<Utc>::MIN_UTC))
    }

    pub fn set_read(&mut self, id: &str, read: bool) -> Result<()> {
        self.update_one(id, "UPDATE email SET read = ?1 WHERE id = ?2", read)
    }

    pub fn set_mailbox(&mut self, id: &str, mailbox: Mailbox) -> Result<()> {
        self.update_one(
            id,
            "UPDATE email SET mailbox = ?1 WHERE id = ?2",
            mailbox.label(),
        )
    }

    fn update_one<V: rusqlite::ToSql>(&mut self, id: &str, sql: &str, value: V) -> Result<()> {
        let tx = self.conn.transaction()?;
        let changed = tx.execute(sql, params![value, id])?;
        if changed != 1 {
            return Err(GmailError::MessageNotFound(id.to_string()));
        }
        tx.commit()?;
        Ok(())
    }

    /// Messages satisfying a rule condition, oldest first
    pub fn find_matching(&self, condition: &Condition) -> Result<Vec<MatchedEmail>> {
        let filter = condition.to_sql();
        let sql = format!(
            "SELECT id, from_email, date FROM email WHERE {} ORDER BY date, id",
            filter.clause
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(filter.params.iter()), |row| {
            Ok(MatchedEmail {
                id: row.get(0)?,
                from_email: row.get(1)?,
                date: millis_to_datetime(row.get(2)?, 2)?,
            })
        })?;

        let mut matches = Vec::new();
        for row in rows {
            matches.push(row?);
        }
        Ok(matches)
    }

    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM email", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn unread_count(&self) -> Result<usize> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM email WHERE read = 0", [], |row| {
                    row.get(0)
                })?;
        Ok(count as usize)
    }

    /// Message count per mailbox, in mailbox declaration order
    pub fn mailbox_counts(&self) -> Result<Vec<(Mailbox, usize)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT COUNT(*) FROM email WHERE mailbox = ?1")?;
        let mut counts = Vec::with_capacity(Mailbox::ALL.len());
        for mailbox in Mailbox::ALL {
            let count: i64 = stmt.query_row(params![mailbox.label()], |row| row.get(0))?;
            counts.push((mailbox, count as usize));
        }
        Ok(counts)
    }
}

fn millis_to_datetime(millis: i64, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            Type::Integer,
            format!("timestamp {} out of range", millis).into(),
        )
    })
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<EmailRecord> {
    let mailbox: String = row.get(7)?;
    let mailbox = mailbox
        .parse::<Mailbox>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, e.into()))?;

    Ok(EmailRecord {
        id: row.get(0)?,
        from_name: row.get(1)?,
        from_email: row.get(2)?,
        to_name: row.get(3)?,
        to_email: row.get(4)?,
        subject: row.get(5)?,
        date: millis_to_datetime(row.get(6)?, 6)?,
        mailbox,
        read: row.get(8)?,
        body: row.get(9)?,
    })
}

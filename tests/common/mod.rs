//! Common test utilities and fixtures
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use gmail_rules::client::MailboxClient;
use gmail_rules::error::{GmailError, Result};
use gmail_rules::models::{EmailRecord, Mailbox, RawMessage, UNREAD_LABEL};
use mockall::mock;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::sync::Mutex;

mock! {
    pub Mailbox {}

    #[async_trait]
    impl MailboxClient for Mailbox {
        async fn list_message_ids(&self, after: Option<DateTime<Utc>>) -> Result<Vec<String>>;
        async fn fetch_raw(&self, id: &str) -> Result<RawMessage>;
        async fn set_read_state(&self, id: &str, read: bool) -> Result<String>;
        async fn trash(&self, id: &str) -> Result<String>;
        async fn relabel(&self, id: &str, add_labels: &[String], remove_labels: &[String]) -> Result<String>;
    }
}

/// A message as the generator produced it
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticMessage {
    pub id: String,
    pub from_name: String,
    pub from_email: String,
    pub to_email: String,
    pub subject: String,
    pub body: String,
    pub date: DateTime<Utc>,
    pub mailbox: Mailbox,
    pub read: bool,
}

impl SyntheticMessage {
    pub fn labels(&self) -> Vec<String> {
        let mut labels = vec![self.mailbox.label().to_string()];
        if !self.read {
            labels.push(UNREAD_LABEL.to_string());
        }
        labels
    }

    pub fn to_rfc822(&self) -> Vec<u8> {
        format!(
            "From: {} <{}>\r\nTo: Me <{}>\r\nSubject: {}\r\nDate: {}\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n{}\r\n",
            self.from_name,
            self.from_email,
            self.to_email,
            self.subject,
            self.date.to_rfc2822(),
            self.body
        )
        .into_bytes()
    }

    pub fn to_record(&self) -> EmailRecord {
        EmailRecord {
            id: self.id.clone(),
            from_name: Some(self.from_name.clone()),
            from_email: self.from_email.clone(),
            to_name: Some("Me".to_string()),
            to_email: self.to_email.clone(),
            subject: self.subject.clone(),
            date: self.date,
            mailbox: self.mailbox,
            read: self.read,
            body: self.body.clone(),
        }
    }
}

const SENDERS: &[(&str, &str)] = &[
    ("Shop Deals", "deals@shop.example"),
    ("Shop Billing", "billing@shop.example"),
    ("Cloud Billing", "billing@cloud.example"),
    ("Cloud Accounts", "Billing@Cloud.example"),
    ("Weekly Newsletter", "newsletter@news.example"),
    ("Tech Newsletter", "newsletter@tech.example"),
    ("Bank Alerts", "alerts@bank.example"),
    ("Alice Smith", "alice@example.com"),
    ("Bob Jones", "bob@example.org"),
];

const SUBJECTS: &[&str] = &[
    "Invoice for your order",
    "Your monthly invoice",
    "Weekly digest",
    "Security alert",
    "Lunch tomorrow?",
    "Flash sale ends tonight",
    "Project update",
];

const BODIES: &[&str] = &[
    "Thanks for your purchase.",
    "Click here to unsubscribe from these emails.",
    "Let me know what you think.",
    "Your statement is ready to view.",
    "See you soon.",
];

/// Seeded generator of synthetic mailbox contents
pub struct MessageGenerator {
    rng: StdRng,
    start: DateTime<Utc>,
}

impl MessageGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    pub fn generate(&mut self, count: usize) -> Vec<SyntheticMessage> {
        (0..count).map(|i| self.message(i)).collect()
    }

    fn message(&mut self, index: usize) -> SyntheticMessage {
        let (from_name, from_email) = *SENDERS.choose(&mut self.rng).unwrap();
        let subject = *SUBJECTS.choose(&mut self.rng).unwrap();
        let body = *BODIES.choose(&mut self.rng).unwrap();
        let mailbox = *Mailbox::ALL.choose(&mut self.rng).unwrap();
        let seconds = self.rng.gen_range(0..365 * 24 * 3600);

        SyntheticMessage {
            id: format!("msg{:05}", index),
            from_name: from_name.to_string(),
            from_email: from_email.to_string(),
            to_email: "me@example.com".to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            date: self.start + Duration::seconds(seconds),
            mailbox,
            read: self.rng.gen_bool(0.5),
        }
    }
}

/// A remote-side message: raw content, date and mutable labels
#[derive(Debug, Clone)]
struct StoredMessage {
    raw: Vec<u8>,
    date: DateTime<Utc>,
    labels: Vec<String>,
}

/// In-memory stand-in for the Gmail mailbox
#[derive(Default)]
pub struct FakeMailbox {
    messages: Mutex<BTreeMap<String, StoredMessage>>,
    calls: Mutex<Vec<String>>,
}

impl FakeMailbox {
    pub fn new(messages: &[SyntheticMessage]) -> Self {
        let fake = Self::default();
        for message in messages {
            fake.insert(message);
        }
        fake
    }

    pub fn insert(&self, message: &SyntheticMessage) {
        self.messages.lock().unwrap().insert(
            message.id.clone(),
            StoredMessage {
                raw: message.to_rfc822(),
                date: message.date,
                labels: message.labels(),
            },
        );
    }

    pub fn labels(&self, id: &str) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .get(id)
            .map(|m| m.labels.clone())
            .unwrap_or_default()
    }

    /// Mutating calls made so far, e.g. `trash:msg00001`
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record_call(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn modify(&self, id: &str, add: &[String], remove: &[String]) -> Result<String> {
        let mut messages = self.messages.lock().unwrap();
        let message = messages
            .get_mut(id)
            .ok_or_else(|| GmailError::MessageNotFound(id.to_string()))?;
        message.labels.retain(|l| !remove.contains(l));
        for label in add {
            if !message.labels.contains(label) {
                message.labels.push(label.clone());
            }
        }
        Ok(id.to_string())
    }
}

#[async_trait]
impl MailboxClient for FakeMailbox {
    async fn list_message_ids(&self, after: Option<DateTime<Utc>>) -> Result<Vec<String>> {
        let messages = self.messages.lock().unwrap();
        Ok(messages
            .iter()
            .filter(|(_, m)| after.map_or(true, |at| m.date > at))
            .map(|(id, _)| id.clone())
            .collect())
    }

    async fn fetch_raw(&self, id: &str) -> Result<RawMessage> {
        let messages = self.messages.lock().unwrap();
        let message = messages
            .get(id)
            .ok_or_else(|| GmailError::MessageNotFound(id.to_string()))?;
        Ok(RawMessage {
            id: id.to_string(),
            raw: message.raw.clone(),
            label_ids: message.labels.clone(),
            internal_date: Some(message.date),
        })
    }

    async fn set_read_state(&self, id: &str, read: bool) -> Result<String> {
        self.record_call(format!("read={}:{}", read, id));
        let unread = [UNREAD_LABEL.to_string()];
        if read {
            self.modify(id, &[], &unread)
        } else {
            self.modify(id, &unread, &[])
        }
    }

    async fn trash(&self, id: &str) -> Result<String> {
        self.record_call(format!("trash:{}", id));
        let others: Vec<String> = Mailbox::ALL
            .iter()
            .filter(|m| **m != Mailbox::Trash)
            .map(|m| m.label().to_string())
            .collect();
        self.modify(id, &[Mailbox::Trash.label().to_string()], &others)
    }

    async fn relabel(
        &self,
        id: &str,
        add_labels: &[String],
        remove_labels: &[String],
    ) -> Result<String> {
        self.record_call(format!(
            "relabel:{}:+{}-{}",
            id,
            add_labels.join(","),
            remove_labels.join(",")
        ));
        self.modify(id, add_labels, remove_labels)
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Label Gmail attaches to messages that have not been read
pub const UNREAD_LABEL: &str = "UNREAD";

/// Mailbox location of a mirrored message.
///
/// Serialized as the Gmail system label name (`INBOX`, `SPAM`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Mailbox {
    Inbox,
    Trash,
    Spam,
    Sent,
    Draft,
}

const INBOX_SPAM_TRASH: &[Mailbox] = &[Mailbox::Inbox, Mailbox::Spam, Mailbox::Trash];
const TRASH_ONLY: &[Mailbox] = &[Mailbox::Trash];

/// Permitted destinations per source mailbox
static TRANSITIONS: [(Mailbox, &[Mailbox]); 5] = [
    (Mailbox::Inbox, INBOX_SPAM_TRASH),
    (Mailbox::Trash, INBOX_SPAM_TRASH),
    (Mailbox::Spam, INBOX_SPAM_TRASH),
    (Mailbox::Sent, TRASH_ONLY),
    (Mailbox::Draft, TRASH_ONLY),
];

impl Mailbox {
    pub const ALL: [Mailbox; 5] = [
        Mailbox::Inbox,
        Mailbox::Trash,
        Mailbox::Spam,
        Mailbox::Sent,
        Mailbox::Draft,
    ];

    /// Gmail system label id for this mailbox
    pub fn label(&self) -> &'static str {
        match self {
            Mailbox::Inbox => "INBOX",
            Mailbox::Trash => "TRASH",
            Mailbox::Spam => "SPAM",
            Mailbox::Sent => "SENT",
            Mailbox::Draft => "DRAFT",
        }
    }

    /// Map an exact Gmail label id to a mailbox
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.label() == label)
    }

    /// Derive the location from a message's label set.
    ///
    /// Gmail reports the primary system label last, so labels are scanned in
    /// reverse and the first one naming a mailbox wins. Defaults to Inbox.
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Self {
        labels
            .iter()
            .rev()
            .find_map(|l| Self::from_label(l.as_ref()))
            .unwrap_or(Mailbox::Inbox)
    }

    /// Destinations a message in this mailbox may be moved to
    pub fn movable_locations(&self) -> &'static [Mailbox] {
        TRANSITIONS
            .iter()
            .find(|(from, _)| from == self)
            .map(|(_, to)| *to)
            .unwrap_or(TRASH_ONLY)
    }

    pub fn can_move_to(&self, destination: Mailbox) -> bool {
        self.movable_locations().contains(&destination)
    }
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Mailbox {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Self::from_label(&upper).ok_or_else(|| {
            let names: Vec<_> = Self::ALL.iter().map(|m| m.label()).collect();
            format!("unknown mailbox '{}', expected one of {}", s, names.join(", "))
        })
    }
}

/// A mirrored Gmail message
#[derive(Debug, Clone, PartialEq)]
pub struct EmailRecord {
    pub id: String,
    pub from_name: Option<String>,
    pub from_email: String,
    pub to_name: Option<String>,
    pub to_email: String,
    pub subject: String,
    pub date: DateTime<Utc>,
    pub mailbox: Mailbox,
    pub read: bool,
    pub body: String,
}

/// A message as fetched from the remote mailbox, before decoding
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub id: String,
    /// RFC 822 bytes
    pub raw: Vec<u8>,
    pub label_ids: Vec<String>,
    /// Gmail's receive time, used when the Date header is unusable
    pub internal_date: Option<DateTime<Utc>>,
}

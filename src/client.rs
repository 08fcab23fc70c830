//! Remote mailbox access over the Gmail API

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use google_gmail1::api::{Message, ModifyMessageRequest};
use tracing::debug;

use crate::auth::GmailHub;
use crate::error::{GmailError, Result};
use crate::models::{RawMessage, UNREAD_LABEL};

/// Scope used for every call; allows reading and relabelling, never deleting
const MODIFY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.modify";

/// Maximum page size accepted by messages.list
const LIST_PAGE_SIZE: u32 = 500;

/// Operations the rules engine needs from the remote mailbox.
///
/// Mutating calls return the id of the message Gmail reports as changed.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailboxClient: Send + Sync {
    /// List message ids, optionally only those received after `after`
    async fn list_message_ids(&self, after: Option<DateTime<Utc>>) -> Result<Vec<String>>;

    /// Fetch a message's raw RFC 822 content and its label ids
    async fn fetch_raw(&self, id: &str) -> Result<RawMessage>;

    /// Add or remove the UNREAD label
    async fn set_read_state(&self, id: &str, read: bool) -> Result<String>;

    /// Move a message to the trash
    async fn trash(&self, id: &str) -> Result<String>;

    /// Add and remove labels in one modify call
    async fn relabel(
        &self,
        id: &str,
        add_labels: &[String],
        remove_labels: &[String],
    ) -> Result<String>;
}

/// Gmail search query restricting a listing to mail after `after`.
///
/// Returns `None` when no bound applies, including the minimum timestamp an
/// empty mirror reports as its watermark.
pub fn list_query(after: Option<DateTime<Utc>>) -> Option<String> {
    after
        .filter(|at| *at > DateTime::<Utc>::MIN_UTC)
        .map(|at| format!("after:{}", at.timestamp()))
}

/// Modify request that toggles the read state
pub fn read_state_request(read: bool) -> ModifyMessageRequest {
    let unread = vec![UNREAD_LABEL.to_string()];
    if read {
        ModifyMessageRequest {
            add_label_ids: None,
            remove_label_ids: Some(unread),
        }
    } else {
        ModifyMessageRequest {
            add_label_ids: Some(unread),
            remove_label_ids: None,
        }
    }
}

fn non_empty(labels: &[String]) -> Option<Vec<String>> {
    if labels.is_empty() {
        None
    } else {
        Some(labels.to_vec())
    }
}

fn changed_id(message: Message, requested: &str) -> String {
    message.id.unwrap_or_else(|| requested.to_string())
}

/// Gmail API implementation of [`MailboxClient`]
pub struct GmailMailboxClient {
    hub: GmailHub,
}

impl GmailMailboxClient {
    pub fn new(hub: GmailHub) -> Self {
        Self { hub }
    }

    async fn modify(&self, id: &str, request: ModifyMessageRequest) -> Result<String> {
        let (_, message) = self
            .hub
            .users()
            .messages_modify(request, "me", id)
            .add_scope(MODIFY_SCOPE)
            .doit()
            .await?;
        Ok(changed_id(message, id))
    }
}

#[async_trait]
impl MailboxClient for GmailMailboxClient {
    async fn list_message_ids(&self, after: Option<DateTime<Utc>>) -> Result<Vec<String>> {
        let query = list_query(after);
        let mut all_ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut call = self
                .hub
                .users()
                .messages_list("me")
                .include_spam_trash(true)
                .max_results(LIST_PAGE_SIZE);

            if let Some(q) = query.as_deref() {
                call = call.q(q);
            }
            if let Some(token) = page_token.as_deref() {
                call = call.page_token(token);
            }

            let (_, response) = call.add_scope(MODIFY_SCOPE).doit().await?;

            all_ids.extend(
                response
                    .messages
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|m| m.id),
            );

            page_token = response.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        debug!("Listed {} message ids (query: {:?})", all_ids.len(), query);
        Ok(all_ids)
    }

    async fn fetch_raw(&self, id: &str) -> Result<RawMessage> {
        let (_, message) = self
            .hub
            .users()
            .messages_get("me", id)
            .format("raw")
            .add_scope(MODIFY_SCOPE)
            .doit()
            .await?;

        let raw = message.raw.ok_or_else(|| {
            GmailError::InvalidMessageFormat(format!("{}: response has no raw content", id))
        })?;

        Ok(RawMessage {
            id: message.id.unwrap_or_else(|| id.to_string()),
            raw,
            label_ids: message.label_ids.unwrap_or_default(),
            internal_date: message
                .internal_date
                .and_then(DateTime::from_timestamp_millis),
        })
    }

    async fn set_read_state(&self, id: &str, read: bool) -> Result<String> {
        self.modify(id, read_state_request(read)).await
    }

    async fn trash(&self, id: &str) -> Result<String> {
        let (_, message) = self
            .hub
            .users()
            .messages_trash("me", id)
            .add_scope(MODIFY_SCOPE)
            .doit()
            .await?;
        Ok(changed_id(message, id))
    }

    async fn relabel(
        &self,
        id: &str,
        add_labels: &[String],
        remove_labels: &[String],
    ) -> Result<String> {
        let request = ModifyMessageRequest {
            add_label_ids: non_empty(add_labels),
            remove_label_ids: non_empty(remove_labels),
        };
        self.modify(id, request).await
    }
}

//! Sync reconciler: pulls new remote messages into the mirror

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::{debug, info};

use crate::client::MailboxClient;
use crate::error::{GmailError, Result};
use crate::mime::decode_message;
use crate::mirror::Mirror;
use crate::models::EmailRecord;

/// Progress callback invoked once per fetched message
pub type ProgressCallback = Arc<dyn Fn() + Send + Sync>;

/// Summary of one sync pass
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome {
    /// Lower bound sent to the remote listing, if any
    pub after: Option<DateTime<Utc>>,
    pub merged: usize,
}

pub struct SyncReconciler<'a> {
    client: &'a dyn MailboxClient,
    max_concurrent_fetches: usize,
    on_progress: Option<ProgressCallback>,
}

impl<'a> SyncReconciler<'a> {
    pub fn new(client: &'a dyn MailboxClient, max_concurrent_fetches: usize) -> Self {
        Self {
            client,
            max_concurrent_fetches: max_concurrent_fetches.max(1),
            on_progress: None,
        }
    }

    pub fn with_progress(mut self, on_progress: ProgressCallback) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    /// Merge remote messages into the mirror.
    ///
    /// Incremental syncs request only mail after the mirror's watermark; full
    /// syncs request everything. Every fetched message is upserted by id in a
    /// single transaction, so a failure anywhere leaves the mirror unchanged.
    pub async fn sync(&self, mirror: &mut Mirror, incremental: bool) -> Result<SyncOutcome> {
        let after = if incremental {
            Some(mirror.watermark()?)
        } else {
            None
        };

        let ids = self.client.list_message_ids(after).await?;
        info!("Fetching {} messages from Gmail", ids.len());

        let records = self.fetch_records(ids).await?;
        let merged = mirror.upsert_batch(&records)?;

        info!("Added {} emails to the mirror", merged);
        Ok(SyncOutcome { after, merged })
    }

    async fn fetch_records(&self, ids: Vec<String>) -> Result<Vec<EmailRecord>> {
        stream::iter(ids)
            .map(|id| {
                let client = self.client;
                let on_progress = self.on_progress.clone();
                async move {
                    let raw = client.fetch_raw(&id).await?;
                    let record = decode_message(&raw)?;
                    debug!("Fetched {} from {}", record.id, record.from_email);
                    if let Some(callback) = on_progress {
                        callback();
                    }
                    Ok::<_, GmailError>(record)
                }
            })
            .buffered(self.max_concurrent_fetches)
            .try_collect()
            .await
    }
}

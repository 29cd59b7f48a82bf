//! Live status events and the in-process channel layer.
//!
//! The channel layer is a set of named broadcast groups. A user's live
//! session subscribes to `user_{id}`; the pipeline publishes `doc.status`
//! events to the owner's group. Delivery is at-most-once: events published
//! to a group with no subscribers are dropped, and so is the group itself.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::defaults;
use crate::error::Result;
use crate::models::{Document, DocumentStatus};
use crate::traits::NotificationChannel;

/// Summary of a finished pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentStatusEvent {
    #[serde(rename = "doc_id")]
    pub document_id: Uuid,
    pub tags: Vec<String>,
    /// First characters of the extracted text, `None` when there is none.
    pub text_preview: Option<String>,
    pub status: DocumentStatus,
}

impl DocumentStatusEvent {
    /// Build the event from the persisted document.
    pub fn from_document(doc: &Document) -> Self {
        Self {
            document_id: doc.id,
            tags: doc.tags.clone().unwrap_or_default(),
            text_preview: doc
                .extracted_text
                .as_deref()
                .map(|t| preview(t, defaults::NOTIFY_PREVIEW_CHARS)),
            status: doc.status,
        }
    }
}

/// Prefix of `text` holding at most `max_chars` characters.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Envelope delivered to channel subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    pub data: DocumentStatusEvent,
}

impl ChannelEvent {
    pub fn doc_status(data: DocumentStatusEvent) -> Self {
        Self {
            event_type: defaults::DOC_STATUS_EVENT.to_string(),
            occurred_at: Utc::now(),
            data,
        }
    }
}

/// In-process publish/subscribe groups.
pub struct ChannelLayer {
    groups: RwLock<HashMap<String, broadcast::Sender<ChannelEvent>>>,
    capacity: usize,
}

impl Default for ChannelLayer {
    fn default() -> Self {
        Self::new(defaults::CHANNEL_GROUP_CAPACITY)
    }
}

impl ChannelLayer {
    /// Create a channel layer whose groups buffer `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            groups: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// Join `group`, creating it on first use.
    pub fn group_add(&self, group: &str) -> broadcast::Receiver<ChannelEvent> {
        let mut groups = self.groups.write().unwrap_or_else(|e| e.into_inner());
        groups
            .entry(group.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Join the live group of a user.
    pub fn subscribe_user(&self, user_id: Uuid) -> broadcast::Receiver<ChannelEvent> {
        self.group_add(&crate::models::owner_group(user_id))
    }

    /// Drop groups nobody listens to anymore.
    pub fn prune(&self) -> usize {
        let mut groups = self.groups.write().unwrap_or_else(|e| e.into_inner());
        let before = groups.len();
        groups.retain(|_, tx| tx.receiver_count() > 0);
        before - groups.len()
    }

    /// Remove `group` when its last subscriber is gone. Checked under the
    /// write lock so a concurrent `group_add` keeps the group.
    fn drop_if_abandoned(&self, group: &str) {
        let mut groups = self.groups.write().unwrap_or_else(|e| e.into_inner());
        if groups.get(group).is_some_and(|tx| tx.receiver_count() == 0) {
            groups.remove(group);
        }
    }

    /// Number of groups currently held.
    pub fn group_count(&self) -> usize {
        self.groups.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Number of live subscribers of `group`.
    pub fn subscriber_count(&self, group: &str) -> usize {
        let groups = self.groups.read().unwrap_or_else(|e| e.into_inner());
        groups.get(group).map(|tx| tx.receiver_count()).unwrap_or(0)
    }
}

#[async_trait]
impl NotificationChannel for ChannelLayer {
    async fn publish(&self, group: &str, event: ChannelEvent) -> Result<()> {
        let sender = {
            let groups = self.groups.read().unwrap_or_else(|e| e.into_inner());
            groups.get(group).cloned()
        };
        let delivered = match sender {
            Some(tx) => tx.send(event).unwrap_or(0),
            None => 0,
        };
        if delivered == 0 {
            self.drop_if_abandoned(group);
        }
        tracing::debug!(group, delivered, "ChannelLayer publish");
        Ok(())
    }
}

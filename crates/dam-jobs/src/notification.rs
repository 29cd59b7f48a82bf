//! Notification bridge: pushes a run summary to the owner's live group.

use std::sync::Arc;

use tracing::{debug, warn};

use dam_core::{owner_group, ChannelEvent, Document, DocumentStatusEvent, NotificationChannel};

/// Fire-and-forget publisher for finished runs.
#[derive(Clone)]
pub struct NotificationBridge {
    channel: Arc<dyn NotificationChannel>,
}

impl NotificationBridge {
    pub fn new(channel: Arc<dyn NotificationChannel>) -> Self {
        Self { channel }
    }

    /// Publish the status of `doc` to `user_{owner_id}`.
    ///
    /// At most once. A publish failure is logged and otherwise ignored.
    pub async fn notify(&self, doc: &Document) {
        let group = owner_group(doc.owner_id);
        let event = ChannelEvent::doc_status(DocumentStatusEvent::from_document(doc));
        match self.channel.publish(&group, event).await {
            Ok(()) => debug!(
                document_id = %doc.id,
                group = %group,
                status = %doc.status,
                "Status published"
            ),
            Err(e) => warn!(
                document_id = %doc.id,
                group = %group,
                error = %e,
                "Status notification failed"
            ),
        }
    }
}

//! Album (media group) collection
//!
//! Telegram delivers every item of an album as its own update. Items are
//! buffered by media group id until the collection window closes, then the
//! whole group is answered as one turn.

use crate::chat::ChatMessage;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Buffers album items by media group id
#[derive(Debug)]
pub struct AlbumCollector {
    window: Duration,
    pending: Mutex<HashMap<String, Vec<ChatMessage>>>,
}

impl AlbumCollector {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Buffer one album item.
    ///
    /// Returns `true` if the item opened a new group; the caller is then
    /// responsible for flushing it with [`flush_after_window`](Self::flush_after_window).
    pub async fn push(&self, group_id: &str, message: ChatMessage) -> bool {
        let mut pending = self.pending.lock().await;
        let items = pending.entry(group_id.to_string()).or_default();
        items.push(message);
        debug!(group_id, items = items.len(), "Album item buffered");
        items.len() == 1
    }

    /// Remove a group and return its items ordered by message id.
    pub async fn take(&self, group_id: &str) -> Vec<ChatMessage> {
        let mut items = self
            .pending
            .lock()
            .await
            .remove(group_id)
            .unwrap_or_default();
        items.sort_by_key(|m| m.message_id);
        items
    }

    /// Wait for the collection window, then take the group.
    pub async fn flush_after_window(&self, group_id: &str) -> Vec<ChatMessage> {
        tokio::time::sleep(self.window).await;
        self.take(group_id).await
    }
}

use std::{
    collections::HashSet,
    sync::{Arc, Mutex, PoisonError},
};

use anyhow::Context;
use shared::domain::{ChatId, Message};
use tracing::{debug, info, warn};

use crate::{
    backend::MessagingBackend, error::SyncError, profiles::ProfileResolver, store::SessionStore,
};

/// Drives "jump to chat" and "load older" fetches and merges their pages into the store.
pub struct HistoryController {
    store: Arc<SessionStore>,
    backend: Arc<dyn MessagingBackend>,
    profiles: Arc<ProfileResolver>,
    page_size: u32,
    inflight_older: Mutex<HashSet<ChatId>>,
}

impl HistoryController {
    pub fn new(
        store: Arc<SessionStore>,
        backend: Arc<dyn MessagingBackend>,
        profiles: Arc<ProfileResolver>,
        page_size: u32,
    ) -> Self {
        Self {
            store,
            backend,
            profiles,
            page_size,
            inflight_older: Mutex::new(HashSet::new()),
        }
    }

    /// Makes `chat_id` active and unions its newest page into the log. On a fetch failure
    /// the previous active chat is restored (unless someone navigated meanwhile) and the
    /// log is left untouched.
    pub async fn navigate_to_chat(&self, chat_id: ChatId) -> Result<(), SyncError> {
        info!(chat_id = chat_id.0, "history: navigating to chat");
        let previous = self.store.set_active_chat(chat_id).await;

        let page = match self
            .backend
            .fetch_history(chat_id, self.page_size, None)
            .await
            .with_context(|| format!("fetch newest page for chat {chat_id}"))
        {
            Ok(page) => page,
            Err(err) => {
                self.store.revert_active_chat(chat_id, previous).await;
                return Err(err.into());
            }
        };

        self.profiles.prefetch_for_messages(&page).await;
        let newest = page.iter().map(|message| message.id).max();
        let added = self.store.merge_messages(chat_id, page).await;
        info!(
            chat_id = chat_id.0,
            added = added.len(),
            "history: newest page merged"
        );

        if let Some(last_message_id) = newest {
            if let Err(err) = self.backend.mark_read(chat_id, last_message_id).await {
                warn!(
                    chat_id = chat_id.0,
                    message_id = last_message_id.0,
                    "history: mark read failed: {err:#}"
                );
            }
        }
        Ok(())
    }

    /// Prepends the page before the oldest held message and returns the added messages.
    /// Empty when the log is empty, history is exhausted, the fetch fails, or another load
    /// for the same chat is already running.
    pub async fn load_older(&self, chat_id: ChatId) -> Vec<Message> {
        let Some(_guard) = InflightGuard::acquire(&self.inflight_older, chat_id) else {
            debug!(
                chat_id = chat_id.0,
                "history: older page already loading; dropping request"
            );
            return Vec::new();
        };

        let result = self.load_older_page(chat_id).await;

        match result {
            Ok(added) => added,
            Err(err) => {
                warn!(chat_id = chat_id.0, "history: load older failed: {err}");
                Vec::new()
            }
        }
    }

    async fn load_older_page(&self, chat_id: ChatId) -> Result<Vec<Message>, SyncError> {
        let Some(anchor) = self.store.pagination_anchor(chat_id).await else {
            debug!(chat_id = chat_id.0, "history: empty log; nothing to page from");
            return Ok(Vec::new());
        };

        info!(
            chat_id = chat_id.0,
            anchor, "history: loading messages before anchor"
        );
        let page = self
            .backend
            .fetch_history(chat_id, self.page_size, Some(anchor))
            .await
            .with_context(|| format!("fetch page before {anchor} for chat {chat_id}"))?;

        match page.iter().map(|message| message.time).min() {
            None => {
                info!(chat_id = chat_id.0, "history: no older messages");
                return Ok(Vec::new());
            }
            Some(oldest) if oldest == anchor => {
                info!(
                    chat_id = chat_id.0,
                    anchor, "history: backend made no progress; history exhausted"
                );
                return Ok(Vec::new());
            }
            Some(_) => {}
        }

        self.profiles.prefetch_for_messages(&page).await;
        let added = self.store.merge_messages(chat_id, page).await;
        info!(
            chat_id = chat_id.0,
            added = added.len(),
            "history: older page merged"
        );
        Ok(added)
    }
}

/// Marks one chat's older-page load as running; released on drop, including when the
/// caller's future is cancelled mid-fetch.
struct InflightGuard<'a> {
    inflight: &'a Mutex<HashSet<ChatId>>,
    chat_id: ChatId,
}

impl<'a> InflightGuard<'a> {
    fn acquire(inflight: &'a Mutex<HashSet<ChatId>>, chat_id: ChatId) -> Option<Self> {
        let inserted = inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(chat_id);
        inserted.then_some(Self { inflight, chat_id })
    }
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.chat_id);
    }
}

#[cfg(test)]
#[path = "tests/history_tests.rs"]
mod tests;

//! Authoritative in-memory cache for one session. Performs no I/O.
//!
//! Each cache sits behind its own lock and no method holds two locks at once,
//! so callers may interleave freely from the push task and user-driven tasks.

use std::collections::{BTreeMap, HashMap, HashSet};

use shared::domain::{Chat, ChatId, Message, MessageId, Profile, UserId};
use tokio::sync::RwLock;

#[derive(Default)]
pub struct SessionStore {
    active_chat: RwLock<Option<ChatId>>,
    logs: RwLock<HashMap<ChatId, Vec<Message>>>,
    chats: RwLock<HashMap<ChatId, Chat>>,
    profiles: RwLock<HashMap<UserId, Profile>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the previously active chat.
    pub async fn set_active_chat(&self, chat_id: ChatId) -> Option<ChatId> {
        self.active_chat.write().await.replace(chat_id)
    }

    pub async fn active_chat(&self) -> Option<ChatId> {
        *self.active_chat.read().await
    }

    /// Swaps the active chat back to `previous` only if it still points at `expected`.
    pub(crate) async fn revert_active_chat(&self, expected: ChatId, previous: Option<ChatId>) -> bool {
        let mut active = self.active_chat.write().await;
        if *active != Some(expected) {
            return false;
        }
        *active = previous;
        true
    }

    /// Merges `incoming` into the chat's log and returns the messages that were not present
    /// before, ascending by id. The whole merge happens under one write lock.
    pub async fn merge_messages(&self, chat_id: ChatId, incoming: Vec<Message>) -> Vec<Message> {
        if incoming.is_empty() {
            return Vec::new();
        }
        let mut logs = self.logs.write().await;
        let log = logs.entry(chat_id).or_default();
        let (merged, added) = merge_into_log(log, chat_id, incoming);
        *log = merged;
        added
    }

    pub async fn log(&self, chat_id: ChatId) -> Vec<Message> {
        self.logs
            .read()
            .await
            .get(&chat_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn log_len(&self, chat_id: ChatId) -> usize {
        self.logs.read().await.get(&chat_id).map_or(0, Vec::len)
    }

    /// `time` of the oldest held message; `None` while the log is empty.
    pub async fn pagination_anchor(&self, chat_id: ChatId) -> Option<i64> {
        self.logs
            .read()
            .await
            .get(&chat_id)
            .and_then(|log| log.first())
            .map(|message| message.time)
    }

    pub async fn set_chats(&self, chats: HashMap<ChatId, Chat>) {
        *self.chats.write().await = chats;
    }

    pub async fn chats(&self) -> HashMap<ChatId, Chat> {
        self.chats.read().await.clone()
    }

    pub async fn profile(&self, user_id: UserId) -> Option<Profile> {
        self.profiles.read().await.get(&user_id).cloned()
    }

    pub async fn put_profiles(&self, profiles: Vec<Profile>) {
        let mut cache = self.profiles.write().await;
        for profile in profiles {
            cache.insert(profile.user_id, profile);
        }
    }

    /// The subset of `user_ids` with no cached profile.
    pub async fn uncached_profiles(&self, user_ids: impl IntoIterator<Item = UserId>) -> Vec<UserId> {
        let cache = self.profiles.read().await;
        let mut missing = user_ids
            .into_iter()
            .filter(|user_id| !cache.contains_key(user_id))
            .collect::<Vec<_>>();
        missing.sort();
        missing.dedup();
        missing
    }
}

/// Builds an id-keyed map from `existing`, overlays `incoming` (incoming wins on an id
/// collision) and rebuilds the ascending sequence. Returns `(merged, added)` where `added`
/// holds the merged copies of ids absent from `existing`.
pub(crate) fn merge_into_log(
    existing: &[Message],
    chat_id: ChatId,
    incoming: Vec<Message>,
) -> (Vec<Message>, Vec<Message>) {
    let known = existing
        .iter()
        .map(|message| message.id)
        .collect::<HashSet<MessageId>>();
    let mut by_id = existing
        .iter()
        .map(|message| (message.id, message.clone()))
        .collect::<BTreeMap<_, _>>();

    let mut added_ids = Vec::new();
    for mut message in incoming {
        message.chat_id = chat_id;
        if !known.contains(&message.id) {
            added_ids.push(message.id);
        }
        by_id.insert(message.id, message);
    }
    added_ids.sort();
    added_ids.dedup();

    let added = added_ids
        .iter()
        .filter_map(|id| by_id.get(id).cloned())
        .collect();
    (by_id.into_values().collect(), added)
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;

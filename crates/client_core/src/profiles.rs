use std::sync::Arc;

use shared::domain::{Message, Profile, UserId};
use tracing::{debug, info, warn};

use crate::{backend::MessagingBackend, store::SessionStore};

/// Resolves sender ids against the session's profile cache, filling gaps with one
/// batched backend lookup per prefetch.
pub struct ProfileResolver {
    store: Arc<SessionStore>,
    backend: Arc<dyn MessagingBackend>,
}

impl ProfileResolver {
    pub fn new(store: Arc<SessionStore>, backend: Arc<dyn MessagingBackend>) -> Self {
        Self { store, backend }
    }

    /// Cache lookup only.
    pub async fn resolve(&self, user_id: UserId) -> Option<Profile> {
        self.store.profile(user_id).await
    }

    /// Fetches every distinct, uncached sender of `messages` in a single batch.
    /// Returns how many profiles were stored. Failures are logged, never raised.
    pub async fn prefetch_for_messages(&self, messages: &[Message]) -> usize {
        let missing = self
            .store
            .uncached_profiles(messages.iter().map(|message| message.sender_id))
            .await;
        if missing.is_empty() {
            return 0;
        }

        let profiles = match self.backend.fetch_contacts(&missing).await {
            Ok(profiles) => profiles,
            Err(err) => {
                warn!(requested = missing.len(), "profiles: batch lookup failed: {err:#}");
                return 0;
            }
        };

        let stored = profiles.len();
        if stored < missing.len() {
            debug!(
                requested = missing.len(),
                returned = stored,
                "profiles: partial batch; unresolved senders stay unknown"
            );
        }
        self.store.put_profiles(profiles).await;
        info!(requested = missing.len(), stored, "profiles: batch resolved");
        stored
    }
}

#[cfg(test)]
#[path = "tests/profiles_tests.rs"]
mod tests;

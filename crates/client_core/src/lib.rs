//! Synchronization core of a messaging client: one authenticated user's chats, message
//! logs and contact profiles, kept consistent across push events and paginated fetches.

use std::{collections::HashMap, sync::Arc};

use shared::{
    domain::{AttachmentDescriptor, Chat, ChatId, Message, MessageId, Profile, UserId},
    protocol::EncodedAttachment,
};
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

pub mod attachments;
pub mod auth;
pub mod backend;
pub mod config;
pub mod error;
pub mod history;
pub mod ingest;
pub mod notify;
pub mod profiles;
pub mod store;

pub use attachments::AttachmentGateway;
pub use auth::{Authenticator, CredentialStore, MemoryCredentialStore};
pub use backend::MessagingBackend;
pub use config::{load_settings, SessionConfig};
pub use error::SyncError;
pub use history::HistoryController;
pub use ingest::{EventPipeline, IngestOutcome};
pub use notify::{NoopNotifier, Notification, Notifier, PresentationNotifier, ScrollHint};
pub use profiles::ProfileResolver;
pub use store::SessionStore;

/// The session aggregate. All reads and writes of cached state go through it.
pub struct Session {
    config: SessionConfig,
    backend: Arc<dyn MessagingBackend>,
    store: Arc<SessionStore>,
    profiles: Arc<ProfileResolver>,
    history: HistoryController,
    attachments: AttachmentGateway,
    auth: Authenticator,
    notifier: Notifier,
    notify_task: JoinHandle<()>,
    ingest_task: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Must be called from within a Tokio runtime.
    pub fn new(
        config: SessionConfig,
        backend: Arc<dyn MessagingBackend>,
        credentials: Arc<dyn CredentialStore>,
        observer: Arc<dyn PresentationNotifier>,
    ) -> Self {
        let store = Arc::new(SessionStore::new());
        let profiles = Arc::new(ProfileResolver::new(
            Arc::clone(&store),
            Arc::clone(&backend),
        ));
        let history = HistoryController::new(
            Arc::clone(&store),
            Arc::clone(&backend),
            Arc::clone(&profiles),
            config.history_page_size,
        );
        let attachments = AttachmentGateway::new(Arc::clone(&backend), config.download_timeout());
        let auth = Authenticator::new(
            Arc::clone(&backend),
            credentials,
            config.credential_service.clone(),
            config.credential_key.clone(),
        );
        let (notifier, notify_task) = Notifier::spawn(observer);

        Self {
            config,
            backend,
            store,
            profiles,
            history,
            attachments,
            auth,
            notifier,
            notify_task,
            ingest_task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth.is_authenticated()
    }

    /// Signs in with the stored token, if there is one, and starts push ingestion.
    pub async fn restore(&self) -> bool {
        match self.auth.restore().await {
            Ok(true) => {
                self.start_ingestion().await;
                true
            }
            Ok(false) => false,
            Err(err) => {
                warn!("session: restoring stored credentials failed: {err}");
                false
            }
        }
    }

    pub async fn start_verification(&self, phone: &str) -> Result<(), SyncError> {
        self.auth.start_verification(phone).await
    }

    /// Completes verification. The outcome is also announced to the presentation layer.
    pub async fn confirm_verification(&self, code: &str) -> bool {
        let success = match self.auth.confirm_verification(code).await {
            Ok(()) => {
                self.start_ingestion().await;
                true
            }
            Err(err) => {
                warn!("session: verification failed: {err}");
                false
            }
        };
        self.notifier.send(Notification::AuthStateChanged(success));
        success
    }

    /// Opens a push queue, hands its sender to the backend and starts draining it. A
    /// pipeline that is still running is kept, so events already queued are not lost.
    pub async fn start_ingestion(&self) {
        let mut slot = self.ingest_task.lock().await;
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            debug!("session: push ingestion already running");
            return;
        }
        let (tx, rx) = mpsc::channel(self.config.event_queue_capacity);
        self.backend.register_event_sink(tx);
        let pipeline = EventPipeline::new(Arc::clone(&self.store), self.notifier.clone());
        *slot = Some(pipeline.spawn(rx));
        info!("session: push ingestion started");
    }

    /// Replaces the chat cache and subscribes to every chat. Empty on failure, with the
    /// previous cache left in place.
    pub async fn load_chats(&self) -> HashMap<ChatId, Chat> {
        let chats = match self.backend.list_chats().await {
            Ok(chats) => chats,
            Err(err) => {
                warn!("session: chat list fetch failed: {err:#}");
                return HashMap::new();
            }
        };
        self.store.set_chats(chats.clone()).await;

        let results = futures::future::join_all(chats.keys().map(|chat_id| async move {
            (*chat_id, self.backend.subscribe(*chat_id).await)
        }))
        .await;
        for (chat_id, result) in results {
            if let Err(err) = result {
                warn!(chat_id = chat_id.0, "session: subscribe failed: {err:#}");
            }
        }

        info!(count = chats.len(), "session: chats loaded");
        self.notifier.send(Notification::ChatsLoaded(chats.clone()));
        chats
    }

    pub async fn navigate_to_chat(&self, chat_id: ChatId) -> bool {
        if let Err(err) = self.history.navigate_to_chat(chat_id).await {
            warn!(chat_id = chat_id.0, "session: navigation failed: {err}");
            return false;
        }
        self.notify_history(chat_id, ScrollHint::Bottom).await;
        true
    }

    pub async fn load_older(&self, chat_id: ChatId) -> Vec<Message> {
        let added = self.history.load_older(chat_id).await;
        if !added.is_empty() {
            self.notify_history(chat_id, ScrollHint::Preserve).await;
        }
        added
    }

    /// Sends `text` to the active chat and merges the echoed message into its log.
    pub async fn send(&self, text: &str) -> Option<Message> {
        match self.send_to_active_chat(text).await {
            Ok(message) => Some(message),
            Err(err) => {
                warn!("session: send failed: {err}");
                None
            }
        }
    }

    async fn send_to_active_chat(&self, text: &str) -> Result<Message, SyncError> {
        let chat_id = self
            .store
            .active_chat()
            .await
            .ok_or(SyncError::NoActiveChat)?;
        let message = self.backend.send_message(chat_id, text).await?;
        self.store
            .merge_messages(chat_id, vec![message.clone()])
            .await;
        info!(
            chat_id = chat_id.0,
            message_id = message.id.0,
            "session: message sent"
        );
        self.notify_history(chat_id, ScrollHint::Bottom).await;
        Ok(message)
    }

    pub async fn get_attachment(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        descriptor: &AttachmentDescriptor,
    ) -> Option<EncodedAttachment> {
        self.attachments
            .get_attachment(chat_id, message_id, descriptor)
            .await
    }

    pub async fn resolve_profile(&self, user_id: UserId) -> Option<Profile> {
        self.profiles.resolve(user_id).await
    }

    /// Profiles for every sender in the chat's log, fetching uncached ones in one batch.
    /// Unresolvable senders are absent from the map.
    pub async fn chat_profiles(&self, chat_id: ChatId) -> HashMap<UserId, Profile> {
        let log = self.store.log(chat_id).await;
        self.profiles.prefetch_for_messages(&log).await;

        let mut profiles = HashMap::new();
        for message in &log {
            if profiles.contains_key(&message.sender_id) {
                continue;
            }
            if let Some(profile) = self.profiles.resolve(message.sender_id).await {
                profiles.insert(message.sender_id, profile);
            }
        }
        profiles
    }

    pub async fn active_chat(&self) -> Option<ChatId> {
        self.store.active_chat().await
    }

    pub async fn messages(&self, chat_id: ChatId) -> Vec<Message> {
        self.store.log(chat_id).await
    }

    pub async fn chats(&self) -> HashMap<ChatId, Chat> {
        self.store.chats().await
    }

    /// Stops ingestion and notification delivery and closes the backend.
    pub async fn shutdown(&self) {
        info!("session: shutting down");
        if let Some(task) = self.ingest_task.lock().await.take() {
            task.abort();
        }
        if let Err(err) = self.backend.close().await {
            warn!("session: backend close failed: {err:#}");
        }
        self.notify_task.abort();
    }

    async fn notify_history(&self, chat_id: ChatId, scroll: ScrollHint) {
        let messages = self.store.log(chat_id).await;
        self.notifier.send(Notification::HistoryRefreshed {
            chat_id,
            messages,
            scroll,
        });
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;

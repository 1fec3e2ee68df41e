//! Presentation notification interface and its asynchronous dispatcher.

use std::{
    collections::HashMap,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use shared::domain::{Chat, ChatId, Message};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollHint {
    /// Jump to the newest message.
    Bottom,
    /// Keep the viewport anchored; older messages were prepended.
    Preserve,
}

/// Implemented by whichever UI binding is active.
pub trait PresentationNotifier: Send + Sync {
    fn on_new_message(&self, chat_id: ChatId);
    fn on_chats_loaded(&self, chats: &HashMap<ChatId, Chat>);
    fn on_history_refreshed(&self, chat_id: ChatId, messages: &[Message], scroll: ScrollHint);
    fn on_auth_state_changed(&self, success: bool);
}

pub struct NoopNotifier;

impl PresentationNotifier for NoopNotifier {
    fn on_new_message(&self, _chat_id: ChatId) {}
    fn on_chats_loaded(&self, _chats: &HashMap<ChatId, Chat>) {}
    fn on_history_refreshed(&self, _chat_id: ChatId, _messages: &[Message], _scroll: ScrollHint) {}
    fn on_auth_state_changed(&self, _success: bool) {}
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    NewMessage {
        chat_id: ChatId,
    },
    ChatsLoaded(HashMap<ChatId, Chat>),
    HistoryRefreshed {
        chat_id: ChatId,
        messages: Vec<Message>,
        scroll: ScrollHint,
    },
    AuthStateChanged(bool),
}

impl Notification {
    fn kind(&self) -> &'static str {
        match self {
            Self::NewMessage { .. } => "new_message",
            Self::ChatsLoaded(_) => "chats_loaded",
            Self::HistoryRefreshed { .. } => "history_refreshed",
            Self::AuthStateChanged(_) => "auth_state_changed",
        }
    }
}

/// Fire-and-forget handle; notifications reach the observer in send order on a
/// dedicated dispatcher task.
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl Notifier {
    /// Must be called from within a Tokio runtime.
    pub fn spawn(observer: Arc<dyn PresentationNotifier>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Notification>();
        let task = tokio::spawn(async move {
            while let Some(notification) = rx.recv().await {
                let kind = notification.kind();
                let delivered =
                    catch_unwind(AssertUnwindSafe(|| dispatch(observer.as_ref(), notification)));
                if delivered.is_err() {
                    error!(kind, "notify: observer panicked; continuing");
                }
            }
        });
        (Self { tx }, task)
    }

    pub fn send(&self, notification: Notification) {
        let kind = notification.kind();
        if self.tx.send(notification).is_err() {
            debug!(kind, "notify: dispatcher stopped; dropping notification");
        }
    }
}

fn dispatch(observer: &dyn PresentationNotifier, notification: Notification) {
    match notification {
        Notification::NewMessage { chat_id } => observer.on_new_message(chat_id),
        Notification::ChatsLoaded(chats) => observer.on_chats_loaded(&chats),
        Notification::HistoryRefreshed {
            chat_id,
            messages,
            scroll,
        } => observer.on_history_refreshed(chat_id, &messages, scroll),
        Notification::AuthStateChanged(success) => observer.on_auth_state_changed(success),
    }
}

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use shared::{
    domain::{Chat, ChatId, Message, MessageId, Profile, UserId},
    protocol::PushEvent,
};
use tokio::sync::mpsc;

/// Wire-protocol client the session is built on. Implementations own transport and
/// handshake; every method may fail with a transport error.
#[async_trait]
pub trait MessagingBackend: Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<()>;
    async fn start_verification(&self, phone: &str) -> Result<()>;
    /// `None` when the code was rejected.
    async fn confirm_verification(&self, code: &str) -> Result<Option<String>>;
    /// Newest `count` messages, or the `count` messages strictly before `before_time`.
    async fn fetch_history(
        &self,
        chat_id: ChatId,
        count: u32,
        before_time: Option<i64>,
    ) -> Result<Vec<Message>>;
    async fn send_message(&self, chat_id: ChatId, text: &str) -> Result<Message>;
    async fn mark_read(&self, chat_id: ChatId, last_message_id: MessageId) -> Result<()>;
    async fn list_chats(&self) -> Result<HashMap<ChatId, Chat>>;
    async fn subscribe(&self, chat_id: ChatId) -> Result<()>;
    async fn fetch_contacts(&self, user_ids: &[UserId]) -> Result<Vec<Profile>>;
    async fn fetch_video(&self, video_id: &str) -> Result<Vec<u8>>;
    /// File bytes and the filename the backend stores them under.
    async fn fetch_file(
        &self,
        file_id: &str,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<(Vec<u8>, String)>;
    /// Hands the backend the producer side of the push queue. The backend forwards each
    /// push event into it from its own notification context and never touches session
    /// state directly. A later registration replaces the earlier one.
    fn register_event_sink(&self, sink: mpsc::Sender<PushEvent>);
    async fn close(&self) -> Result<()>;
}

//! Test doubles shared by the unit test modules.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{Arc, Mutex as StdMutex},
    time::Duration,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{
    domain::{Chat, ChatId, Message, MessageId, Profile, ProfileName, UserId},
    protocol::PushEvent,
};
use tokio::sync::{mpsc, Mutex, Semaphore};

use crate::{
    backend::MessagingBackend,
    notify::{Notification, PresentationNotifier, ScrollHint},
};

pub(crate) fn msg(chat_id: i64, id: i64, sender: i64, time: i64) -> Message {
    Message {
        id: MessageId(id),
        chat_id: ChatId(chat_id),
        sender_id: UserId(sender),
        text: format!("message {id}"),
        time,
        attachments: Vec::new(),
    }
}

pub(crate) fn profile(user_id: i64, name: &str) -> Profile {
    Profile {
        user_id: UserId(user_id),
        names: vec![ProfileName {
            name: Some(name.to_string()),
            ..ProfileName::default()
        }],
        extra: Default::default(),
    }
}

pub(crate) fn chat(chat_id: i64, title: &str) -> Chat {
    Chat {
        id: ChatId(chat_id),
        title: title.to_string(),
        extra: Default::default(),
    }
}

pub(crate) fn ids(messages: &[Message]) -> Vec<i64> {
    messages.iter().map(|message| message.id.0).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HistoryCall {
    pub chat_id: ChatId,
    pub count: u32,
    pub before_time: Option<i64>,
}

/// Scriptable backend. History responses are taken from `history_pages` in call order;
/// an exhausted script answers with an empty page.
#[derive(Default)]
pub(crate) struct FakeBackend {
    pub history_pages: Mutex<VecDeque<Result<Vec<Message>, String>>>,
    pub history_calls: Mutex<Vec<HistoryCall>>,
    pub history_gate: Mutex<Option<Arc<Semaphore>>>,
    pub mark_read_calls: Mutex<Vec<(ChatId, MessageId)>>,
    pub contacts: Mutex<HashMap<UserId, Profile>>,
    pub contact_calls: Mutex<Vec<Vec<UserId>>>,
    pub fail_contacts: Mutex<bool>,
    pub chats: Mutex<Option<HashMap<ChatId, Chat>>>,
    pub subscribe_calls: Mutex<Vec<ChatId>>,
    pub fail_subscribe_for: Mutex<HashSet<ChatId>>,
    pub sent: Mutex<Vec<(ChatId, String)>>,
    pub fail_send: Mutex<bool>,
    pub videos: Mutex<HashMap<String, Vec<u8>>>,
    pub files: Mutex<HashMap<String, (Vec<u8>, String)>>,
    pub file_calls: Mutex<Vec<(String, ChatId, MessageId)>>,
    pub verification_phones: Mutex<Vec<String>>,
    pub token_for_code: Mutex<HashMap<String, String>>,
    pub authenticated_tokens: Mutex<Vec<String>>,
    pub reject_tokens: Mutex<HashSet<String>>,
    pub closed: Mutex<bool>,
    pub event_sink: StdMutex<Option<mpsc::Sender<PushEvent>>>,
}

impl FakeBackend {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) async fn push_page(&self, page: Vec<Message>) {
        self.history_pages.lock().await.push_back(Ok(page));
    }

    pub(crate) async fn push_failure(&self, reason: &str) {
        self.history_pages
            .lock()
            .await
            .push_back(Err(reason.to_string()));
    }

    pub(crate) async fn history_call_count(&self) -> usize {
        self.history_calls.lock().await.len()
    }

    pub(crate) fn sink(&self) -> Option<mpsc::Sender<PushEvent>> {
        self.event_sink.lock().expect("sink lock").clone()
    }
}

#[async_trait]
impl MessagingBackend for FakeBackend {
    async fn authenticate(&self, token: &str) -> Result<()> {
        if self.reject_tokens.lock().await.contains(token) {
            return Err(anyhow!("token rejected"));
        }
        self.authenticated_tokens
            .lock()
            .await
            .push(token.to_string());
        Ok(())
    }

    async fn start_verification(&self, phone: &str) -> Result<()> {
        if phone.is_empty() {
            return Err(anyhow!("phone must not be empty"));
        }
        self.verification_phones
            .lock()
            .await
            .push(phone.to_string());
        Ok(())
    }

    async fn confirm_verification(&self, code: &str) -> Result<Option<String>> {
        Ok(self.token_for_code.lock().await.get(code).cloned())
    }

    async fn fetch_history(
        &self,
        chat_id: ChatId,
        count: u32,
        before_time: Option<i64>,
    ) -> Result<Vec<Message>> {
        let scripted = self.history_pages.lock().await.pop_front();
        self.history_calls.lock().await.push(HistoryCall {
            chat_id,
            count,
            before_time,
        });
        let gate = self.history_gate.lock().await.clone();
        if let Some(gate) = gate {
            let _permit = gate.acquire().await?;
        }
        match scripted {
            Some(Ok(page)) => Ok(page),
            Some(Err(reason)) => Err(anyhow!(reason)),
            None => Ok(Vec::new()),
        }
    }

    async fn send_message(&self, chat_id: ChatId, text: &str) -> Result<Message> {
        if *self.fail_send.lock().await {
            return Err(anyhow!("send rejected"));
        }
        let mut sent = self.sent.lock().await;
        sent.push((chat_id, text.to_string()));
        let mut message = msg(chat_id.0, 1000 + sent.len() as i64, 1, 5000);
        message.text = text.to_string();
        Ok(message)
    }

    async fn mark_read(&self, chat_id: ChatId, last_message_id: MessageId) -> Result<()> {
        self.mark_read_calls
            .lock()
            .await
            .push((chat_id, last_message_id));
        Ok(())
    }

    async fn list_chats(&self) -> Result<HashMap<ChatId, Chat>> {
        self.chats
            .lock()
            .await
            .clone()
            .ok_or_else(|| anyhow!("chat list unavailable"))
    }

    async fn subscribe(&self, chat_id: ChatId) -> Result<()> {
        self.subscribe_calls.lock().await.push(chat_id);
        if self.fail_subscribe_for.lock().await.contains(&chat_id) {
            return Err(anyhow!("subscribe refused for chat {chat_id}"));
        }
        Ok(())
    }

    async fn fetch_contacts(&self, user_ids: &[UserId]) -> Result<Vec<Profile>> {
        self.contact_calls.lock().await.push(user_ids.to_vec());
        if *self.fail_contacts.lock().await {
            return Err(anyhow!("contacts lookup failed"));
        }
        let contacts = self.contacts.lock().await;
        Ok(user_ids
            .iter()
            .filter_map(|user_id| contacts.get(user_id).cloned())
            .collect())
    }

    async fn fetch_video(&self, video_id: &str) -> Result<Vec<u8>> {
        self.videos
            .lock()
            .await
            .get(video_id)
            .cloned()
            .ok_or_else(|| anyhow!("video {video_id} not found"))
    }

    async fn fetch_file(
        &self,
        file_id: &str,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<(Vec<u8>, String)> {
        self.file_calls
            .lock()
            .await
            .push((file_id.to_string(), chat_id, message_id));
        self.files
            .lock()
            .await
            .get(file_id)
            .cloned()
            .ok_or_else(|| anyhow!("file {file_id} not found"))
    }

    fn register_event_sink(&self, sink: mpsc::Sender<PushEvent>) {
        *self.event_sink.lock().expect("sink lock") = Some(sink);
    }

    async fn close(&self) -> Result<()> {
        *self.closed.lock().await = true;
        Ok(())
    }
}

/// Forwards every callback into a channel the test can await.
pub(crate) struct RecordingNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl RecordingNotifier {
    pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl PresentationNotifier for RecordingNotifier {
    fn on_new_message(&self, chat_id: ChatId) {
        let _ = self.tx.send(Notification::NewMessage { chat_id });
    }

    fn on_chats_loaded(&self, chats: &HashMap<ChatId, Chat>) {
        let _ = self.tx.send(Notification::ChatsLoaded(chats.clone()));
    }

    fn on_history_refreshed(&self, chat_id: ChatId, messages: &[Message], scroll: ScrollHint) {
        let _ = self.tx.send(Notification::HistoryRefreshed {
            chat_id,
            messages: messages.to_vec(),
            scroll,
        });
    }

    fn on_auth_state_changed(&self, success: bool) {
        let _ = self.tx.send(Notification::AuthStateChanged(success));
    }
}

pub(crate) async fn next_notification(
    rx: &mut mpsc::UnboundedReceiver<Notification>,
) -> Notification {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("notification within timeout")
        .expect("notifier channel open")
}

/// Polls `condition` until it holds or two seconds pass.
pub(crate) async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition within timeout");
}

use std::{
    collections::{HashMap, HashSet},
    fs,
    path::Path,
    sync::Mutex as StdMutex,
};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use client_core::MessagingBackend;
use serde::Deserialize;
use shared::{
    domain::{Chat, ChatId, Message, MessageId, Profile, UserId},
    protocol::PushEvent,
};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fixture {
    /// Id the fixture user sends as.
    #[serde(default)]
    pub self_id: i64,
    /// Tokens `authenticate` accepts, besides those issued through `codes`.
    #[serde(default)]
    pub tokens: Vec<String>,
    /// Verification code to issued token.
    #[serde(default)]
    pub codes: HashMap<String, String>,
    #[serde(default)]
    pub chats: Vec<Chat>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub contacts: Vec<Profile>,
    /// Video id to base64 content.
    #[serde(default)]
    pub videos: HashMap<String, String>,
    #[serde(default)]
    pub files: HashMap<String, FixtureFile>,
    /// Push events replayed by `FixtureBackend::replay_events`.
    #[serde(default)]
    pub events: Vec<PushEvent>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureFile {
    pub filename: String,
    pub content_b64: String,
}

impl Fixture {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read fixture {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parse fixture {}", path.display()))
    }
}

/// In-process backend answering from a JSON fixture.
pub struct FixtureBackend {
    fixture: Fixture,
    sent: Mutex<Vec<Message>>,
    subscribed: Mutex<HashSet<ChatId>>,
    sink: StdMutex<Option<mpsc::Sender<PushEvent>>>,
}

impl FixtureBackend {
    pub fn new(fixture: Fixture) -> Self {
        Self {
            fixture,
            sent: Mutex::new(Vec::new()),
            subscribed: Mutex::new(HashSet::new()),
            sink: StdMutex::new(None),
        }
    }

    /// Pushes every scripted event into the registered sink. Returns how many were queued.
    pub async fn replay_events(&self) -> Result<usize> {
        let sink = self
            .sink
            .lock()
            .map_err(|_| anyhow!("event sink lock poisoned"))?
            .clone()
            .ok_or_else(|| anyhow!("no event sink registered"))?;
        let subscribed = self.subscribed.lock().await.clone();
        let mut queued = 0;
        for event in &self.fixture.events {
            if let Some(chat_id) = event_chat(event) {
                if !subscribed.contains(&chat_id) {
                    debug!(chat_id = chat_id.0, "fixture: skipping event for unsubscribed chat");
                    continue;
                }
            }
            sink.send(event.clone())
                .await
                .map_err(|_| anyhow!("event queue closed"))?;
            queued += 1;
        }
        Ok(queued)
    }

    async fn chat_messages(&self, chat_id: ChatId) -> Vec<Message> {
        let sent = self.sent.lock().await;
        let mut messages: Vec<Message> = self
            .fixture
            .messages
            .iter()
            .chain(sent.iter())
            .filter(|message| message.chat_id == chat_id)
            .cloned()
            .collect();
        messages.sort_by_key(|message| (message.time, message.id));
        messages
    }
}

fn event_chat(event: &PushEvent) -> Option<ChatId> {
    event.payload.get("chatId")?.as_i64().map(ChatId)
}

#[async_trait]
impl MessagingBackend for FixtureBackend {
    async fn authenticate(&self, token: &str) -> Result<()> {
        let known = self.fixture.tokens.iter().any(|known| known == token)
            || self.fixture.codes.values().any(|issued| issued == token);
        if !known {
            return Err(anyhow!("token rejected"));
        }
        info!("fixture: authenticated");
        Ok(())
    }

    async fn start_verification(&self, phone: &str) -> Result<()> {
        if phone.trim().is_empty() {
            return Err(anyhow!("phone number required"));
        }
        info!(phone, "fixture: verification code requested");
        Ok(())
    }

    async fn confirm_verification(&self, code: &str) -> Result<Option<String>> {
        Ok(self.fixture.codes.get(code).cloned())
    }

    async fn fetch_history(
        &self,
        chat_id: ChatId,
        count: u32,
        before_time: Option<i64>,
    ) -> Result<Vec<Message>> {
        let mut page: Vec<Message> = self
            .chat_messages(chat_id)
            .await
            .into_iter()
            .filter(|message| before_time.map_or(true, |before| message.time < before))
            .collect();
        let keep = count as usize;
        if page.len() > keep {
            page.drain(..page.len() - keep);
        }
        Ok(page)
    }

    async fn send_message(&self, chat_id: ChatId, text: &str) -> Result<Message> {
        let next_id = self
            .chat_messages(chat_id)
            .await
            .iter()
            .map(|message| message.id.0)
            .max()
            .unwrap_or(0)
            + 1;
        let message = Message {
            id: MessageId(next_id),
            chat_id,
            sender_id: UserId(self.fixture.self_id),
            text: text.to_string(),
            time: chrono::Utc::now().timestamp(),
            attachments: Vec::new(),
        };
        self.sent.lock().await.push(message.clone());
        Ok(message)
    }

    async fn mark_read(&self, chat_id: ChatId, last_message_id: MessageId) -> Result<()> {
        debug!(
            chat_id = chat_id.0,
            message_id = last_message_id.0,
            "fixture: marked read"
        );
        Ok(())
    }

    async fn list_chats(&self) -> Result<HashMap<ChatId, Chat>> {
        Ok(self
            .fixture
            .chats
            .iter()
            .map(|chat| (chat.id, chat.clone()))
            .collect())
    }

    async fn subscribe(&self, chat_id: ChatId) -> Result<()> {
        if !self.fixture.chats.iter().any(|chat| chat.id == chat_id) {
            return Err(anyhow!("unknown chat {chat_id}"));
        }
        self.subscribed.lock().await.insert(chat_id);
        Ok(())
    }

    async fn fetch_contacts(&self, user_ids: &[UserId]) -> Result<Vec<Profile>> {
        Ok(self
            .fixture
            .contacts
            .iter()
            .filter(|profile| user_ids.contains(&profile.user_id))
            .cloned()
            .collect())
    }

    async fn fetch_video(&self, video_id: &str) -> Result<Vec<u8>> {
        let encoded = self
            .fixture
            .videos
            .get(video_id)
            .ok_or_else(|| anyhow!("video {video_id} not found"))?;
        STANDARD
            .decode(encoded)
            .with_context(|| format!("decode video {video_id}"))
    }

    async fn fetch_file(
        &self,
        file_id: &str,
        _chat_id: ChatId,
        _message_id: MessageId,
    ) -> Result<(Vec<u8>, String)> {
        let file = self
            .fixture
            .files
            .get(file_id)
            .ok_or_else(|| anyhow!("file {file_id} not found"))?;
        let bytes = STANDARD
            .decode(&file.content_b64)
            .with_context(|| format!("decode file {file_id}"))?;
        Ok((bytes, file.filename.clone()))
    }

    fn register_event_sink(&self, sink: mpsc::Sender<PushEvent>) {
        if let Ok(mut slot) = self.sink.lock() {
            *slot = Some(sink);
        }
    }

    async fn close(&self) -> Result<()> {
        if let Ok(mut slot) = self.sink.lock() {
            slot.take();
        }
        Ok(())
    }
}

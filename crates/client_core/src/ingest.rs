//! Push-event ingestion. The backend only enqueues events; this pipeline is the single
//! consumer and the only place push data reaches the store.

use std::{panic::AssertUnwindSafe, sync::Arc};

use futures::FutureExt;
use serde_json::Value;
use shared::{
    domain::{ChatId, Message},
    protocol::{opcode, PushEvent},
};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info};

use crate::{
    error::SyncError,
    notify::{Notification, Notifier},
    store::SessionStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// `added` is false when the message id was already in the log.
    Merged { chat_id: ChatId, added: bool },
    Ignored { opcode: u16 },
}

pub struct EventPipeline {
    store: Arc<SessionStore>,
    notifier: Notifier,
}

impl EventPipeline {
    pub fn new(store: Arc<SessionStore>, notifier: Notifier) -> Self {
        Self { store, notifier }
    }

    /// Drains `events` in arrival order until every sender is dropped.
    pub fn spawn(self, mut events: mpsc::Receiver<PushEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let opcode = event.opcode;
                match AssertUnwindSafe(self.handle(event)).catch_unwind().await {
                    Ok(Ok(_)) => {}
                    Ok(Err(err)) => debug!(opcode, "ingest: dropped event: {err}"),
                    Err(_) => error!(opcode, "ingest: event handler panicked; continuing"),
                }
            }
            info!("ingest: event channel closed");
        })
    }

    pub async fn handle(&self, event: PushEvent) -> Result<IngestOutcome, SyncError> {
        match event.opcode {
            opcode::NEW_MESSAGE => self.handle_new_message(event.payload).await,
            other => {
                debug!(opcode = other, payload = %event.payload, "ingest: unhandled opcode");
                Ok(IngestOutcome::Ignored { opcode: other })
            }
        }
    }

    async fn handle_new_message(&self, payload: Value) -> Result<IngestOutcome, SyncError> {
        let (chat_id, message) = parse_new_message(payload)?;
        let message_id = message.id;
        let added = !self.store.merge_messages(chat_id, vec![message]).await.is_empty();

        if added {
            debug!(
                chat_id = chat_id.0,
                message_id = message_id.0,
                "ingest: new message merged"
            );
            self.notifier.send(Notification::NewMessage { chat_id });
        } else {
            debug!(
                chat_id = chat_id.0,
                message_id = message_id.0,
                "ingest: redelivered message ignored"
            );
        }
        Ok(IngestOutcome::Merged { chat_id, added })
    }
}

fn parse_new_message(payload: Value) -> Result<(ChatId, Message), SyncError> {
    let Value::Object(mut payload) = payload else {
        return Err(SyncError::validation("new message payload is not an object"));
    };
    let chat_id = payload
        .get("chatId")
        .and_then(chat_id_from_value)
        .ok_or_else(|| SyncError::validation("new message payload missing chatId"))?;
    let mut message = match payload.remove("message") {
        Some(Value::Object(message)) => message,
        _ => return Err(SyncError::validation("new message payload missing message")),
    };
    message.insert("chatId".into(), Value::from(chat_id.0));

    let message = serde_json::from_value::<Message>(Value::Object(message))
        .map_err(|err| SyncError::validation(format!("malformed message: {err}")))?;
    Ok((chat_id, message))
}

fn chat_id_from_value(value: &Value) -> Option<ChatId> {
    match value {
        Value::Number(number) => number.as_i64().map(ChatId),
        Value::String(raw) => raw.trim().parse().ok().map(ChatId),
        _ => None,
    }
}

#[cfg(test)]
#[path = "tests/ingest_tests.rs"]
mod tests;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Push opcodes understood by the client. Anything else is passed over.
pub mod opcode {
    pub const NEW_MESSAGE: u16 = 128;
}

/// One asynchronously delivered notification from the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushEvent {
    pub opcode: u16,
    #[serde(default)]
    pub payload: Value,
}

impl PushEvent {
    pub fn new(opcode: u16, payload: Value) -> Self {
        Self { opcode, payload }
    }
}

/// Downloaded attachment, ready to hand to a presentation layer without further I/O.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedAttachment {
    pub mime_type: String,
    pub filename: String,
    pub content_b64: String,
}

impl EncodedAttachment {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.content_b64)
    }
}

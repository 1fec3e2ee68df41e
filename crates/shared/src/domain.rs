use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(ChatId);
id_newtype!(MessageId);
id_newtype!(UserId);

/// Display name used when a sender profile could not be resolved.
pub const UNKNOWN_SENDER: &str = "unknown";

/// Reference to a media item carried by a message. Holds no downloaded bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AttachmentDescriptor {
    #[serde(alias = "PHOTO")]
    Photo {
        #[serde(
            default,
            rename = "baseUrl",
            deserialize_with = "opaque_id",
            skip_serializing_if = "Option::is_none"
        )]
        base_url: Option<String>,
    },
    #[serde(alias = "VIDEO")]
    Video {
        #[serde(
            default,
            rename = "videoId",
            deserialize_with = "opaque_id",
            skip_serializing_if = "Option::is_none"
        )]
        video_id: Option<String>,
    },
    #[serde(alias = "FILE")]
    File {
        #[serde(
            default,
            rename = "fileId",
            deserialize_with = "opaque_id",
            skip_serializing_if = "Option::is_none"
        )]
        file_id: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

/// Attachment references arrive as strings or bare numbers depending on the server
/// build. Other shapes read as absent and fail at fetch time instead of here.
fn opaque_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(raw) => Some(raw),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    })
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    #[serde(alias = "sender")]
    pub sender_id: UserId,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub text: String,
    /// Unix seconds.
    pub time: i64,
    #[serde(default, alias = "attaches")]
    pub attachments: Vec<AttachmentDescriptor>,
}

impl Message {
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.time, 0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    #[serde(default)]
    pub title: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileName {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

impl ProfileName {
    fn render(&self) -> Option<String> {
        if let Some(name) = self.name.as_deref().filter(|name| !name.trim().is_empty()) {
            return Some(name.trim().to_string());
        }
        let parts = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>();
        (!parts.is_empty()).then(|| parts.join(" "))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(alias = "id")]
    pub user_id: UserId,
    #[serde(default)]
    pub names: Vec<ProfileName>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Profile {
    pub fn display_name(&self) -> String {
        self.names
            .iter()
            .find_map(ProfileName::render)
            .unwrap_or_else(|| UNKNOWN_SENDER.to_string())
    }
}

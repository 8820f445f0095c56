//! Message protocol definitions
//!
//! JSON-based bidirectional message protocol using Serde's tagged enum
//! for type-safe serialization/deserialization.

use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::AppError;
use crate::types::MessageId;

/// A serialized server event, shared by every outbound queue it is placed on
pub type Payload = Arc<str>;

/// Client → Server message
///
/// Anything that does not parse into one of these variants is dropped
/// by the session without a reply.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Pick a nickname and join a room
    Login {
        #[serde(default, deserialize_with = "lenient_string")]
        nick: Option<String>,
        #[serde(default, deserialize_with = "lenient_string")]
        channel: Option<String>,
    },
    /// Chat message; `data` is relayed untouched
    Message { data: Value },
    /// Typing indicator
    Typing { typing: bool },
}

/// Accept any JSON value, keeping it only when it is a string
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => Some(s),
        _ => None,
    })
}

/// Body of a `new-msg` event
#[derive(Debug, Clone, Serialize)]
pub struct ChatRecord {
    pub id: MessageId,
    /// Sender nickname
    #[serde(rename = "f")]
    pub from: String,
    /// Unix time in milliseconds
    #[serde(rename = "t")]
    pub timestamp_ms: i64,
    #[serde(rename = "m")]
    pub data: Value,
}

/// Server → Client message
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Current members of the room
    #[serde(rename = "userlist")]
    UserList { users: Vec<String> },
    /// Chat message relayed to the room
    #[serde(rename = "new-msg")]
    NewMessage { message: ChatRecord },
    /// Someone in the room started or stopped typing
    #[serde(rename = "typing")]
    Typing { user: String, typing: bool },
    /// Server-wide announcement
    #[serde(rename = "notice")]
    Notice { text: String },
}

/// Serialize a server event once for fan-out
pub fn encode(msg: &ServerMessage) -> Result<Payload, AppError> {
    let json = serde_json::to_string(msg)?;
    Ok(Payload::from(json))
}

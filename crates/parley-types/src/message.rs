//! Message types for Parley conversations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

use crate::conversation::ConversationId;
use crate::identity::{Party, Role};

/// Unique identifier for a message, wrapping a UUID v7 (time-sortable).
///
/// Two messages with equal `created_at` are ordered by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Payload kind of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    File,
    System,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::Text => write!(f, "text"),
            MessageType::Image => write!(f, "image"),
            MessageType::File => write!(f, "file"),
            MessageType::System => write!(f, "system"),
        }
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(MessageType::Text),
            "image" => Ok(MessageType::Image),
            "file" => Ok(MessageType::File),
            "system" => Ok(MessageType::System),
            other => Err(format!("invalid message type: '{other}'")),
        }
    }
}

impl Default for MessageType {
    fn default() -> Self {
        MessageType::Text
    }
}

/// A single message within a conversation.
///
/// Messages are never hard-deleted. Read state is only set by a party other
/// than the sender; soft-deleted messages are hidden from default listings
/// and from unread counting but kept for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: String,
    pub sender_name: String,
    pub sender_role: Role,
    pub content: String,
    pub message_type: MessageType,
    /// Opaque URL handed over by the upload service.
    pub attachment_url: Option<String>,
    pub attachment_name: Option<String>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Build an unread, undeleted message from a send request.
    pub fn new(input: &NewMessage, now: DateTime<Utc>) -> Self {
        Self {
            id: MessageId::new(),
            conversation_id: input.conversation_id,
            sender_id: input.sender_id.clone(),
            sender_name: input.sender_name.clone(),
            sender_role: input.sender_role,
            content: input.content.clone(),
            message_type: input.message_type,
            attachment_url: input.attachment_url.clone(),
            attachment_name: input.attachment_name.clone(),
            is_read: false,
            read_at: None,
            is_deleted: false,
            deleted_at: None,
            deleted_by: None,
            created_at: now,
        }
    }

    /// The side whose unread counter this message feeds.
    ///
    /// Admin messages are system annotations and feed neither counter.
    pub fn recipient(&self) -> Option<Party> {
        self.sender_role.party().map(Party::other)
    }

    /// Whether this message currently counts as unread for its recipient.
    pub fn counts_as_unread(&self) -> bool {
        !self.is_read && !self.is_deleted && self.recipient().is_some()
    }
}

/// Request to send a message into a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    pub conversation_id: ConversationId,
    pub sender_id: String,
    pub sender_name: String,
    pub sender_role: Role,
    pub content: String,
    #[serde(default)]
    pub message_type: MessageType,
    pub attachment_url: Option<String>,
    pub attachment_name: Option<String>,
}

/// Truncate message content to a preview of at most `max_chars` characters.
///
/// Counts Unicode scalar values, so multi-byte text is never split mid-character.
pub fn preview(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => content[..byte_idx].to_string(),
        None => content.to_string(),
    }
}

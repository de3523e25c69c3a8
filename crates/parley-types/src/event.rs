//! Notification events emitted after a messaging write commits.
//!
//! Events are handed to the notification dispatcher outside the owning
//! transaction. Delivery is at-least-once from the subscriber's point of view
//! and a failed delivery never rolls back the write it describes.

use serde::{Deserialize, Serialize};

use crate::conversation::ConversationId;
use crate::identity::Party;
use crate::message::MessageId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagingEvent {
    /// A message was committed. `recipient_id` is the account to notify,
    /// absent for admin annotations.
    MessageCreated {
        conversation_id: ConversationId,
        message_id: MessageId,
        sender_id: String,
        recipient_id: Option<String>,
        preview: String,
    },

    /// A participant caught up on a conversation.
    ConversationRead {
        conversation_id: ConversationId,
        reader_id: String,
        party: Party,
        marked: u64,
    },

    ConversationFlagged {
        conversation_id: ConversationId,
        flagged_by: String,
        reason: String,
    },

    ConversationUnflagged {
        conversation_id: ConversationId,
        reviewed_by: String,
    },

    ConversationArchived {
        conversation_id: ConversationId,
        archived_by: String,
    },

    MessageDeleted {
        conversation_id: ConversationId,
        message_id: MessageId,
        deleted_by: String,
    },
}

impl MessagingEvent {
    /// The conversation this event concerns.
    pub fn conversation_id(&self) -> ConversationId {
        match self {
            MessagingEvent::MessageCreated { conversation_id, .. }
            | MessagingEvent::ConversationRead { conversation_id, .. }
            | MessagingEvent::ConversationFlagged { conversation_id, .. }
            | MessagingEvent::ConversationUnflagged { conversation_id, .. }
            | MessagingEvent::ConversationArchived { conversation_id, .. }
            | MessagingEvent::MessageDeleted { conversation_id, .. } => *conversation_id,
        }
    }
}

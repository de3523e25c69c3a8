//! Audit trail types.
//!
//! Audit entries are immutable and append-only: there is no update or
//! delete path anywhere in the system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

use crate::conversation::ConversationId;
use crate::identity::{Caller, Role};
use crate::message::MessageId;

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    ConversationCreated,
    ConversationFlagged,
    ConversationUnflagged,
    ConversationArchived,
    MessageDeleted,
    /// Free-form action supplied by an external caller.
    Other(String),
}

impl AuditAction {
    /// Free-form action from an external caller.
    ///
    /// Refuses names that would be stored as a built-in action or that carry
    /// surrounding whitespace, since either would read back as a different
    /// action than the one written.
    pub fn custom(name: impl Into<String>) -> Result<Self, String> {
        let action = AuditAction::Other(name.into());
        if action.is_faithful() {
            Ok(action)
        } else {
            Err(format!("audit action '{action}' is reserved or malformed"))
        }
    }

    /// Whether the stored text of this action parses back to the same action.
    ///
    /// Always true for built-in actions. False for an `Other` that spells a
    /// built-in name, which would otherwise pass for an engine-written entry.
    pub fn is_faithful(&self) -> bool {
        match self {
            AuditAction::Other(_) => self.to_string().parse::<AuditAction>().as_ref() == Ok(self),
            _ => true,
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditAction::ConversationCreated => write!(f, "CONVERSATION_CREATED"),
            AuditAction::ConversationFlagged => write!(f, "CONVERSATION_FLAGGED"),
            AuditAction::ConversationUnflagged => write!(f, "CONVERSATION_UNFLAGGED"),
            AuditAction::ConversationArchived => write!(f, "CONVERSATION_ARCHIVED"),
            AuditAction::MessageDeleted => write!(f, "MESSAGE_DELETED"),
            AuditAction::Other(action) => write!(f, "{action}"),
        }
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err("audit action cannot be empty".to_string());
        }
        Ok(match trimmed {
            "CONVERSATION_CREATED" => AuditAction::ConversationCreated,
            "CONVERSATION_FLAGGED" => AuditAction::ConversationFlagged,
            "CONVERSATION_UNFLAGGED" => AuditAction::ConversationUnflagged,
            "CONVERSATION_ARCHIVED" => AuditAction::ConversationArchived,
            "MESSAGE_DELETED" => AuditAction::MessageDeleted,
            other => AuditAction::Other(other.to_string()),
        })
    }
}

/// One immutable audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub action: AuditAction,
    pub performed_by: String,
    pub performed_by_role: Role,
    pub conversation_id: Option<ConversationId>,
    pub message_id: Option<MessageId>,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    /// Start an entry for an action performed by `caller` at `now`.
    pub fn new(action: AuditAction, caller: &Caller, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            action,
            performed_by: caller.user_id.clone(),
            performed_by_role: caller.role,
            conversation_id: None,
            message_id: None,
            details: None,
            created_at: now,
        }
    }

    pub fn with_conversation(mut self, id: ConversationId) -> Self {
        self.conversation_id = Some(id);
        self
    }

    pub fn with_message(mut self, id: MessageId) -> Self {
        self.message_id = Some(id);
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

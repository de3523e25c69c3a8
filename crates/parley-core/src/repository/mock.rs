//! In-memory repositories for service tests.
//!
//! One `MemoryStore` implements all three repository traits over shared
//! state, so write paths that span a message and its conversation behave
//! like the transactional SQLite adapter: each call applies fully or not at all.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use parley_types::audit::AuditLogEntry;
use parley_types::conversation::{
    Conversation, ConversationId, ConversationKey, ConversationPatch, ConversationStatus,
};
use parley_types::error::RepositoryError;
use parley_types::identity::Party;
use parley_types::message::{Message, MessageId};

use super::audit::AuditRepository;
use super::conversation::{ConversationFilter, ConversationRepository, TransitionOutcome};
use super::message::{MessageFilter, MessageRepository};

#[derive(Default)]
struct State {
    conversations: Vec<Conversation>,
    messages: Vec<Message>,
    audit: Vec<AuditLogEntry>,
}

#[derive(Clone, Default)]
pub(crate) struct MemoryStore {
    state: Arc<Mutex<State>>,
    audit_down: Arc<AtomicBool>,
    conflicts_left: Arc<AtomicU32>,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Make every audit append fail from now on.
    pub(crate) fn break_audit(&self) {
        self.audit_down.store(true, Ordering::SeqCst);
    }

    /// Make the next `n` message inserts fail with a write conflict.
    pub(crate) fn inject_conflicts(&self, n: u32) {
        self.conflicts_left.store(n, Ordering::SeqCst);
    }

    pub(crate) fn audit_entries(&self) -> Vec<AuditLogEntry> {
        self.state.lock().unwrap().audit.clone()
    }

    pub(crate) fn conversation_count(&self) -> usize {
        self.state.lock().unwrap().conversations.len()
    }

    pub(crate) fn messages(&self) -> Vec<Message> {
        self.state.lock().unwrap().messages.clone()
    }

    fn take_conflict(&self) -> bool {
        self.conflicts_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn counter_mut(conv: &mut Conversation, party: Party) -> &mut u32 {
    match party {
        Party::Buyer => &mut conv.unread_count_buyer,
        Party::Vendor => &mut conv.unread_count_vendor,
    }
}

impl ConversationRepository for MemoryStore {
    async fn create_or_get(
        &self,
        conversation: &Conversation,
    ) -> Result<(Conversation, bool), RepositoryError> {
        let mut state = self.state.lock().unwrap();
        let key = conversation.key();
        if let Some(existing) = state.conversations.iter().find(|c| c.key() == key) {
            return Ok((existing.clone(), false));
        }
        state.conversations.push(conversation.clone());
        Ok((conversation.clone(), true))
    }

    async fn find_by_key(
        &self,
        key: &ConversationKey,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let state = self.state.lock().unwrap();
        Ok(state.conversations.iter().find(|c| &c.key() == key).cloned())
    }

    async fn get_by_id(&self, id: &ConversationId) -> Result<Option<Conversation>, RepositoryError> {
        let state = self.state.lock().unwrap();
        Ok(state.conversations.iter().find(|c| &c.id == id).cloned())
    }

    async fn list(&self, filter: &ConversationFilter) -> Result<Vec<Conversation>, RepositoryError> {
        let state = self.state.lock().unwrap();
        let mut rows: Vec<Conversation> = state
            .conversations
            .iter()
            .filter(|c| match &filter.participant {
                Some((party, user_id)) => c.participant(*party) == user_id,
                None => true,
            })
            .filter(|c| match filter.status {
                Some(status) => c.status == status,
                None => !(filter.exclude_closed && c.status == ConversationStatus::Closed),
            })
            .filter(|c| match filter.after {
                Some(cursor) => cursor.precedes(c.updated_at, c.id.0),
                None => true,
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.0.cmp(&a.id.0)));
        rows.truncate(filter.limit as usize);
        Ok(rows)
    }

    async fn update_flags(
        &self,
        id: &ConversationId,
        patch: &ConversationPatch,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let mut state = self.state.lock().unwrap();
        let Some(conv) = state.conversations.iter_mut().find(|c| &c.id == id) else {
            return Ok(None);
        };
        patch.apply(conv);
        conv.updated_at = updated_at;
        Ok(Some(conv.clone()))
    }

    async fn transition(
        &self,
        id: &ConversationId,
        allowed_from: &[ConversationStatus],
        patch: &ConversationPatch,
        updated_at: DateTime<Utc>,
        audit: &AuditLogEntry,
    ) -> Result<TransitionOutcome, RepositoryError> {
        let mut state = self.state.lock().unwrap();
        let Some(conv) = state.conversations.iter_mut().find(|c| &c.id == id) else {
            return Ok(TransitionOutcome::NotFound);
        };
        if !allowed_from.contains(&conv.status) {
            return Ok(TransitionOutcome::Rejected(conv.status));
        }
        patch.apply(conv);
        conv.updated_at = updated_at;
        let updated = conv.clone();
        state.audit.push(audit.clone());
        Ok(TransitionOutcome::Applied(updated))
    }

    async fn unread_total(&self, user_id: &str, party: Party) -> Result<u64, RepositoryError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .conversations
            .iter()
            .filter(|c| c.participant(party) == user_id && c.status != ConversationStatus::Closed)
            .map(|c| u64::from(c.unread_count(party)))
            .sum())
    }

    async fn list_flagged(&self, limit: u32) -> Result<Vec<Conversation>, RepositoryError> {
        let state = self.state.lock().unwrap();
        let mut rows: Vec<Conversation> = state
            .conversations
            .iter()
            .filter(|c| c.status == ConversationStatus::Flagged)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.flagged_at.cmp(&a.flagged_at));
        rows.truncate(limit as usize);
        Ok(rows)
    }
}

impl MessageRepository for MemoryStore {
    async fn create(&self, message: &Message, preview: &str) -> Result<Conversation, RepositoryError> {
        if self.take_conflict() {
            return Err(RepositoryError::Conflict("database is locked".to_string()));
        }
        let mut state = self.state.lock().unwrap();
        let Some(conv) = state
            .conversations
            .iter_mut()
            .find(|c| c.id == message.conversation_id)
        else {
            return Err(RepositoryError::NotFound);
        };
        if conv.status == ConversationStatus::Closed {
            return Err(RepositoryError::Rejected("conversation is closed".to_string()));
        }
        conv.last_message_id = Some(message.id);
        conv.last_message_content = Some(preview.to_string());
        conv.last_message_at = Some(message.created_at);
        conv.last_message_sender_id = Some(message.sender_id.clone());
        conv.updated_at = message.created_at;
        if let Some(recipient) = message.recipient() {
            *counter_mut(conv, recipient) += 1;
        }
        let updated = conv.clone();
        state.messages.push(message.clone());
        Ok(updated)
    }

    async fn get_by_id(&self, id: &MessageId) -> Result<Option<Message>, RepositoryError> {
        let state = self.state.lock().unwrap();
        Ok(state.messages.iter().find(|m| &m.id == id).cloned())
    }

    async fn list(
        &self,
        conversation_id: &ConversationId,
        filter: &MessageFilter,
    ) -> Result<Vec<Message>, RepositoryError> {
        let state = self.state.lock().unwrap();
        let mut rows: Vec<Message> = state
            .messages
            .iter()
            .filter(|m| &m.conversation_id == conversation_id)
            .filter(|m| filter.include_deleted || !m.is_deleted)
            .filter(|m| match filter.after {
                Some(cursor) => cursor.precedes(m.created_at, m.id.0),
                None => true,
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.0.cmp(&a.id.0)));
        rows.truncate(filter.limit as usize);
        Ok(rows)
    }

    async fn mark_read(&self, id: &MessageId, read_at: DateTime<Utc>) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock().unwrap();
        match state.messages.iter_mut().find(|m| &m.id == id && !m.is_read) {
            Some(msg) => {
                msg.is_read = true;
                msg.read_at = Some(read_at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_conversation_read(
        &self,
        conversation_id: &ConversationId,
        reader: Party,
        reader_id: &str,
        read_at: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let mut state = self.state.lock().unwrap();
        if !state.conversations.iter().any(|c| &c.id == conversation_id) {
            return Err(RepositoryError::NotFound);
        }
        let mut marked = 0;
        for msg in state.messages.iter_mut().filter(|m| {
            &m.conversation_id == conversation_id && !m.is_read && m.sender_id != reader_id
        }) {
            msg.is_read = true;
            msg.read_at = Some(read_at);
            marked += 1;
        }
        if let Some(conv) = state.conversations.iter_mut().find(|c| &c.id == conversation_id) {
            *counter_mut(conv, reader) = 0;
        }
        Ok(marked)
    }

    async fn soft_delete(
        &self,
        id: &MessageId,
        deleted_by: &str,
        deleted_at: DateTime<Utc>,
    ) -> Result<Option<Message>, RepositoryError> {
        let mut state = self.state.lock().unwrap();
        let Some(msg) = state.messages.iter_mut().find(|m| &m.id == id) else {
            return Ok(None);
        };
        if msg.is_deleted {
            return Ok(Some(msg.clone()));
        }
        let correction = msg.counts_as_unread().then(|| msg.recipient()).flatten();
        msg.is_deleted = true;
        msg.deleted_at = Some(deleted_at);
        msg.deleted_by = Some(deleted_by.to_string());
        let deleted = msg.clone();
        if let Some(recipient) = correction {
            if let Some(conv) = state
                .conversations
                .iter_mut()
                .find(|c| c.id == deleted.conversation_id)
            {
                let counter = counter_mut(conv, recipient);
                *counter = counter.saturating_sub(1);
            }
        }
        Ok(Some(deleted))
    }
}

impl AuditRepository for MemoryStore {
    async fn append(&self, entry: &AuditLogEntry) -> Result<(), RepositoryError> {
        if self.audit_down.load(Ordering::SeqCst) {
            return Err(RepositoryError::Connection);
        }
        self.state.lock().unwrap().audit.push(entry.clone());
        Ok(())
    }

    async fn query(
        &self,
        conversation_id: Option<&ConversationId>,
        limit: u32,
    ) -> Result<Vec<AuditLogEntry>, RepositoryError> {
        let state = self.state.lock().unwrap();
        let mut rows: Vec<AuditLogEntry> = state
            .audit
            .iter()
            .filter(|e| conversation_id.is_none() || e.conversation_id.as_ref() == conversation_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        rows.truncate(limit as usize);
        Ok(rows)
    }
}

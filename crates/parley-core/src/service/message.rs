//! Message service: sending, listing, read-marking and soft deletion.
//!
//! Every write here goes through a single `MessageRepository` call, which
//! updates the message row and its conversation summary together.

use std::sync::Arc;

use parley_types::audit::{AuditAction, AuditLogEntry};
use parley_types::conversation::{Conversation, ConversationId};
use parley_types::error::MessagingError;
use parley_types::event::MessagingEvent;
use parley_types::identity::{Caller, Role};
use parley_types::message::{self, Message, MessageId, MessageType, NewMessage};
use parley_types::page::{Cursor, Page, PageRequest};
use parley_types::time;
use tracing::{debug, info};

use super::audit::AuditLogger;
use super::paging::PageLimits;
use super::{not_found, storage_err};
use crate::event::{NotificationDispatcher, dispatch_logged};
use crate::repository::audit::AuditRepository;
use crate::repository::conversation::ConversationRepository;
use crate::repository::message::{MessageFilter, MessageRepository};

const ATTACHMENT_PREVIEW: &str = "[attachment]";

/// Parameters for [`MessageService::list_messages`].
#[derive(Debug, Clone, Default)]
pub struct MessageListQuery {
    pub page: PageRequest,
    /// Include soft-deleted messages. Admin only.
    pub include_deleted: bool,
}

pub struct MessageService<C, M, A, N>
where
    C: ConversationRepository,
    M: MessageRepository,
    A: AuditRepository,
    N: NotificationDispatcher,
{
    conversations: Arc<C>,
    messages: Arc<M>,
    audit: AuditLogger<A>,
    dispatcher: Arc<N>,
    limits: PageLimits,
    preview_chars: usize,
}

impl<C, M, A, N> MessageService<C, M, A, N>
where
    C: ConversationRepository,
    M: MessageRepository,
    A: AuditRepository,
    N: NotificationDispatcher,
{
    pub fn new(
        conversations: Arc<C>,
        messages: Arc<M>,
        audit: AuditLogger<A>,
        dispatcher: Arc<N>,
        limits: PageLimits,
        preview_chars: usize,
    ) -> Self {
        Self {
            conversations,
            messages,
            audit,
            dispatcher,
            limits,
            preview_chars,
        }
    }

    /// Send a message.
    ///
    /// The message insert, the conversation's last-message summary and the
    /// recipient's unread increment commit together. The `MessageCreated`
    /// notification goes out only after that commit.
    pub async fn create_message(&self, input: NewMessage) -> Result<Message, MessagingError> {
        let sender = Caller::new(input.sender_id.trim(), input.sender_role);
        if sender.user_id.is_empty() {
            return Err(MessagingError::invalid("sender_id is required"));
        }
        let has_attachment = input
            .attachment_url
            .as_deref()
            .is_some_and(|url| !url.trim().is_empty());
        if input.content.trim().is_empty() && !has_attachment {
            return Err(MessagingError::invalid(
                "message content is empty and no attachment was supplied",
            ));
        }
        if input.message_type == MessageType::System && sender.role != Role::Admin {
            return Err(MessagingError::Forbidden);
        }

        // Closed conversations are refused inside the write transaction.
        self.visible_conversation(&input.conversation_id, &sender).await?;

        let mut msg = Message::new(&input, time::now());
        msg.sender_id = sender.user_id.clone();
        let preview = self.preview_of(&msg);

        let updated = self
            .messages
            .create(&msg, &preview)
            .await
            .map_err(storage_err("conversation"))?;

        let recipient_id = msg
            .recipient()
            .map(|party| updated.participant(party).to_string());
        info!(
            conversation_id = %msg.conversation_id,
            message_id = %msg.id,
            sender_role = %msg.sender_role,
            unread_buyer = updated.unread_count_buyer,
            unread_vendor = updated.unread_count_vendor,
            "Message created"
        );

        dispatch_logged(
            self.dispatcher.as_ref(),
            MessagingEvent::MessageCreated {
                conversation_id: msg.conversation_id,
                message_id: msg.id,
                sender_id: msg.sender_id.clone(),
                recipient_id,
                preview,
            },
        );

        Ok(msg)
    }

    /// Messages of one conversation, newest first.
    pub async fn list_messages(
        &self,
        conversation_id: &ConversationId,
        caller: &Caller,
        query: &MessageListQuery,
    ) -> Result<Page<Message>, MessagingError> {
        if query.include_deleted && !caller.role.is_admin() {
            return Err(MessagingError::Forbidden);
        }
        self.visible_conversation(conversation_id, caller).await?;

        let limit = self.limits.resolve(query.page.limit)?;
        let filter = MessageFilter {
            after: query.page.cursor,
            limit: limit.saturating_add(1),
            include_deleted: query.include_deleted,
        };
        let rows = self.messages.list(conversation_id, &filter).await?;
        Ok(Page::from_overfetch(rows, limit as usize, |m| {
            Cursor::new(m.created_at, m.id.0)
        }))
    }

    /// Mark one message as read by `reader`.
    ///
    /// No-op when the reader sent the message, is not a participant, or the
    /// message is already read. Leaves the unread counters untouched.
    pub async fn mark_message_as_read(
        &self,
        message_id: &MessageId,
        reader: &Caller,
    ) -> Result<Message, MessagingError> {
        let msg = self.visible_message(message_id, reader).await?.0;

        if msg.sender_id == reader.user_id || msg.is_read || reader.role.is_admin() {
            debug!(message_id = %message_id, reader_id = %reader.user_id, "Mark read skipped");
            return Ok(msg);
        }

        let read_at = time::now();
        let changed = self.messages.mark_read(message_id, read_at).await?;
        if !changed {
            return self
                .messages
                .get_by_id(message_id)
                .await?
                .ok_or_else(|| not_found("message"));
        }

        debug!(message_id = %message_id, reader_id = %reader.user_id, "Message marked read");
        Ok(Message {
            is_read: true,
            read_at: Some(read_at),
            ..msg
        })
    }

    /// Mark everything the other side sent as read and reset the caller's
    /// unread counter. Returns how many messages were marked.
    pub async fn mark_conversation_as_read(
        &self,
        conversation_id: &ConversationId,
        caller: &Caller,
    ) -> Result<u64, MessagingError> {
        let conversation = self.visible_conversation(conversation_id, caller).await?;
        let party = conversation
            .party_of(caller)
            .ok_or(MessagingError::Forbidden)?;

        let marked = self
            .messages
            .mark_conversation_read(conversation_id, party, &caller.user_id, time::now())
            .await
            .map_err(storage_err("conversation"))?;

        debug!(conversation_id = %conversation_id, party = %party, marked, "Conversation marked read");
        dispatch_logged(
            self.dispatcher.as_ref(),
            MessagingEvent::ConversationRead {
                conversation_id: *conversation_id,
                reader_id: caller.user_id.clone(),
                party,
                marked,
            },
        );
        Ok(marked)
    }

    /// Soft-delete a message. Allowed for its sender and for admins.
    ///
    /// An unread message stops counting toward its recipient's counter.
    /// Deleting an already deleted message returns it unchanged.
    pub async fn soft_delete_message(
        &self,
        message_id: &MessageId,
        caller: &Caller,
    ) -> Result<Message, MessagingError> {
        let (msg, conversation) = self.visible_message(message_id, caller).await?;
        if !caller.role.is_admin() && msg.sender_id != caller.user_id {
            return Err(MessagingError::Forbidden);
        }
        if msg.is_deleted {
            return Ok(msg);
        }

        let deleted = self
            .messages
            .soft_delete(message_id, &caller.user_id, time::now())
            .await?
            .ok_or_else(|| not_found("message"))?;

        info!(
            conversation_id = %conversation.id,
            message_id = %message_id,
            deleted_by = %caller.user_id,
            "Message soft-deleted"
        );

        let entry = AuditLogEntry::new(AuditAction::MessageDeleted, caller, time::now())
            .with_conversation(conversation.id)
            .with_message(*message_id);
        self.audit.append(&entry).await;

        dispatch_logged(
            self.dispatcher.as_ref(),
            MessagingEvent::MessageDeleted {
                conversation_id: conversation.id,
                message_id: *message_id,
                deleted_by: caller.user_id.clone(),
            },
        );
        Ok(deleted)
    }

    fn preview_of(&self, msg: &Message) -> String {
        if msg.content.trim().is_empty() {
            let label = msg.attachment_name.as_deref().unwrap_or(ATTACHMENT_PREVIEW);
            return message::preview(label, self.preview_chars);
        }
        message::preview(&msg.content, self.preview_chars)
    }

    async fn visible_conversation(
        &self,
        id: &ConversationId,
        caller: &Caller,
    ) -> Result<Conversation, MessagingError> {
        match self.conversations.get_by_id(id).await? {
            Some(conv) if conv.is_visible_to(caller) => Ok(conv),
            _ => Err(not_found("conversation")),
        }
    }

    /// Load a message and its conversation, hiding both from outsiders.
    async fn visible_message(
        &self,
        id: &MessageId,
        caller: &Caller,
    ) -> Result<(Message, Conversation), MessagingError> {
        let msg = self
            .messages
            .get_by_id(id)
            .await?
            .ok_or_else(|| not_found("message"))?;
        match self.conversations.get_by_id(&msg.conversation_id).await? {
            Some(conv) if conv.is_visible_to(caller) => Ok((msg, conv)),
            _ => Err(not_found("message")),
        }
    }
}

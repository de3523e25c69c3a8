//! The messaging facade.
//!
//! `MessagingService` is the one object the marketplace holds. It is built
//! from injected repositories and a notification dispatcher, owns no global
//! state, and applies the bounded conflict retry to every write.

use std::sync::Arc;

use parley_types::audit::AuditLogEntry;
use parley_types::config::MessagingConfig;
use parley_types::conversation::{Conversation, ConversationId, ConversationPatch, NewConversation};
use parley_types::error::MessagingError;
use parley_types::identity::Caller;
use parley_types::message::{Message, MessageId, NewMessage};
use parley_types::page::Page;

use super::audit::AuditLogger;
use super::conversation::{ConversationListQuery, ConversationService};
use super::message::{MessageListQuery, MessageService};
use super::moderation::ModerationEngine;
use super::paging::PageLimits;
use super::retry::{RetryPolicy, retry_on_conflict};
use crate::event::NotificationDispatcher;
use crate::repository::audit::AuditRepository;
use crate::repository::conversation::ConversationRepository;
use crate::repository::message::MessageRepository;

pub struct MessagingService<C, M, A, N>
where
    C: ConversationRepository,
    M: MessageRepository,
    A: AuditRepository,
    N: NotificationDispatcher,
{
    conversations: ConversationService<C, A>,
    messages: MessageService<C, M, A, N>,
    moderation: ModerationEngine<C, N>,
    audit: AuditLogger<A>,
    retry: RetryPolicy,
}

impl<C, M, A, N> MessagingService<C, M, A, N>
where
    C: ConversationRepository,
    M: MessageRepository,
    A: AuditRepository,
    N: NotificationDispatcher,
{
    pub fn new(
        conversation_repo: Arc<C>,
        message_repo: Arc<M>,
        audit_repo: Arc<A>,
        dispatcher: Arc<N>,
        config: &MessagingConfig,
    ) -> Self {
        let limits = PageLimits::from_config(config);
        let audit = AuditLogger::new(audit_repo, config.audit_query_max);
        Self {
            conversations: ConversationService::new(
                Arc::clone(&conversation_repo),
                audit.clone(),
                limits,
            ),
            messages: MessageService::new(
                Arc::clone(&conversation_repo),
                message_repo,
                audit.clone(),
                Arc::clone(&dispatcher),
                limits,
                config.preview_chars,
            ),
            moderation: ModerationEngine::new(conversation_repo, dispatcher, limits),
            audit,
            retry: RetryPolicy::from_config(config),
        }
    }

    /// Replace the retry policy derived from config.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn conversations(&self) -> &ConversationService<C, A> {
        &self.conversations
    }

    pub fn messages(&self) -> &MessageService<C, M, A, N> {
        &self.messages
    }

    pub fn moderation(&self) -> &ModerationEngine<C, N> {
        &self.moderation
    }

    pub fn audit(&self) -> &AuditLogger<A> {
        &self.audit
    }

    // --- Conversations ---

    pub async fn create_or_get_conversation(
        &self,
        caller: &Caller,
        input: NewConversation,
    ) -> Result<Conversation, MessagingError> {
        retry_on_conflict(self.retry, "create_or_get_conversation", move || {
            self.conversations.create_or_get(caller, input.clone())
        })
        .await
    }

    pub async fn get_conversation_by_id(
        &self,
        id: &ConversationId,
    ) -> Result<Conversation, MessagingError> {
        self.conversations.get_by_id(id).await
    }

    pub async fn get_conversation_for_user(
        &self,
        id: &ConversationId,
        caller: &Caller,
    ) -> Result<Conversation, MessagingError> {
        self.conversations.get_for_user(id, caller).await
    }

    pub async fn list_conversations_for_user(
        &self,
        caller: &Caller,
        query: &ConversationListQuery,
    ) -> Result<Page<Conversation>, MessagingError> {
        self.conversations.list_for_user(caller, query).await
    }

    pub async fn update_conversation_flags(
        &self,
        id: &ConversationId,
        patch: &ConversationPatch,
    ) -> Result<Conversation, MessagingError> {
        retry_on_conflict(self.retry, "update_conversation_flags", move || {
            self.conversations.update_flags(id, patch)
        })
        .await
    }

    pub async fn set_pinned(
        &self,
        id: &ConversationId,
        caller: &Caller,
        pinned: bool,
    ) -> Result<Conversation, MessagingError> {
        retry_on_conflict(self.retry, "set_pinned", move || {
            self.conversations.set_pinned(id, caller, pinned)
        })
        .await
    }

    pub async fn set_muted(
        &self,
        id: &ConversationId,
        caller: &Caller,
        muted: bool,
    ) -> Result<Conversation, MessagingError> {
        retry_on_conflict(self.retry, "set_muted", move || {
            self.conversations.set_muted(id, caller, muted)
        })
        .await
    }

    pub async fn get_unread_count(&self, caller: &Caller) -> Result<u64, MessagingError> {
        self.conversations.unread_count(caller).await
    }

    // --- Messages ---

    pub async fn create_message(&self, input: NewMessage) -> Result<Message, MessagingError> {
        retry_on_conflict(self.retry, "create_message", move || {
            self.messages.create_message(input.clone())
        })
        .await
    }

    pub async fn list_messages(
        &self,
        conversation_id: &ConversationId,
        caller: &Caller,
        query: &MessageListQuery,
    ) -> Result<Page<Message>, MessagingError> {
        self.messages
            .list_messages(conversation_id, caller, query)
            .await
    }

    pub async fn mark_message_as_read(
        &self,
        message_id: &MessageId,
        reader: &Caller,
    ) -> Result<Message, MessagingError> {
        retry_on_conflict(self.retry, "mark_message_as_read", move || {
            self.messages.mark_message_as_read(message_id, reader)
        })
        .await
    }

    pub async fn mark_conversation_as_read(
        &self,
        conversation_id: &ConversationId,
        caller: &Caller,
    ) -> Result<u64, MessagingError> {
        retry_on_conflict(self.retry, "mark_conversation_as_read", move || {
            self.messages.mark_conversation_as_read(conversation_id, caller)
        })
        .await
    }

    pub async fn soft_delete_message(
        &self,
        message_id: &MessageId,
        caller: &Caller,
    ) -> Result<Message, MessagingError> {
        retry_on_conflict(self.retry, "soft_delete_message", move || {
            self.messages.soft_delete_message(message_id, caller)
        })
        .await
    }

    // --- Moderation ---

    pub async fn flag_conversation(
        &self,
        id: &ConversationId,
        caller: &Caller,
        reason: &str,
    ) -> Result<Conversation, MessagingError> {
        retry_on_conflict(self.retry, "flag_conversation", move || {
            self.moderation.flag(id, caller, reason)
        })
        .await
    }

    pub async fn unflag_conversation(
        &self,
        id: &ConversationId,
        caller: &Caller,
        notes: Option<String>,
    ) -> Result<Conversation, MessagingError> {
        retry_on_conflict(self.retry, "unflag_conversation", move || {
            self.moderation.unflag(id, caller, notes.clone())
        })
        .await
    }

    pub async fn archive_conversation(
        &self,
        id: &ConversationId,
        caller: &Caller,
    ) -> Result<Conversation, MessagingError> {
        retry_on_conflict(self.retry, "archive_conversation", move || {
            self.moderation.archive(id, caller)
        })
        .await
    }

    pub async fn get_flagged_conversations(
        &self,
        caller: &Caller,
        limit: Option<i64>,
    ) -> Result<Vec<Conversation>, MessagingError> {
        self.moderation.flagged(caller, limit).await
    }

    // --- Audit ---

    /// Best-effort append; returns whether the entry was stored.
    ///
    /// Custom actions that spell a built-in action name are refused.
    pub async fn append_audit_log(&self, entry: &AuditLogEntry) -> bool {
        self.audit.append(entry).await
    }

    /// Admin only.
    pub async fn query_audit_logs(
        &self,
        caller: &Caller,
        conversation_id: Option<&ConversationId>,
        limit: i64,
    ) -> Result<Vec<AuditLogEntry>, MessagingError> {
        if !caller.role.is_admin() {
            return Err(MessagingError::Forbidden);
        }
        self.audit.query(conversation_id, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::NoopDispatcher;
    use crate::repository::mock::MemoryStore;
    use parley_types::audit::AuditAction;
    use parley_types::conversation::{ConversationContext, ConversationStatus};
    use parley_types::message::MessageType;
    use parley_types::time;

    type Service = MessagingService<MemoryStore, MemoryStore, MemoryStore, NoopDispatcher>;

    fn service(store: &MemoryStore) -> Service {
        let store = Arc::new(store.clone());
        MessagingService::new(
            Arc::clone(&store),
            Arc::clone(&store),
            store,
            Arc::new(NoopDispatcher),
            &MessagingConfig::default(),
        )
    }

    fn inquiry() -> NewConversation {
        NewConversation {
            buyer_id: "b1".to_string(),
            vendor_id: "v1".to_string(),
            context: ConversationContext::ProductInquiry,
            product_id: Some("P1".to_string()),
            ..Default::default()
        }
    }

    fn send(conv: &Conversation, caller: &Caller, content: &str) -> NewMessage {
        NewMessage {
            conversation_id: conv.id,
            sender_id: caller.user_id.clone(),
            sender_name: caller.user_id.clone(),
            sender_role: caller.role,
            content: content.to_string(),
            message_type: MessageType::Text,
            attachment_url: None,
            attachment_name: None,
        }
    }

    #[tokio::test]
    async fn test_buyer_vendor_round_trip() {
        let store = MemoryStore::new();
        let svc = service(&store);
        let buyer = Caller::buyer("b1");
        let vendor = Caller::vendor("v1");

        for _ in 0..3 {
            let conv = svc.create_or_get_conversation(&buyer, inquiry()).await.unwrap();
            svc.create_message(send(&conv, &buyer, "still available?"))
                .await
                .unwrap();
        }
        assert_eq!(store.conversation_count(), 1);
        assert_eq!(svc.get_unread_count(&vendor).await.unwrap(), 3);
        assert_eq!(svc.get_unread_count(&buyer).await.unwrap(), 0);

        let conv = svc.create_or_get_conversation(&vendor, inquiry()).await.unwrap();
        assert_eq!(conv.unread_count_vendor, 3);
        assert_eq!(svc.mark_conversation_as_read(&conv.id, &vendor).await.unwrap(), 3);
        assert_eq!(svc.get_unread_count(&vendor).await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_message_retries_conflicts() {
        let store = MemoryStore::new();
        let svc = service(&store);
        let buyer = Caller::buyer("b1");
        let conv = svc.create_or_get_conversation(&buyer, inquiry()).await.unwrap();

        store.inject_conflicts(2);
        svc.create_message(send(&conv, &buyer, "third time lucky"))
            .await
            .unwrap();
        assert_eq!(store.messages().len(), 1);
        let conv = svc.get_conversation_by_id(&conv.id).await.unwrap();
        assert_eq!(conv.unread_count_vendor, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_message_gives_up_after_budget() {
        let store = MemoryStore::new();
        let svc = service(&store);
        let buyer = Caller::buyer("b1");
        let conv = svc.create_or_get_conversation(&buyer, inquiry()).await.unwrap();

        store.inject_conflicts(3);
        let result = svc.create_message(send(&conv, &buyer, "hello")).await;
        assert!(matches!(result, Err(MessagingError::ConflictOrRace(_))));
        assert!(store.messages().is_empty());
    }

    #[tokio::test]
    async fn test_retry_disabled_surfaces_first_conflict() {
        let store = MemoryStore::new();
        let svc = service(&store).with_retry_policy(RetryPolicy::none());
        let buyer = Caller::buyer("b1");
        let conv = svc.create_or_get_conversation(&buyer, inquiry()).await.unwrap();

        store.inject_conflicts(1);
        let result = svc.create_message(send(&conv, &buyer, "hello")).await;
        assert!(matches!(result, Err(MessagingError::ConflictOrRace(_))));
    }

    #[tokio::test]
    async fn test_moderation_through_facade() {
        let store = MemoryStore::new();
        let svc = service(&store);
        let admin = Caller::admin("mod");
        let conv = svc
            .create_or_get_conversation(&Caller::buyer("b1"), inquiry())
            .await
            .unwrap();

        svc.flag_conversation(&conv.id, &admin, "abuse").await.unwrap();
        let queue = svc.get_flagged_conversations(&admin, Some(10)).await.unwrap();
        assert_eq!(queue.len(), 1);

        let active = svc.unflag_conversation(&conv.id, &admin, None).await.unwrap();
        assert_eq!(active.status, ConversationStatus::Active);

        let log = svc.query_audit_logs(&admin, Some(&conv.id), 10).await.unwrap();
        let actions: Vec<_> = log.iter().map(|e| e.action.clone()).collect();
        assert!(actions.contains(&AuditAction::ConversationCreated));
        assert!(actions.contains(&AuditAction::ConversationFlagged));
        assert!(actions.contains(&AuditAction::ConversationUnflagged));
    }

    #[tokio::test]
    async fn test_audit_query_is_admin_only() {
        let store = MemoryStore::new();
        let svc = service(&store);

        let entry = AuditLogEntry::new(
            AuditAction::Other("EXPORT_REQUESTED".to_string()),
            &Caller::buyer("b1"),
            time::now(),
        );
        assert!(svc.append_audit_log(&entry).await);

        let forged = AuditLogEntry::new(
            AuditAction::Other("CONVERSATION_ARCHIVED".to_string()),
            &Caller::buyer("b1"),
            time::now(),
        );
        assert!(!svc.append_audit_log(&forged).await);

        assert!(matches!(
            svc.query_audit_logs(&Caller::buyer("b1"), None, 10).await,
            Err(MessagingError::Forbidden)
        ));
        let all = svc
            .query_audit_logs(&Caller::admin("mod"), None, 10)
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].performed_by, "b1");
    }
}

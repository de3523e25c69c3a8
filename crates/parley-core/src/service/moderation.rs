//! Moderation engine: the flag / unflag / archive state machine.
//!
//! ```text
//!   active ──flag──▶ flagged ──unflag──▶ active
//!   active ──archive──▶ archived
//!   closed: terminal
//! ```
//!
//! Each transition is a guarded status update plus its audit row, committed
//! in one transaction by [`ConversationRepository::transition`].

use std::sync::Arc;

use parley_types::audit::{AuditAction, AuditLogEntry};
use parley_types::conversation::{
    Conversation, ConversationId, ConversationPatch, ConversationStatus,
};
use parley_types::error::MessagingError;
use parley_types::event::MessagingEvent;
use parley_types::identity::Caller;
use parley_types::time;
use tracing::{debug, info};

use super::not_found;
use super::paging::PageLimits;
use crate::event::{NotificationDispatcher, dispatch_logged};
use crate::repository::conversation::{ConversationRepository, TransitionOutcome};

const FLAGGABLE: &[ConversationStatus] = &[ConversationStatus::Active, ConversationStatus::Flagged];
const UNFLAGGABLE: &[ConversationStatus] = &[
    ConversationStatus::Active,
    ConversationStatus::Flagged,
    ConversationStatus::Archived,
];
const ARCHIVABLE: &[ConversationStatus] = &[ConversationStatus::Active];

pub struct ModerationEngine<C: ConversationRepository, N: NotificationDispatcher> {
    repo: Arc<C>,
    dispatcher: Arc<N>,
    limits: PageLimits,
}

impl<C: ConversationRepository, N: NotificationDispatcher> ModerationEngine<C, N> {
    pub fn new(repo: Arc<C>, dispatcher: Arc<N>, limits: PageLimits) -> Self {
        Self {
            repo,
            dispatcher,
            limits,
        }
    }

    /// Put a conversation under review. Admin only; `reason` is required.
    ///
    /// Re-flagging a flagged conversation overwrites the reason.
    pub async fn flag(
        &self,
        id: &ConversationId,
        caller: &Caller,
        reason: &str,
    ) -> Result<Conversation, MessagingError> {
        require_admin(caller)?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(MessagingError::invalid("a flag reason is required"));
        }

        let now = time::now();
        let patch = ConversationPatch {
            status: Some(ConversationStatus::Flagged),
            flagged_at: Some(now),
            flagged_by: Some(caller.user_id.clone()),
            flag_reason: Some(reason.to_string()),
            ..Default::default()
        };
        let entry = AuditLogEntry::new(AuditAction::ConversationFlagged, caller, now)
            .with_conversation(*id)
            .with_details(reason);

        let flagged = self
            .apply(id, FLAGGABLE, &patch, &entry, "flag")
            .await?;
        info!(conversation_id = %id, flagged_by = %caller.user_id, reason, "Conversation flagged");

        dispatch_logged(
            self.dispatcher.as_ref(),
            MessagingEvent::ConversationFlagged {
                conversation_id: *id,
                flagged_by: caller.user_id.clone(),
                reason: reason.to_string(),
            },
        );
        Ok(flagged)
    }

    /// Close a review and return the conversation to `active`. Admin only.
    ///
    /// Accepted on conversations that are not flagged, where it simply
    /// overwrites the review fields. Closed conversations are rejected.
    pub async fn unflag(
        &self,
        id: &ConversationId,
        caller: &Caller,
        notes: Option<String>,
    ) -> Result<Conversation, MessagingError> {
        require_admin(caller)?;

        let now = time::now();
        let notes = notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        let patch = ConversationPatch {
            status: Some(ConversationStatus::Active),
            reviewed_at: Some(now),
            reviewed_by: Some(caller.user_id.clone()),
            moderator_notes: notes.clone(),
            ..Default::default()
        };
        let mut entry = AuditLogEntry::new(AuditAction::ConversationUnflagged, caller, now)
            .with_conversation(*id);
        if let Some(notes) = notes {
            entry = entry.with_details(notes);
        }

        let active = self
            .apply(id, UNFLAGGABLE, &patch, &entry, "unflag")
            .await?;
        info!(conversation_id = %id, reviewed_by = %caller.user_id, "Conversation unflagged");

        dispatch_logged(
            self.dispatcher.as_ref(),
            MessagingEvent::ConversationUnflagged {
                conversation_id: *id,
                reviewed_by: caller.user_id.clone(),
            },
        );
        Ok(active)
    }

    /// Archive a conversation on behalf of one of its participants.
    ///
    /// Archiving twice is a no-op that writes no second audit row.
    pub async fn archive(
        &self,
        id: &ConversationId,
        caller: &Caller,
    ) -> Result<Conversation, MessagingError> {
        if caller.role.is_admin() {
            return Err(MessagingError::Forbidden);
        }
        let current = match self.repo.get_by_id(id).await? {
            Some(conv) if conv.is_visible_to(caller) => conv,
            _ => return Err(not_found("conversation")),
        };
        if current.status == ConversationStatus::Archived {
            debug!(conversation_id = %id, "Conversation already archived");
            return Ok(current);
        }

        let now = time::now();
        let patch = ConversationPatch {
            status: Some(ConversationStatus::Archived),
            archived_at: Some(now),
            archived_by: Some(caller.user_id.clone()),
            ..Default::default()
        };
        let entry = AuditLogEntry::new(AuditAction::ConversationArchived, caller, now)
            .with_conversation(*id);

        let outcome = self
            .repo
            .transition(id, ARCHIVABLE, &patch, now, &entry)
            .await?;
        let archived = match outcome {
            TransitionOutcome::Applied(conv) => conv,
            // Lost a race with another archive of the same conversation.
            TransitionOutcome::Rejected(ConversationStatus::Archived) => {
                return self
                    .repo
                    .get_by_id(id)
                    .await?
                    .ok_or_else(|| not_found("conversation"));
            }
            TransitionOutcome::Rejected(status) => return Err(rejected("archive", status)),
            TransitionOutcome::NotFound => return Err(not_found("conversation")),
        };
        info!(conversation_id = %id, archived_by = %caller.user_id, "Conversation archived");

        dispatch_logged(
            self.dispatcher.as_ref(),
            MessagingEvent::ConversationArchived {
                conversation_id: *id,
                archived_by: caller.user_id.clone(),
            },
        );
        Ok(archived)
    }

    /// The moderation queue: flagged conversations, most recently flagged
    /// first. Admin only.
    pub async fn flagged(
        &self,
        caller: &Caller,
        limit: Option<i64>,
    ) -> Result<Vec<Conversation>, MessagingError> {
        require_admin(caller)?;
        let limit = self.limits.resolve(limit)?;
        Ok(self.repo.list_flagged(limit).await?)
    }

    async fn apply(
        &self,
        id: &ConversationId,
        allowed_from: &[ConversationStatus],
        patch: &ConversationPatch,
        entry: &AuditLogEntry,
        action: &'static str,
    ) -> Result<Conversation, MessagingError> {
        let updated_at = entry.created_at;
        match self
            .repo
            .transition(id, allowed_from, patch, updated_at, entry)
            .await?
        {
            TransitionOutcome::Applied(conv) => Ok(conv),
            TransitionOutcome::Rejected(status) => Err(rejected(action, status)),
            TransitionOutcome::NotFound => Err(not_found("conversation")),
        }
    }
}

fn require_admin(caller: &Caller) -> Result<(), MessagingError> {
    if caller.role.is_admin() {
        Ok(())
    } else {
        Err(MessagingError::Forbidden)
    }
}

fn rejected(action: &str, status: ConversationStatus) -> MessagingError {
    MessagingError::invalid(format!("cannot {action} a {status} conversation"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::NoopDispatcher;
    use crate::repository::mock::MemoryStore;
    use parley_types::conversation::{ConversationContext, NewConversation};

    fn engine(store: &MemoryStore) -> ModerationEngine<MemoryStore, NoopDispatcher> {
        ModerationEngine::new(
            Arc::new(store.clone()),
            Arc::new(NoopDispatcher),
            PageLimits::default(),
        )
    }

    async fn conversation(store: &MemoryStore, product: &str) -> Conversation {
        let input = NewConversation {
            buyer_id: "b1".to_string(),
            vendor_id: "v1".to_string(),
            context: ConversationContext::ProductInquiry,
            product_id: Some(product.to_string()),
            ..Default::default()
        };
        store
            .create_or_get(&Conversation::new(&input, time::now()))
            .await
            .unwrap()
            .0
    }

    async fn set_status(store: &MemoryStore, id: &ConversationId, status: ConversationStatus) {
        let patch = ConversationPatch {
            status: Some(status),
            ..Default::default()
        };
        store.update_flags(id, &patch, time::now()).await.unwrap();
    }

    #[tokio::test]
    async fn test_flag_then_unflag() {
        let store = MemoryStore::new();
        let engine = engine(&store);
        let conv = conversation(&store, "P1").await;
        let admin = Caller::admin("mod");

        let flagged = engine.flag(&conv.id, &admin, "abuse").await.unwrap();
        assert_eq!(flagged.status, ConversationStatus::Flagged);
        assert_eq!(flagged.flag_reason.as_deref(), Some("abuse"));
        assert_eq!(flagged.flagged_by.as_deref(), Some("mod"));

        let audits = store.audit_entries();
        assert_eq!(audits.len(), 1);
        assert_eq!(audits[0].action, AuditAction::ConversationFlagged);
        assert_eq!(audits[0].details.as_deref(), Some("abuse"));

        let active = engine
            .unflag(&conv.id, &admin, Some("false alarm".to_string()))
            .await
            .unwrap();
        assert_eq!(active.status, ConversationStatus::Active);
        assert_eq!(active.reviewed_by.as_deref(), Some("mod"));
        assert_eq!(active.moderator_notes.as_deref(), Some("false alarm"));

        let audits = store.audit_entries();
        assert_eq!(audits.len(), 2);
        assert_eq!(audits[1].action, AuditAction::ConversationUnflagged);
    }

    #[tokio::test]
    async fn test_flag_requires_admin_and_reason() {
        let store = MemoryStore::new();
        let engine = engine(&store);
        let conv = conversation(&store, "P1").await;

        assert!(matches!(
            engine.flag(&conv.id, &Caller::buyer("b1"), "spam").await,
            Err(MessagingError::Forbidden)
        ));
        assert!(matches!(
            engine.flag(&conv.id, &Caller::admin("mod"), "  ").await,
            Err(MessagingError::InvalidArgument(_))
        ));
        assert!(matches!(
            engine
                .flag(&ConversationId::new(), &Caller::admin("mod"), "spam")
                .await,
            Err(MessagingError::NotFound(_))
        ));
        assert!(store.audit_entries().is_empty());
    }

    #[tokio::test]
    async fn test_flag_rejected_from_archived_and_closed() {
        let store = MemoryStore::new();
        let engine = engine(&store);
        let admin = Caller::admin("mod");

        let archived = conversation(&store, "P1").await;
        set_status(&store, &archived.id, ConversationStatus::Archived).await;
        assert!(matches!(
            engine.flag(&archived.id, &admin, "spam").await,
            Err(MessagingError::InvalidArgument(_))
        ));

        let closed = conversation(&store, "P2").await;
        set_status(&store, &closed.id, ConversationStatus::Closed).await;
        assert!(matches!(
            engine.flag(&closed.id, &admin, "spam").await,
            Err(MessagingError::InvalidArgument(_))
        ));
        assert!(matches!(
            engine.unflag(&closed.id, &admin, None).await,
            Err(MessagingError::InvalidArgument(_))
        ));
        assert!(store.audit_entries().is_empty());
    }

    #[tokio::test]
    async fn test_unflag_on_active_is_accepted() {
        let store = MemoryStore::new();
        let engine = engine(&store);
        let conv = conversation(&store, "P1").await;

        let result = engine
            .unflag(&conv.id, &Caller::admin("mod"), None)
            .await
            .unwrap();
        assert_eq!(result.status, ConversationStatus::Active);
        assert!(result.reviewed_at.is_some());
        assert_eq!(store.audit_entries().len(), 1);
    }

    #[tokio::test]
    async fn test_archive_by_participant() {
        let store = MemoryStore::new();
        let engine = engine(&store);
        let conv = conversation(&store, "P1").await;
        let vendor = Caller::vendor("v1");

        let archived = engine.archive(&conv.id, &vendor).await.unwrap();
        assert_eq!(archived.status, ConversationStatus::Archived);
        assert_eq!(archived.archived_by.as_deref(), Some("v1"));
        assert!(archived.archived_at.is_some());

        let again = engine.archive(&conv.id, &vendor).await.unwrap();
        assert_eq!(again.status, ConversationStatus::Archived);

        let audits = store.audit_entries();
        assert_eq!(audits.len(), 1);
        assert_eq!(audits[0].action, AuditAction::ConversationArchived);
    }

    #[tokio::test]
    async fn test_archive_permissions_and_state() {
        let store = MemoryStore::new();
        let engine = engine(&store);
        let conv = conversation(&store, "P1").await;

        assert!(matches!(
            engine.archive(&conv.id, &Caller::admin("mod")).await,
            Err(MessagingError::Forbidden)
        ));
        assert!(matches!(
            engine.archive(&conv.id, &Caller::buyer("b2")).await,
            Err(MessagingError::NotFound(_))
        ));

        engine.flag(&conv.id, &Caller::admin("mod"), "spam").await.unwrap();
        assert!(matches!(
            engine.archive(&conv.id, &Caller::buyer("b1")).await,
            Err(MessagingError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_flagged_queue_is_admin_only() {
        let store = MemoryStore::new();
        let engine = engine(&store);
        let admin = Caller::admin("mod");

        let first = conversation(&store, "P1").await;
        let second = conversation(&store, "P2").await;
        conversation(&store, "P3").await;
        engine.flag(&first.id, &admin, "spam").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        engine.flag(&second.id, &admin, "fraud").await.unwrap();

        let queue = engine.flagged(&admin, None).await.unwrap();
        let ids: Vec<_> = queue.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);

        assert!(matches!(
            engine.flagged(&Caller::vendor("v1"), None).await,
            Err(MessagingError::Forbidden)
        ));
    }
}

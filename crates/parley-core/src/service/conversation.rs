//! Conversation service: identity, participant scoping, listing, and the
//! per-party UI flags.

use std::sync::Arc;

use parley_types::audit::{AuditAction, AuditLogEntry};
use parley_types::conversation::{
    Conversation, ConversationId, ConversationPatch, ConversationStatus, NewConversation,
};
use parley_types::error::MessagingError;
use parley_types::identity::{Caller, Party, Role};
use parley_types::page::{Cursor, Page, PageRequest};
use parley_types::time;
use tracing::{debug, info};

use super::audit::AuditLogger;
use super::paging::PageLimits;
use super::{not_found, storage_err};
use crate::repository::audit::AuditRepository;
use crate::repository::conversation::{ConversationFilter, ConversationRepository};

/// Parameters for [`ConversationService::list_for_user`].
#[derive(Debug, Clone, Default)]
pub struct ConversationListQuery {
    pub page: PageRequest,
    /// Only this status. Without it, non-admins never see closed conversations.
    pub status: Option<ConversationStatus>,
}

/// Owns conversation identity and the non-summary conversation fields.
///
/// Generic over `ConversationRepository` and `AuditRepository` to maintain
/// clean architecture (parley-core never depends on parley-infra).
pub struct ConversationService<C: ConversationRepository, A: AuditRepository> {
    repo: Arc<C>,
    audit: AuditLogger<A>,
    limits: PageLimits,
}

impl<C: ConversationRepository, A: AuditRepository> ConversationService<C, A> {
    pub fn new(repo: Arc<C>, audit: AuditLogger<A>, limits: PageLimits) -> Self {
        Self {
            repo,
            audit,
            limits,
        }
    }

    /// Return the conversation for `(buyer, vendor, context, product?, order?)`,
    /// creating it on first use.
    ///
    /// Repeat calls with the same key return the existing row unchanged and
    /// write nothing. A buyer or vendor may only open conversations they
    /// take part in; admins may open any.
    pub async fn create_or_get(
        &self,
        caller: &Caller,
        mut input: NewConversation,
    ) -> Result<Conversation, MessagingError> {
        input.buyer_id = input.buyer_id.trim().to_string();
        input.vendor_id = input.vendor_id.trim().to_string();
        if input.buyer_id.is_empty() || input.vendor_id.is_empty() {
            return Err(MessagingError::invalid("buyer_id and vendor_id are required"));
        }
        if input.buyer_id == input.vendor_id {
            return Err(MessagingError::invalid(
                "buyer_id and vendor_id must be different accounts",
            ));
        }

        let allowed = match caller.role {
            Role::Buyer => caller.user_id == input.buyer_id,
            Role::Vendor => caller.user_id == input.vendor_id,
            Role::Admin => true,
        };
        if !allowed {
            return Err(MessagingError::Forbidden);
        }

        if let Some(existing) = self.repo.find_by_key(&input.key()).await? {
            debug!(conversation_id = %existing.id, "Conversation already exists");
            return Ok(existing);
        }

        let candidate = Conversation::new(&input, time::now());
        let (conversation, created) = self.repo.create_or_get(&candidate).await?;

        if created {
            info!(
                conversation_id = %conversation.id,
                buyer_id = %conversation.buyer_id,
                vendor_id = %conversation.vendor_id,
                context = %conversation.context,
                "Conversation created"
            );
            let entry = AuditLogEntry::new(AuditAction::ConversationCreated, caller, time::now())
                .with_conversation(conversation.id)
                .with_details(format!("context={}", conversation.context));
            self.audit.append(&entry).await;
        }

        Ok(conversation)
    }

    /// Unscoped lookup for trusted callers.
    pub async fn get_by_id(&self, id: &ConversationId) -> Result<Conversation, MessagingError> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| not_found("conversation"))
    }

    /// Lookup scoped to the caller's side; admins are unrestricted.
    ///
    /// A conversation the caller is not part of reports `NotFound`.
    pub async fn get_for_user(
        &self,
        id: &ConversationId,
        caller: &Caller,
    ) -> Result<Conversation, MessagingError> {
        let conversation = self.get_by_id(id).await?;
        if !conversation.is_visible_to(caller) {
            return Err(not_found("conversation"));
        }
        Ok(conversation)
    }

    /// The caller's conversations, most recently updated first.
    pub async fn list_for_user(
        &self,
        caller: &Caller,
        query: &ConversationListQuery,
    ) -> Result<Page<Conversation>, MessagingError> {
        let limit = self.limits.resolve(query.page.limit)?;
        let filter = ConversationFilter {
            participant: caller
                .role
                .party()
                .map(|party| (party, caller.user_id.clone())),
            status: query.status,
            exclude_closed: !caller.role.is_admin(),
            after: query.page.cursor,
            limit: limit.saturating_add(1),
        };

        let rows = self.repo.list(&filter).await?;
        Ok(Page::from_overfetch(rows, limit as usize, |c| {
            Cursor::new(c.updated_at, c.id.0)
        }))
    }

    /// Generic setter for pin/mute/status/moderation fields.
    ///
    /// Always bumps `updated_at`, even for an empty patch.
    pub async fn update_flags(
        &self,
        id: &ConversationId,
        patch: &ConversationPatch,
    ) -> Result<Conversation, MessagingError> {
        let updated = self
            .repo
            .update_flags(id, patch, time::now())
            .await
            .map_err(storage_err("conversation"))?
            .ok_or_else(|| not_found("conversation"))?;
        debug!(conversation_id = %id, status = %updated.status, "Conversation flags updated");
        Ok(updated)
    }

    /// Pin or unpin the conversation on the caller's side only.
    pub async fn set_pinned(
        &self,
        id: &ConversationId,
        caller: &Caller,
        pinned: bool,
    ) -> Result<Conversation, MessagingError> {
        let party = self.caller_party(id, caller).await?;
        self.update_flags(id, &ConversationPatch::pinned(party, pinned))
            .await
    }

    /// Mute or unmute the conversation on the caller's side only.
    pub async fn set_muted(
        &self,
        id: &ConversationId,
        caller: &Caller,
        muted: bool,
    ) -> Result<Conversation, MessagingError> {
        let party = self.caller_party(id, caller).await?;
        self.update_flags(id, &ConversationPatch::muted(party, muted))
            .await
    }

    /// Total unread messages waiting for the caller across their
    /// non-closed conversations.
    pub async fn unread_count(&self, caller: &Caller) -> Result<u64, MessagingError> {
        let party = caller.role.party().ok_or(MessagingError::Forbidden)?;
        Ok(self.repo.unread_total(&caller.user_id, party).await?)
    }

    async fn caller_party(
        &self,
        id: &ConversationId,
        caller: &Caller,
    ) -> Result<Party, MessagingError> {
        let conversation = self.get_for_user(id, caller).await?;
        conversation
            .party_of(caller)
            .ok_or(MessagingError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::mock::MemoryStore;
    use parley_types::conversation::ConversationContext;

    fn service(store: &MemoryStore) -> ConversationService<MemoryStore, MemoryStore> {
        ConversationService::new(
            Arc::new(store.clone()),
            AuditLogger::new(Arc::new(store.clone()), 500),
            PageLimits::default(),
        )
    }

    fn inquiry(buyer: &str, vendor: &str, product: &str) -> NewConversation {
        NewConversation {
            buyer_id: buyer.to_string(),
            vendor_id: vendor.to_string(),
            context: ConversationContext::ProductInquiry,
            product_id: Some(product.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_or_get_is_idempotent() {
        let store = MemoryStore::new();
        let svc = service(&store);
        let buyer = Caller::buyer("b1");

        let first = svc.create_or_get(&buyer, inquiry("b1", "v1", "P1")).await.unwrap();
        let second = svc.create_or_get(&buyer, inquiry("b1", "v1", "P1")).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.conversation_count(), 1);

        let audits = store.audit_entries();
        assert_eq!(audits.len(), 1);
        assert_eq!(audits[0].action, AuditAction::ConversationCreated);
    }

    #[tokio::test]
    async fn test_different_product_creates_new_conversation() {
        let store = MemoryStore::new();
        let svc = service(&store);
        let buyer = Caller::buyer("b1");

        let p1 = svc.create_or_get(&buyer, inquiry("b1", "v1", "P1")).await.unwrap();
        let p2 = svc.create_or_get(&buyer, inquiry("b1", "v1", "P2")).await.unwrap();

        assert_ne!(p1.id, p2.id);
        assert_eq!(store.conversation_count(), 2);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_participants() {
        let store = MemoryStore::new();
        let svc = service(&store);

        let same = svc
            .create_or_get(&Caller::admin("mod"), inquiry("u1", "u1", "P1"))
            .await;
        assert!(matches!(same, Err(MessagingError::InvalidArgument(_))));

        let empty = svc
            .create_or_get(&Caller::admin("mod"), inquiry("  ", "v1", "P1"))
            .await;
        assert!(matches!(empty, Err(MessagingError::InvalidArgument(_))));

        let stranger = svc
            .create_or_get(&Caller::buyer("b2"), inquiry("b1", "v1", "P1"))
            .await;
        assert!(matches!(stranger, Err(MessagingError::Forbidden)));
        assert_eq!(store.conversation_count(), 0);
    }

    #[tokio::test]
    async fn test_create_succeeds_when_audit_is_down() {
        let store = MemoryStore::new();
        store.break_audit();
        let svc = service(&store);

        let conv = svc
            .create_or_get(&Caller::vendor("v1"), inquiry("b1", "v1", "P1"))
            .await
            .unwrap();
        assert_eq!(conv.status, ConversationStatus::Active);
        assert!(store.audit_entries().is_empty());
    }

    #[tokio::test]
    async fn test_get_for_user_hides_foreign_conversations() {
        let store = MemoryStore::new();
        let svc = service(&store);
        let conv = svc
            .create_or_get(&Caller::buyer("b1"), inquiry("b1", "v1", "P1"))
            .await
            .unwrap();

        assert!(svc.get_for_user(&conv.id, &Caller::buyer("b1")).await.is_ok());
        assert!(svc.get_for_user(&conv.id, &Caller::vendor("v1")).await.is_ok());
        assert!(svc.get_for_user(&conv.id, &Caller::admin("mod")).await.is_ok());
        assert!(matches!(
            svc.get_for_user(&conv.id, &Caller::buyer("b2")).await,
            Err(MessagingError::NotFound(_))
        ));
        // A vendor id used with the buyer role does not match the buyer side.
        assert!(matches!(
            svc.get_for_user(&conv.id, &Caller::buyer("v1")).await,
            Err(MessagingError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_excludes_closed_for_participants() {
        let store = MemoryStore::new();
        let svc = service(&store);
        let buyer = Caller::buyer("b1");

        let open = svc.create_or_get(&buyer, inquiry("b1", "v1", "P1")).await.unwrap();
        let closed = svc.create_or_get(&buyer, inquiry("b1", "v1", "P2")).await.unwrap();
        svc.update_flags(
            &closed.id,
            &ConversationPatch {
                status: Some(ConversationStatus::Closed),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let page = svc
            .list_for_user(&buyer, &ConversationListQuery::default())
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, open.id);

        let admin_page = svc
            .list_for_user(&Caller::admin("mod"), &ConversationListQuery::default())
            .await
            .unwrap();
        assert_eq!(admin_page.items.len(), 2);

        let closed_only = svc
            .list_for_user(
                &buyer,
                &ConversationListQuery {
                    status: Some(ConversationStatus::Closed),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(closed_only.items.len(), 1);
    }

    #[tokio::test]
    async fn test_list_rejects_negative_limit() {
        let store = MemoryStore::new();
        let svc = service(&store);
        let result = svc
            .list_for_user(
                &Caller::buyer("b1"),
                &ConversationListQuery {
                    page: PageRequest::first(-1),
                    status: None,
                },
            )
            .await;
        assert!(matches!(result, Err(MessagingError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_pin_and_mute_touch_only_caller_side() {
        let store = MemoryStore::new();
        let svc = service(&store);
        let conv = svc
            .create_or_get(&Caller::buyer("b1"), inquiry("b1", "v1", "P1"))
            .await
            .unwrap();

        let pinned = svc.set_pinned(&conv.id, &Caller::vendor("v1"), true).await.unwrap();
        assert!(pinned.is_pinned_vendor);
        assert!(!pinned.is_pinned_buyer);
        assert!(pinned.updated_at >= conv.updated_at);

        let muted = svc.set_muted(&conv.id, &Caller::buyer("b1"), true).await.unwrap();
        assert!(muted.is_muted_buyer);
        assert!(!muted.is_muted_vendor);
        assert!(muted.is_pinned_vendor);

        assert!(matches!(
            svc.set_pinned(&conv.id, &Caller::admin("mod"), true).await,
            Err(MessagingError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn test_update_flags_missing_conversation() {
        let store = MemoryStore::new();
        let svc = service(&store);
        let result = svc
            .update_flags(&ConversationId::new(), &ConversationPatch::default())
            .await;
        assert!(matches!(result, Err(MessagingError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_unread_count_requires_party_role() {
        let store = MemoryStore::new();
        let svc = service(&store);
        assert_eq!(svc.unread_count(&Caller::buyer("b1")).await.unwrap(), 0);
        assert!(matches!(
            svc.unread_count(&Caller::admin("mod")).await,
            Err(MessagingError::Forbidden)
        ));
    }
}

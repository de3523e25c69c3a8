//! Best-effort audit logger.
//!
//! Appends go through [`AuditLogger::append`], which never fails: a storage
//! error is logged and swallowed so an audit outage cannot block messaging.
//! Moderation transitions do not use this path; their audit row commits in
//! the same transaction as the status change.

use std::sync::Arc;

use parley_types::audit::AuditLogEntry;
use parley_types::conversation::ConversationId;
use parley_types::error::MessagingError;
use tracing::{debug, warn};

use crate::repository::audit::AuditRepository;

/// Audit trail writer and reader.
pub struct AuditLogger<A: AuditRepository> {
    repo: Arc<A>,
    query_max: u32,
}

impl<A: AuditRepository> AuditLogger<A> {
    pub fn new(repo: Arc<A>, query_max: u32) -> Self {
        Self {
            repo,
            query_max: query_max.max(1),
        }
    }

    /// Append an entry. Returns whether it was persisted.
    pub async fn append(&self, entry: &AuditLogEntry) -> bool {
        if !entry.action.is_faithful() {
            warn!(
                action = %entry.action,
                performed_by = %entry.performed_by,
                "Audit append refused, action is reserved or malformed"
            );
            return false;
        }
        match self.repo.append(entry).await {
            Ok(()) => {
                debug!(action = %entry.action, performed_by = %entry.performed_by, "Audit entry recorded");
                true
            }
            Err(e) => {
                warn!(
                    action = %entry.action,
                    performed_by = %entry.performed_by,
                    error = %e,
                    "Audit append failed, continuing without audit record"
                );
                false
            }
        }
    }

    /// Most recent entries first, optionally for one conversation.
    ///
    /// `limit` must be at least 1 and is clamped to the configured maximum.
    pub async fn query(
        &self,
        conversation_id: Option<&ConversationId>,
        limit: i64,
    ) -> Result<Vec<AuditLogEntry>, MessagingError> {
        if limit < 1 {
            return Err(MessagingError::invalid(format!(
                "limit must be at least 1, got {limit}"
            )));
        }
        let limit = u32::try_from(limit).unwrap_or(u32::MAX).min(self.query_max);
        Ok(self.repo.query(conversation_id, limit).await?)
    }
}

impl<A: AuditRepository> Clone for AuditLogger<A> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
            query_max: self.query_max,
        }
    }
}

//! SQLite conversation repository implementation.
//!
//! Implements `ConversationRepository` from `parley-core` using sqlx with
//! split read/write pools. Writes that must be read back run as a
//! transaction on the writer so the caller sees its own commit.

use parley_core::repository::conversation::{
    ConversationFilter, ConversationRepository, TransitionOutcome,
};
use parley_types::audit::AuditLogEntry;
use parley_types::conversation::{
    Conversation, ConversationId, ConversationKey, ConversationPatch, ConversationStatus,
};
use parley_types::error::RepositoryError;
use parley_types::identity::Party;
use parley_types::message::MessageId;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqliteArguments, SqliteConnection, SqliteRow};
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, parse_optional_datetime, query_err};

type SqliteQuery<'q> = sqlx::query::Query<'q, sqlx::Sqlite, SqliteArguments<'q>>;

/// SQLite-backed implementation of `ConversationRepository`.
pub struct SqliteConversationRepository {
    pool: DatabasePool,
}

impl SqliteConversationRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Private Row type for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct ConversationRow {
    id: String,
    buyer_id: String,
    vendor_id: String,
    context: String,
    product_id: Option<String>,
    order_id: Option<String>,
    dispute_id: Option<String>,
    is_pinned_buyer: bool,
    is_pinned_vendor: bool,
    is_muted_buyer: bool,
    is_muted_vendor: bool,
    last_message_id: Option<String>,
    last_message_content: Option<String>,
    last_message_at: Option<String>,
    last_message_sender_id: Option<String>,
    unread_count_buyer: i64,
    unread_count_vendor: i64,
    status: String,
    archived_at: Option<String>,
    archived_by: Option<String>,
    flagged_at: Option<String>,
    flagged_by: Option<String>,
    flag_reason: Option<String>,
    moderator_notes: Option<String>,
    reviewed_at: Option<String>,
    reviewed_by: Option<String>,
    created_at: String,
    updated_at: String,
}

impl ConversationRow {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            buyer_id: row.try_get("buyer_id")?,
            vendor_id: row.try_get("vendor_id")?,
            context: row.try_get("context")?,
            product_id: row.try_get("product_id")?,
            order_id: row.try_get("order_id")?,
            dispute_id: row.try_get("dispute_id")?,
            is_pinned_buyer: row.try_get("is_pinned_buyer")?,
            is_pinned_vendor: row.try_get("is_pinned_vendor")?,
            is_muted_buyer: row.try_get("is_muted_buyer")?,
            is_muted_vendor: row.try_get("is_muted_vendor")?,
            last_message_id: row.try_get("last_message_id")?,
            last_message_content: row.try_get("last_message_content")?,
            last_message_at: row.try_get("last_message_at")?,
            last_message_sender_id: row.try_get("last_message_sender_id")?,
            unread_count_buyer: row.try_get("unread_count_buyer")?,
            unread_count_vendor: row.try_get("unread_count_vendor")?,
            status: row.try_get("status")?,
            archived_at: row.try_get("archived_at")?,
            archived_by: row.try_get("archived_by")?,
            flagged_at: row.try_get("flagged_at")?,
            flagged_by: row.try_get("flagged_by")?,
            flag_reason: row.try_get("flag_reason")?,
            moderator_notes: row.try_get("moderator_notes")?,
            reviewed_at: row.try_get("reviewed_at")?,
            reviewed_by: row.try_get("reviewed_by")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_conversation(self) -> Result<Conversation, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid conversation id: {e}")))?;
        let last_message_id = self
            .last_message_id
            .as_deref()
            .map(Uuid::parse_str)
            .transpose()
            .map_err(|e| RepositoryError::Query(format!("invalid last_message_id: {e}")))?
            .map(MessageId::from_uuid);

        Ok(Conversation {
            id: ConversationId::from_uuid(id),
            buyer_id: self.buyer_id,
            vendor_id: self.vendor_id,
            context: self.context.parse().map_err(RepositoryError::Query)?,
            product_id: self.product_id,
            order_id: self.order_id,
            dispute_id: self.dispute_id,
            is_pinned_buyer: self.is_pinned_buyer,
            is_pinned_vendor: self.is_pinned_vendor,
            is_muted_buyer: self.is_muted_buyer,
            is_muted_vendor: self.is_muted_vendor,
            last_message_id,
            last_message_content: self.last_message_content,
            last_message_at: parse_optional_datetime(self.last_message_at)?,
            last_message_sender_id: self.last_message_sender_id,
            unread_count_buyer: counter(self.unread_count_buyer)?,
            unread_count_vendor: counter(self.unread_count_vendor)?,
            status: self.status.parse().map_err(RepositoryError::Query)?,
            archived_at: parse_optional_datetime(self.archived_at)?,
            archived_by: self.archived_by,
            flagged_at: parse_optional_datetime(self.flagged_at)?,
            flagged_by: self.flagged_by,
            flag_reason: self.flag_reason,
            moderator_notes: self.moderator_notes,
            reviewed_at: parse_optional_datetime(self.reviewed_at)?,
            reviewed_by: self.reviewed_by,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn counter(value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value)
        .map_err(|_| RepositoryError::Query(format!("unread counter out of range: {value}")))
}

pub(crate) fn row_to_conversation(row: &SqliteRow) -> Result<Conversation, RepositoryError> {
    ConversationRow::from_row(row)
        .map_err(|e| RepositoryError::Query(e.to_string()))?
        .into_conversation()
}

/// Column holding the unread counter for `party`.
pub(crate) fn unread_column(party: Party) -> &'static str {
    match party {
        Party::Buyer => "unread_count_buyer",
        Party::Vendor => "unread_count_vendor",
    }
}

/// Read a conversation inside an open transaction.
pub(crate) async fn fetch_in_tx(
    conn: &mut SqliteConnection,
    id: &ConversationId,
) -> Result<Option<Conversation>, RepositoryError> {
    let row = sqlx::query("SELECT * FROM conversations WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(conn)
        .await
        .map_err(query_err)?;
    row.as_ref().map(row_to_conversation).transpose()
}

/// `UPDATE` statement applying a patch. Unset patch fields keep their
/// column value. With `guarded`, a trailing `status IN (...)` clause with
/// that many placeholders restricts the update to the allowed source states.
fn patch_sql(guarded: usize) -> String {
    let mut sql = String::from(
        r#"UPDATE conversations SET
               is_pinned_buyer = COALESCE(?, is_pinned_buyer),
               is_pinned_vendor = COALESCE(?, is_pinned_vendor),
               is_muted_buyer = COALESCE(?, is_muted_buyer),
               is_muted_vendor = COALESCE(?, is_muted_vendor),
               status = COALESCE(?, status),
               archived_at = COALESCE(?, archived_at),
               archived_by = COALESCE(?, archived_by),
               flagged_at = COALESCE(?, flagged_at),
               flagged_by = COALESCE(?, flagged_by),
               flag_reason = COALESCE(?, flag_reason),
               moderator_notes = COALESCE(?, moderator_notes),
               reviewed_at = COALESCE(?, reviewed_at),
               reviewed_by = COALESCE(?, reviewed_by),
               updated_at = ?
           WHERE id = ?"#,
    );
    if guarded > 0 {
        let placeholders = vec!["?"; guarded].join(", ");
        sql.push_str(&format!(" AND status IN ({placeholders})"));
    }
    sql
}

fn bind_patch<'q>(
    query: SqliteQuery<'q>,
    id: &ConversationId,
    patch: &ConversationPatch,
    updated_at: &DateTime<Utc>,
) -> SqliteQuery<'q> {
    query
        .bind(patch.is_pinned_buyer)
        .bind(patch.is_pinned_vendor)
        .bind(patch.is_muted_buyer)
        .bind(patch.is_muted_vendor)
        .bind(patch.status.map(|s| s.to_string()))
        .bind(patch.archived_at.as_ref().map(format_datetime))
        .bind(patch.archived_by.clone())
        .bind(patch.flagged_at.as_ref().map(format_datetime))
        .bind(patch.flagged_by.clone())
        .bind(patch.flag_reason.clone())
        .bind(patch.moderator_notes.clone())
        .bind(patch.reviewed_at.as_ref().map(format_datetime))
        .bind(patch.reviewed_by.clone())
        .bind(format_datetime(updated_at))
        .bind(id.to_string())
}

// ---------------------------------------------------------------------------
// ConversationRepository implementation
// ---------------------------------------------------------------------------

impl ConversationRepository for SqliteConversationRepository {
    async fn create_or_get(
        &self,
        conversation: &Conversation,
    ) -> Result<(Conversation, bool), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        // The unique key index turns a duplicate into a no-op insert.
        let result = sqlx::query(
            r#"INSERT INTO conversations (
                   id, buyer_id, vendor_id, context, product_id, order_id, dispute_id,
                   is_pinned_buyer, is_pinned_vendor, is_muted_buyer, is_muted_vendor,
                   unread_count_buyer, unread_count_vendor, status, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT DO NOTHING"#,
        )
        .bind(conversation.id.to_string())
        .bind(&conversation.buyer_id)
        .bind(&conversation.vendor_id)
        .bind(conversation.context.to_string())
        .bind(&conversation.product_id)
        .bind(&conversation.order_id)
        .bind(&conversation.dispute_id)
        .bind(conversation.is_pinned_buyer)
        .bind(conversation.is_pinned_vendor)
        .bind(conversation.is_muted_buyer)
        .bind(conversation.is_muted_vendor)
        .bind(i64::from(conversation.unread_count_buyer))
        .bind(i64::from(conversation.unread_count_vendor))
        .bind(conversation.status.to_string())
        .bind(format_datetime(&conversation.created_at))
        .bind(format_datetime(&conversation.updated_at))
        .execute(&mut *tx)
        .await
        .map_err(query_err)?;
        let created = result.rows_affected() == 1;

        let row = sqlx::query(
            r#"SELECT * FROM conversations
               WHERE buyer_id = ? AND vendor_id = ? AND context = ?
                 AND IFNULL(product_id, '') = IFNULL(?, '')
                 AND IFNULL(order_id, '') = IFNULL(?, '')"#,
        )
        .bind(&conversation.buyer_id)
        .bind(&conversation.vendor_id)
        .bind(conversation.context.to_string())
        .bind(&conversation.product_id)
        .bind(&conversation.order_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(query_err)?;
        let stored = row_to_conversation(&row)?;

        tx.commit().await.map_err(query_err)?;
        Ok((stored, created))
    }

    async fn find_by_key(
        &self,
        key: &ConversationKey,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let row = sqlx::query(
            r#"SELECT * FROM conversations
               WHERE buyer_id = ? AND vendor_id = ? AND context = ?
                 AND IFNULL(product_id, '') = IFNULL(?, '')
                 AND IFNULL(order_id, '') = IFNULL(?, '')"#,
        )
        .bind(&key.buyer_id)
        .bind(&key.vendor_id)
        .bind(key.context.to_string())
        .bind(&key.product_id)
        .bind(&key.order_id)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(query_err)?;

        row.as_ref().map(row_to_conversation).transpose()
    }

    async fn get_by_id(&self, id: &ConversationId) -> Result<Option<Conversation>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM conversations WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        row.as_ref().map(row_to_conversation).transpose()
    }

    async fn list(&self, filter: &ConversationFilter) -> Result<Vec<Conversation>, RepositoryError> {
        let mut sql = String::from("SELECT * FROM conversations WHERE 1 = 1");
        if let Some((party, _)) = &filter.participant {
            sql.push_str(match party {
                Party::Buyer => " AND buyer_id = ?",
                Party::Vendor => " AND vendor_id = ?",
            });
        }
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        } else if filter.exclude_closed {
            sql.push_str(" AND status != 'closed'");
        }
        if filter.after.is_some() {
            sql.push_str(" AND (updated_at < ? OR (updated_at = ? AND id < ?))");
        }
        sql.push_str(" ORDER BY updated_at DESC, id DESC LIMIT ?");

        let mut query = sqlx::query(&sql);
        if let Some((_, user_id)) = &filter.participant {
            query = query.bind(user_id);
        }
        if let Some(status) = filter.status {
            query = query.bind(status.to_string());
        }
        if let Some(cursor) = &filter.after {
            let at = format_datetime(&cursor.at);
            query = query.bind(at.clone()).bind(at).bind(cursor.id.to_string());
        }
        let rows = query
            .bind(i64::from(filter.limit))
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_err)?;

        rows.iter().map(row_to_conversation).collect()
    }

    async fn update_flags(
        &self,
        id: &ConversationId,
        patch: &ConversationPatch,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        let sql = patch_sql(0);
        let result = bind_patch(sqlx::query(&sql), id, patch, &updated_at)
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }

        let updated = fetch_in_tx(&mut *tx, id).await?;
        tx.commit().await.map_err(query_err)?;
        Ok(updated)
    }

    async fn transition(
        &self,
        id: &ConversationId,
        allowed_from: &[ConversationStatus],
        patch: &ConversationPatch,
        updated_at: DateTime<Utc>,
        audit: &AuditLogEntry,
    ) -> Result<TransitionOutcome, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        let sql = patch_sql(allowed_from.len());
        let mut query = bind_patch(sqlx::query(&sql), id, patch, &updated_at);
        for status in allowed_from {
            query = query.bind(status.to_string());
        }
        let result = query.execute(&mut *tx).await.map_err(query_err)?;

        if result.rows_affected() == 0 {
            // Dropping the transaction rolls it back; nothing was written.
            return Ok(match fetch_in_tx(&mut *tx, id).await? {
                Some(current) => TransitionOutcome::Rejected(current.status),
                None => TransitionOutcome::NotFound,
            });
        }

        super::audit::insert_entry(&mut *tx, audit).await?;

        let updated = fetch_in_tx(&mut *tx, id)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        tx.commit().await.map_err(query_err)?;
        Ok(TransitionOutcome::Applied(updated))
    }

    async fn unread_total(&self, user_id: &str, party: Party) -> Result<u64, RepositoryError> {
        let sql = match party {
            Party::Buyer => {
                "SELECT COALESCE(SUM(unread_count_buyer), 0) AS total FROM conversations
                 WHERE buyer_id = ? AND status != 'closed'"
            }
            Party::Vendor => {
                "SELECT COALESCE(SUM(unread_count_vendor), 0) AS total FROM conversations
                 WHERE vendor_id = ? AND status != 'closed'"
            }
        };
        let row = sqlx::query(sql)
            .bind(user_id)
            .fetch_one(&self.pool.reader)
            .await
            .map_err(query_err)?;

        let total: i64 = row
            .try_get("total")
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(u64::try_from(total).unwrap_or(0))
    }

    async fn list_flagged(&self, limit: u32) -> Result<Vec<Conversation>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM conversations WHERE status = 'flagged'
             ORDER BY flagged_at DESC, id DESC LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;

        rows.iter().map(row_to_conversation).collect()
    }
}

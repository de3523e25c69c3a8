//! SQLite message repository implementation.
//!
//! Every write that changes what counts as unread also adjusts the owning
//! conversation's counters in the same transaction, so a reader never sees
//! a message without its counter update or the reverse.

use parley_core::repository::message::{MessageFilter, MessageRepository};
use parley_types::conversation::{Conversation, ConversationId, ConversationStatus};
use parley_types::error::RepositoryError;
use parley_types::identity::Party;
use parley_types::message::{Message, MessageId};
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use uuid::Uuid;

use super::conversation::{fetch_in_tx, unread_column};
use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, parse_optional_datetime, query_err};

/// SQLite-backed implementation of `MessageRepository`.
pub struct SqliteMessageRepository {
    pool: DatabasePool,
}

impl SqliteMessageRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Private Row type for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct MessageRow {
    id: String,
    conversation_id: String,
    sender_id: String,
    sender_name: String,
    sender_role: String,
    content: String,
    message_type: String,
    attachment_url: Option<String>,
    attachment_name: Option<String>,
    is_read: bool,
    read_at: Option<String>,
    is_deleted: bool,
    deleted_at: Option<String>,
    deleted_by: Option<String>,
    created_at: String,
}

impl MessageRow {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            conversation_id: row.try_get("conversation_id")?,
            sender_id: row.try_get("sender_id")?,
            sender_name: row.try_get("sender_name")?,
            sender_role: row.try_get("sender_role")?,
            content: row.try_get("content")?,
            message_type: row.try_get("message_type")?,
            attachment_url: row.try_get("attachment_url")?,
            attachment_name: row.try_get("attachment_name")?,
            is_read: row.try_get("is_read")?,
            read_at: row.try_get("read_at")?,
            is_deleted: row.try_get("is_deleted")?,
            deleted_at: row.try_get("deleted_at")?,
            deleted_by: row.try_get("deleted_by")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_message(self) -> Result<Message, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid message id: {e}")))?;
        let conversation_id = Uuid::parse_str(&self.conversation_id)
            .map_err(|e| RepositoryError::Query(format!("invalid conversation_id: {e}")))?;

        Ok(Message {
            id: MessageId::from_uuid(id),
            conversation_id: ConversationId::from_uuid(conversation_id),
            sender_id: self.sender_id,
            sender_name: self.sender_name,
            sender_role: self.sender_role.parse().map_err(RepositoryError::Query)?,
            content: self.content,
            message_type: self.message_type.parse().map_err(RepositoryError::Query)?,
            attachment_url: self.attachment_url,
            attachment_name: self.attachment_name,
            is_read: self.is_read,
            read_at: parse_optional_datetime(self.read_at)?,
            is_deleted: self.is_deleted,
            deleted_at: parse_optional_datetime(self.deleted_at)?,
            deleted_by: self.deleted_by,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

fn row_to_message(row: &SqliteRow) -> Result<Message, RepositoryError> {
    MessageRow::from_row(row)
        .map_err(|e| RepositoryError::Query(e.to_string()))?
        .into_message()
}

async fn fetch_message(
    conn: &mut SqliteConnection,
    id: &MessageId,
) -> Result<Option<Message>, RepositoryError> {
    let row = sqlx::query("SELECT * FROM messages WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(conn)
        .await
        .map_err(query_err)?;
    row.as_ref().map(row_to_message).transpose()
}

// ---------------------------------------------------------------------------
// MessageRepository implementation
// ---------------------------------------------------------------------------

impl MessageRepository for SqliteMessageRepository {
    async fn create(&self, message: &Message, preview: &str) -> Result<Conversation, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        let Some(current) = fetch_in_tx(&mut *tx, &message.conversation_id).await? else {
            return Err(RepositoryError::NotFound);
        };
        if current.status == ConversationStatus::Closed {
            return Err(RepositoryError::Rejected("conversation is closed".to_string()));
        }

        sqlx::query(
            r#"INSERT INTO messages (
                   id, conversation_id, sender_id, sender_name, sender_role, content,
                   message_type, attachment_url, attachment_name, is_read, is_deleted, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 0, ?)"#,
        )
        .bind(message.id.to_string())
        .bind(message.conversation_id.to_string())
        .bind(&message.sender_id)
        .bind(&message.sender_name)
        .bind(message.sender_role.to_string())
        .bind(&message.content)
        .bind(message.message_type.to_string())
        .bind(&message.attachment_url)
        .bind(&message.attachment_name)
        .bind(format_datetime(&message.created_at))
        .execute(&mut *tx)
        .await
        .map_err(query_err)?;

        let (buyer_increment, vendor_increment): (i64, i64) = match message.recipient() {
            Some(Party::Buyer) => (1, 0),
            Some(Party::Vendor) => (0, 1),
            None => (0, 0),
        };
        let created_at = format_datetime(&message.created_at);
        let summary = sqlx::query(
            r#"UPDATE conversations
               SET last_message_id = ?, last_message_content = ?, last_message_at = ?,
                   last_message_sender_id = ?, updated_at = ?,
                   unread_count_buyer = unread_count_buyer + ?,
                   unread_count_vendor = unread_count_vendor + ?
               WHERE id = ? AND status != 'closed'"#,
        )
        .bind(message.id.to_string())
        .bind(preview)
        .bind(&created_at)
        .bind(&message.sender_id)
        .bind(&created_at)
        .bind(buyer_increment)
        .bind(vendor_increment)
        .bind(message.conversation_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(query_err)?;
        if summary.rows_affected() == 0 {
            return Err(RepositoryError::Rejected("conversation is closed".to_string()));
        }

        let conversation = fetch_in_tx(&mut *tx, &message.conversation_id)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        tx.commit().await.map_err(query_err)?;
        Ok(conversation)
    }

    async fn get_by_id(&self, id: &MessageId) -> Result<Option<Message>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM messages WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        row.as_ref().map(row_to_message).transpose()
    }

    async fn list(
        &self,
        conversation_id: &ConversationId,
        filter: &MessageFilter,
    ) -> Result<Vec<Message>, RepositoryError> {
        let mut sql = String::from("SELECT * FROM messages WHERE conversation_id = ?");
        if !filter.include_deleted {
            sql.push_str(" AND is_deleted = 0");
        }
        if filter.after.is_some() {
            sql.push_str(" AND (created_at < ? OR (created_at = ? AND id < ?))");
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC LIMIT ?");

        let mut query = sqlx::query(&sql).bind(conversation_id.to_string());
        if let Some(cursor) = &filter.after {
            let at = format_datetime(&cursor.at);
            query = query.bind(at.clone()).bind(at).bind(cursor.id.to_string());
        }
        let rows = query
            .bind(i64::from(filter.limit))
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_err)?;

        rows.iter().map(row_to_message).collect()
    }

    async fn mark_read(&self, id: &MessageId, read_at: DateTime<Utc>) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE messages SET is_read = 1, read_at = ? WHERE id = ? AND is_read = 0")
            .bind(format_datetime(&read_at))
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(query_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_conversation_read(
        &self,
        conversation_id: &ConversationId,
        reader: Party,
        reader_id: &str,
        read_at: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        if fetch_in_tx(&mut *tx, conversation_id).await?.is_none() {
            return Err(RepositoryError::NotFound);
        }

        let marked = sqlx::query(
            r#"UPDATE messages SET is_read = 1, read_at = ?
               WHERE conversation_id = ? AND is_read = 0 AND sender_id != ?"#,
        )
        .bind(format_datetime(&read_at))
        .bind(conversation_id.to_string())
        .bind(reader_id)
        .execute(&mut *tx)
        .await
        .map_err(query_err)?
        .rows_affected();

        let sql = format!(
            "UPDATE conversations SET {} = 0 WHERE id = ?",
            unread_column(reader)
        );
        sqlx::query(&sql)
            .bind(conversation_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;

        tx.commit().await.map_err(query_err)?;
        Ok(marked)
    }

    async fn soft_delete(
        &self,
        id: &MessageId,
        deleted_by: &str,
        deleted_at: DateTime<Utc>,
    ) -> Result<Option<Message>, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        let Some(current) = fetch_message(&mut *tx, id).await? else {
            return Ok(None);
        };
        if current.is_deleted {
            return Ok(Some(current));
        }

        sqlx::query(
            "UPDATE messages SET is_deleted = 1, deleted_at = ?, deleted_by = ? WHERE id = ? AND is_deleted = 0",
        )
        .bind(format_datetime(&deleted_at))
        .bind(deleted_by)
        .bind(id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(query_err)?;

        if current.counts_as_unread() {
            if let Some(recipient) = current.recipient() {
                let column = unread_column(recipient);
                let sql = format!(
                    "UPDATE conversations SET {column} = MAX({column} - 1, 0) WHERE id = ?"
                );
                sqlx::query(&sql)
                    .bind(current.conversation_id.to_string())
                    .execute(&mut *tx)
                    .await
                    .map_err(query_err)?;
            }
        }

        let deleted = fetch_message(&mut *tx, id).await?;
        tx.commit().await.map_err(query_err)?;
        Ok(deleted)
    }
}

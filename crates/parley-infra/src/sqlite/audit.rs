//! SQLite audit log implementation.
//!
//! Append-only. Moderation transitions insert their entry through
//! [`insert_entry`] inside the transition's own transaction; everything else
//! goes through [`SqliteAuditRepository::append`].

use parley_core::repository::audit::AuditRepository;
use parley_types::audit::{AuditAction, AuditLogEntry};
use parley_types::conversation::ConversationId;
use parley_types::error::RepositoryError;
use parley_types::identity::Role;
use parley_types::message::MessageId;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, query_err};

/// SQLite-backed audit log.
pub struct SqliteAuditRepository {
    pool: DatabasePool,
}

impl SqliteAuditRepository {
    /// Create a new audit log backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

/// Insert one entry on an existing connection or transaction.
pub(crate) async fn insert_entry(
    conn: &mut SqliteConnection,
    entry: &AuditLogEntry,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r#"INSERT INTO audit_logs (id, action, performed_by, performed_by_role, conversation_id, message_id, details, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(entry.id.to_string())
    .bind(entry.action.to_string())
    .bind(&entry.performed_by)
    .bind(entry.performed_by_role.to_string())
    .bind(entry.conversation_id.map(|id| id.to_string()))
    .bind(entry.message_id.map(|id| id.to_string()))
    .bind(&entry.details)
    .bind(format_datetime(&entry.created_at))
    .execute(conn)
    .await
    .map_err(query_err)?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Private Row type
// ---------------------------------------------------------------------------

struct AuditRow {
    id: String,
    action: String,
    performed_by: String,
    performed_by_role: String,
    conversation_id: Option<String>,
    message_id: Option<String>,
    details: Option<String>,
    created_at: String,
}

impl AuditRow {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            action: row.try_get("action")?,
            performed_by: row.try_get("performed_by")?,
            performed_by_role: row.try_get("performed_by_role")?,
            conversation_id: row.try_get("conversation_id")?,
            message_id: row.try_get("message_id")?,
            details: row.try_get("details")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_entry(self) -> Result<AuditLogEntry, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid audit id: {e}")))?;
        let action: AuditAction = self.action.parse().map_err(RepositoryError::Query)?;
        let performed_by_role: Role = self
            .performed_by_role
            .parse()
            .map_err(RepositoryError::Query)?;
        let conversation_id = self
            .conversation_id
            .as_deref()
            .map(str::parse::<ConversationId>)
            .transpose()
            .map_err(|e| RepositoryError::Query(format!("invalid conversation_id: {e}")))?;
        let message_id = self
            .message_id
            .as_deref()
            .map(str::parse::<MessageId>)
            .transpose()
            .map_err(|e| RepositoryError::Query(format!("invalid message_id: {e}")))?;

        Ok(AuditLogEntry {
            id,
            action,
            performed_by: self.performed_by,
            performed_by_role,
            conversation_id,
            message_id,
            details: self.details,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

fn rows_to_entries(rows: &[SqliteRow]) -> Result<Vec<AuditLogEntry>, RepositoryError> {
    let mut entries = Vec::with_capacity(rows.len());
    for row in rows {
        let audit_row =
            AuditRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
        entries.push(audit_row.into_entry()?);
    }
    Ok(entries)
}

impl AuditRepository for SqliteAuditRepository {
    async fn append(&self, entry: &AuditLogEntry) -> Result<(), RepositoryError> {
        let mut conn = self.pool.writer.acquire().await.map_err(query_err)?;
        insert_entry(&mut *conn, entry).await
    }

    async fn query(
        &self,
        conversation_id: Option<&ConversationId>,
        limit: u32,
    ) -> Result<Vec<AuditLogEntry>, RepositoryError> {
        let rows = match conversation_id {
            Some(id) => {
                sqlx::query(
                    "SELECT * FROM audit_logs WHERE conversation_id = ?
                     ORDER BY created_at DESC, id DESC LIMIT ?",
                )
                .bind(id.to_string())
                .bind(i64::from(limit))
                .fetch_all(&self.pool.reader)
                .await
            }
            None => {
                sqlx::query("SELECT * FROM audit_logs ORDER BY created_at DESC, id DESC LIMIT ?")
                    .bind(i64::from(limit))
                    .fetch_all(&self.pool.reader)
                    .await
            }
        }
        .map_err(query_err)?;

        rows_to_entries(&rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_types::identity::Caller;
    use parley_types::time;

    async fn test_pool() -> DatabasePool {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        std::mem::forget(dir);
        DatabasePool::new(&url).await.unwrap()
    }

    fn make_entry(action: AuditAction, conversation: Option<ConversationId>) -> AuditLogEntry {
        let entry = AuditLogEntry::new(action, &Caller::admin("mod-1"), time::now());
        match conversation {
            Some(id) => entry.with_conversation(id),
            None => entry,
        }
    }

    #[tokio::test]
    async fn test_append_and_query_round_trip() {
        let pool = test_pool().await;
        let repo = SqliteAuditRepository::new(pool);

        let conv = ConversationId::new();
        let entry = make_entry(AuditAction::ConversationFlagged, Some(conv))
            .with_message(MessageId::new())
            .with_details("abuse");
        repo.append(&entry).await.unwrap();

        let logged = repo.query(Some(&conv), 10).await.unwrap();
        assert_eq!(logged, vec![entry]);
    }

    #[tokio::test]
    async fn test_query_orders_newest_first_and_limits() {
        let pool = test_pool().await;
        let repo = SqliteAuditRepository::new(pool);

        let conv = ConversationId::new();
        for action in [
            AuditAction::ConversationCreated,
            AuditAction::ConversationFlagged,
            AuditAction::ConversationUnflagged,
        ] {
            repo.append(&make_entry(action, Some(conv))).await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        repo.append(&make_entry(AuditAction::MessageDeleted, None))
            .await
            .unwrap();

        let scoped = repo.query(Some(&conv), 10).await.unwrap();
        let actions: Vec<_> = scoped.iter().map(|e| e.action.clone()).collect();
        assert_eq!(
            actions,
            vec![
                AuditAction::ConversationUnflagged,
                AuditAction::ConversationFlagged,
                AuditAction::ConversationCreated,
            ]
        );

        assert_eq!(repo.query(None, 10).await.unwrap().len(), 4);
        assert_eq!(repo.query(None, 2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_custom_action_survives_storage() {
        let pool = test_pool().await;
        let repo = SqliteAuditRepository::new(pool);

        let entry = make_entry(AuditAction::Other("EXPORT_REQUESTED".to_string()), None);
        repo.append(&entry).await.unwrap();

        let logged = repo.query(None, 1).await.unwrap();
        assert_eq!(
            logged[0].action,
            AuditAction::Other("EXPORT_REQUESTED".to_string())
        );
    }
}

//! libSQL backend: async `ConversationStore` implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::assistant::AssistantType;
use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{Conversation, ConversationStore, Message, MessageRole};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to enable foreign keys: {e}")))?;

        migrations::run_migrations(&conn).await?;

        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Current time at the precision the store keeps.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Canonical write format. Fixed width so text ordering matches time ordering.
fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a timestamp written by `format_datetime`.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Corrupt(format!("bad timestamp {s:?}: {e}")))
}

fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::Corrupt(format!("bad id {s:?}: {e}")))
}

/// Map a libsql Row to a Conversation.
///
/// Column order matches CONVERSATION_COLUMNS.
fn row_to_conversation(row: &libsql::Row) -> Result<Conversation, DatabaseError> {
    let get = |idx: i32| -> Result<String, DatabaseError> {
        row.get::<String>(idx)
            .map_err(|e| DatabaseError::Corrupt(format!("conversations column {idx}: {e}")))
    };

    let assistant_type = get(2)?
        .parse::<AssistantType>()
        .map_err(DatabaseError::Corrupt)?;

    Ok(Conversation {
        id: parse_uuid(&get(0)?)?,
        title: get(1)?,
        assistant_type,
        created_at: parse_datetime(&get(3)?)?,
        updated_at: parse_datetime(&get(4)?)?,
    })
}

/// Map a libsql Row to a Message.
///
/// Column order matches MESSAGE_COLUMNS.
fn row_to_message(row: &libsql::Row) -> Result<Message, DatabaseError> {
    let get = |idx: i32| -> Result<String, DatabaseError> {
        row.get::<String>(idx)
            .map_err(|e| DatabaseError::Corrupt(format!("messages column {idx}: {e}")))
    };

    let role = get(2)?.parse::<MessageRole>().map_err(DatabaseError::Corrupt)?;

    Ok(Message {
        id: parse_uuid(&get(0)?)?,
        conversation_id: parse_uuid(&get(1)?)?,
        role,
        content: get(3)?,
        created_at: parse_datetime(&get(4)?)?,
    })
}

// ── Trait implementation ────────────────────────────────────────────

const CONVERSATION_COLUMNS: &str = "id, title, assistant_type, created_at, updated_at";

const MESSAGE_COLUMNS: &str = "id, conversation_id, role, content, created_at";

#[async_trait]
impl ConversationStore for LibSqlBackend {
    async fn create_conversation(
        &self,
        title: &str,
        assistant_type: AssistantType,
    ) -> Result<Conversation, DatabaseError> {
        let created = now();
        let conversation = Conversation {
            id: Uuid::new_v4(),
            title: title.to_string(),
            assistant_type,
            created_at: created,
            updated_at: created,
        };

        let ts = format_datetime(created);
        self.conn()
            .execute(
                "INSERT INTO conversations (id, title, assistant_type, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    conversation.id.to_string(),
                    title,
                    assistant_type.as_str(),
                    ts.clone(),
                    ts
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("create_conversation: {e}")))?;

        debug!(conversation_id = %conversation.id, %assistant_type, "Conversation created");
        Ok(conversation)
    }

    async fn append_message(
        &self,
        conversation_id: Uuid,
        role: MessageRole,
        content: &str,
    ) -> Result<Message, DatabaseError> {
        let id = Uuid::new_v4();

        // created_at never goes below the conversation's newest message; ties fall back to rowid.
        // trg_messages_touch_conversation advances updated_at in the same statement.
        let mut rows = self
            .conn()
            .query(
                "INSERT INTO messages (id, conversation_id, role, content, created_at)
                 SELECT ?1, ?2, ?3, ?4, MAX(?5, COALESCE(
                     (SELECT MAX(created_at) FROM messages WHERE conversation_id = ?2),
                     ?5))
                 RETURNING created_at",
                params![
                    id.to_string(),
                    conversation_id.to_string(),
                    role.as_str(),
                    content,
                    format_datetime(now())
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("append_message: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("append_message: {e}")))?
            .ok_or_else(|| DatabaseError::Query("append_message: no row returned".to_string()))?;
        let stamp = row
            .get::<String>(0)
            .map_err(|e| DatabaseError::Corrupt(format!("append_message created_at: {e}")))?;

        Ok(Message {
            id,
            conversation_id,
            role,
            content: content.to_string(),
            created_at: parse_datetime(&stamp)?,
        })
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages
                     WHERE conversation_id = ?1 ORDER BY created_at ASC, rowid ASC"
                ),
                params![conversation_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_messages: {e}")))?;

        let mut messages = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_messages: {e}")))?
        {
            messages.push(row_to_message(&row)?);
        }
        Ok(messages)
    }

    async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_conversation: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("get_conversation: {e}")))?
        {
            Some(row) => Ok(Some(row_to_conversation(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_conversations(
        &self,
        assistant_type: AssistantType,
    ) -> Result<Vec<Conversation>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations
                     WHERE assistant_type = ?1 ORDER BY updated_at DESC, rowid DESC"
                ),
                params![assistant_type.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_conversations: {e}")))?;

        let mut conversations = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_conversations: {e}")))?
        {
            conversations.push(row_to_conversation(&row)?);
        }
        Ok(conversations)
    }
}

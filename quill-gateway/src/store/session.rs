//! Chat sessions and their messages.
//!
//! Every query is scoped by owner: a session that belongs to someone else is
//! indistinguishable from one that does not exist.

use super::{format_ts, now_utc, parse_ts, Database};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use quill_common::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

const MAX_TITLE_CHARS: usize = 200;

/// Chat session record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            other => anyhow::bail!("Unknown message role '{}'", other),
        }
    }
}

/// A single message in a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub session_id: String,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    let created_at: String = row.get(3)?;
    let updated_at: String = row.get(4)?;
    Ok(Session {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<ChatMessage> {
    let role: String = row.get(2)?;
    let created_at: String = row.get(4)?;
    Ok(ChatMessage {
        id: row.get(0)?,
        session_id: row.get(1)?,
        role: role.parse().unwrap_or(MessageRole::User),
        content: row.get(3)?,
        created_at: parse_ts(&created_at),
    })
}

fn validate_title(title: &str) -> Result<&str> {
    let title = title.trim();
    if title.is_empty() {
        return Err(Error::InvalidInput("Session title cannot be empty".into()).into());
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(Error::InvalidInput(format!(
            "Session title too long (max {} characters)",
            MAX_TITLE_CHARS
        ))
        .into());
    }
    Ok(title)
}

/// Session and message store.
#[derive(Clone)]
pub struct SessionStore {
    db: Database,
}

impl SessionStore {
    pub(crate) fn new(db: Database) -> Self {
        Self { db }
    }

    fn get_internal(conn: &Connection, user_id: &str, id: &str) -> Result<Option<Session>> {
        conn.query_row(
            "SELECT id, user_id, title, created_at, updated_at
             FROM sessions WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
            session_from_row,
        )
        .optional()
        .with_context(|| format!("Failed to get session {}", id))
    }

    /// Create a new session owned by `user_id`.
    pub fn create(&self, user_id: &str, title: &str) -> Result<Session> {
        let title = validate_title(title)?;
        let conn = self.db.lock()?;
        let now = now_utc();
        let id = Uuid::new_v4().to_string();

        conn.execute(
            "INSERT INTO sessions (id, user_id, title, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![id, user_id, title, format_ts(&now)],
        )
        .with_context(|| format!("Failed to create session for {}", user_id))?;

        Ok(Session {
            id,
            user_id: user_id.to_string(),
            title: title.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Get a session owned by `user_id`.
    pub fn get(&self, user_id: &str, id: &str) -> Result<Option<Session>> {
        let conn = self.db.lock()?;
        Self::get_internal(&conn, user_id, id)
    }

    /// List a user's sessions, most recently active first.
    pub fn list_for_user(&self, user_id: &str) -> Result<Vec<Session>> {
        let conn = self.db.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, title, created_at, updated_at
             FROM sessions WHERE user_id = ?1 ORDER BY updated_at DESC, id",
        )?;

        let sessions = stmt
            .query_map(params![user_id], session_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    /// Rename a session. Returns `None` when it is missing or not owned.
    pub fn rename(&self, user_id: &str, id: &str, title: &str) -> Result<Option<Session>> {
        let title = validate_title(title)?;
        let conn = self.db.lock()?;
        let rows = conn.execute(
            "UPDATE sessions SET title = ?1, updated_at = ?2 WHERE id = ?3 AND user_id = ?4",
            params![title, format_ts(&now_utc()), id, user_id],
        )?;

        if rows == 0 {
            return Ok(None);
        }
        Self::get_internal(&conn, user_id, id)
    }

    /// Delete a session and its messages.
    pub fn delete(&self, user_id: &str, id: &str) -> Result<bool> {
        let conn = self.db.lock()?;
        let rows = conn.execute(
            "DELETE FROM sessions WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        Ok(rows > 0)
    }

    /// Append a message and bump the session's activity time.
    /// Returns `None` when the session is missing or not owned.
    pub fn append_message(
        &self,
        user_id: &str,
        session_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<Option<ChatMessage>> {
        if content.trim().is_empty() {
            return Err(Error::InvalidInput("Message content cannot be empty".into()).into());
        }

        let mut conn = self.db.lock()?;
        if Self::get_internal(&conn, user_id, session_id)?.is_none() {
            return Ok(None);
        }

        let now = now_utc();
        let id = Uuid::new_v4().to_string();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO messages (id, session_id, role, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, session_id, role.as_str(), content, format_ts(&now)],
        )?;
        tx.execute(
            "UPDATE sessions SET updated_at = ?1 WHERE id = ?2",
            params![format_ts(&now), session_id],
        )?;
        tx.commit()?;

        Ok(Some(ChatMessage {
            id,
            session_id: session_id.to_string(),
            role,
            content: content.to_string(),
            created_at: now,
        }))
    }

    /// Messages of a session in chronological order.
    /// Returns `None` when the session is missing or not owned.
    pub fn list_messages(&self, user_id: &str, session_id: &str) -> Result<Option<Vec<ChatMessage>>> {
        let conn = self.db.lock()?;
        if Self::get_internal(&conn, user_id, session_id)?.is_none() {
            return Ok(None);
        }

        // rowid breaks ties between messages written in the same instant.
        let mut stmt = conn.prepare(
            "SELECT id, session_id, role, content, created_at
             FROM messages WHERE session_id = ?1 ORDER BY created_at, rowid",
        )?;
        let messages = stmt
            .query_map(params![session_id], message_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(messages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SessionStore {
        Database::open_in_memory().unwrap().sessions()
    }

    #[test]
    fn test_create_and_get() {
        let store = store();
        let session = store.create("u1", "  My draft  ").unwrap();
        assert_eq!(session.title, "My draft");

        let found = store.get("u1", &session.id).unwrap().unwrap();
        assert_eq!(found.id, session.id);
        assert_eq!(found.user_id, "u1");
    }

    #[test]
    fn test_sessions_are_owner_scoped() {
        let store = store();
        let session = store.create("u1", "Private").unwrap();

        assert!(store.get("u2", &session.id).unwrap().is_none());
        assert!(store.rename("u2", &session.id, "Hijacked").unwrap().is_none());
        assert!(!store.delete("u2", &session.id).unwrap());
        assert!(store
            .append_message("u2", &session.id, MessageRole::User, "hi")
            .unwrap()
            .is_none());
        assert!(store.list_messages("u2", &session.id).unwrap().is_none());
        assert!(store.list_for_user("u2").unwrap().is_empty());
    }

    #[test]
    fn test_title_validation() {
        let store = store();
        assert!(store.create("u1", "   ").is_err());
        assert!(store.create("u1", &"x".repeat(201)).is_err());
        assert!(store.create("u1", &"x".repeat(200)).is_ok());
    }

    #[test]
    fn test_rename() {
        let store = store();
        let session = store.create("u1", "Old").unwrap();
        let renamed = store.rename("u1", &session.id, "New").unwrap().unwrap();
        assert_eq!(renamed.title, "New");
        assert!(renamed.updated_at >= session.updated_at);
    }

    #[test]
    fn test_messages_in_order_and_cascade_delete() {
        let store = store();
        let session = store.create("u1", "Chat").unwrap();

        store
            .append_message("u1", &session.id, MessageRole::User, "first")
            .unwrap()
            .unwrap();
        store
            .append_message("u1", &session.id, MessageRole::Assistant, "second")
            .unwrap()
            .unwrap();

        let messages = store.list_messages("u1", &session.id).unwrap().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "first");
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[1].role, MessageRole::Assistant);

        assert!(store.delete("u1", &session.id).unwrap());
        assert!(store.get("u1", &session.id).unwrap().is_none());

        let conn = store.db.lock().unwrap();
        let remaining: i64 = conn
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[test]
    fn test_empty_message_rejected() {
        let store = store();
        let session = store.create("u1", "Chat").unwrap();
        assert!(store
            .append_message("u1", &session.id, MessageRole::User, "  ")
            .is_err());
    }

    #[test]
    fn test_message_role_parse() {
        assert_eq!("assistant".parse::<MessageRole>().unwrap(), MessageRole::Assistant);
        assert!("robot".parse::<MessageRole>().is_err());
        assert_eq!(MessageRole::System.to_string(), "system");
    }
}

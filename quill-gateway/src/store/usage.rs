//! Usage history.
//!
//! One row per workflow step. `session_id` carries the coalesced workflow
//! token, so consecutive steps of one writing session group together.

use super::{format_ts, now_utc, page, parse_ts, Database};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use quill_common::Error;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const MAX_ACTION_CHARS: usize = 64;

/// Usage record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageEvent {
    pub id: String,
    pub user_id: String,
    pub session_id: String,
    pub action: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Filters for admin listings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UsageQuery {
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Per-action event count.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionCount {
    pub action: String,
    pub count: u64,
    pub users: u64,
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<UsageEvent> {
    let metadata: String = row.get(4)?;
    let created_at: String = row.get(5)?;
    Ok(UsageEvent {
        id: row.get(0)?,
        user_id: row.get(1)?,
        session_id: row.get(2)?,
        action: row.get(3)?,
        metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null),
        created_at: parse_ts(&created_at),
    })
}

/// Check a workflow step name: lowercase letters, digits, `_` or `-`.
pub fn validate_action(action: &str) -> Result<()> {
    if action.is_empty() || action.len() > MAX_ACTION_CHARS {
        return Err(Error::InvalidInput(format!(
            "Action must be 1-{} characters",
            MAX_ACTION_CHARS
        ))
        .into());
    }
    if !action
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
    {
        return Err(Error::InvalidInput(format!(
            "Action '{}' contains invalid characters",
            action
        ))
        .into());
    }
    Ok(())
}

/// Usage history store.
#[derive(Clone)]
pub struct UsageStore {
    db: Database,
}

impl UsageStore {
    pub(crate) fn new(db: Database) -> Self {
        Self { db }
    }

    /// Record one workflow step.
    pub fn record(
        &self,
        user_id: &str,
        session_id: &str,
        action: &str,
        metadata: serde_json::Value,
    ) -> Result<UsageEvent> {
        validate_action(action)?;

        let conn = self.db.lock()?;
        let now = now_utc();
        let id = Uuid::new_v4().to_string();

        conn.execute(
            "INSERT INTO usage_history (id, user_id, session_id, action, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                user_id,
                session_id,
                action,
                serde_json::to_string(&metadata)?,
                format_ts(&now),
            ],
        )?;

        tracing::debug!(
            user_id = %user_id,
            session_id = %session_id,
            action = %action,
            "Recorded usage"
        );

        Ok(UsageEvent {
            id,
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            action: action.to_string(),
            metadata,
            created_at: now,
        })
    }

    /// A user's history, newest first.
    pub fn list_for_user(
        &self,
        user_id: &str,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Vec<UsageEvent>> {
        self.list(&UsageQuery {
            limit,
            offset,
            user_id: Some(user_id.to_string()),
        })
    }

    /// History across all users, optionally filtered by user, newest first.
    pub fn list(&self, query: &UsageQuery) -> Result<Vec<UsageEvent>> {
        let (limit, offset) = page(query.limit, query.offset);
        let conn = self.db.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, session_id, action, metadata, created_at
             FROM usage_history
             WHERE (?1 IS NULL OR user_id = ?1)
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?2 OFFSET ?3",
        )?;

        let events = stmt
            .query_map(params![query.user_id, limit, offset], from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    /// Count events, optionally for one user.
    pub fn count(&self, user_id: Option<&str>) -> Result<u64> {
        let conn = self.db.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM usage_history WHERE (?1 IS NULL OR user_id = ?1)",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Event and distinct-user counts per action, busiest first.
    pub fn summary_by_action(&self) -> Result<Vec<ActionCount>> {
        let conn = self.db.lock()?;
        let mut stmt = conn.prepare(
            "SELECT action, COUNT(*), COUNT(DISTINCT user_id)
             FROM usage_history GROUP BY action ORDER BY COUNT(*) DESC, action",
        )?;

        let counts = stmt
            .query_map([], |row| {
                Ok(ActionCount {
                    action: row.get(0)?,
                    count: row.get::<_, i64>(1)? as u64,
                    users: row.get::<_, i64>(2)? as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> UsageStore {
        Database::open_in_memory().unwrap().usage()
    }

    #[test]
    fn test_record_and_list() {
        let store = store();
        store
            .record("u1", "session_u1_1", "generate_titles", json!({"count": 5}))
            .unwrap();
        store
            .record("u1", "session_u1_1", "humanize", json!({}))
            .unwrap();
        store.record("u2", "session_u2_1", "outline", json!(null)).unwrap();

        let mine = store.list_for_user("u1", None, None).unwrap();
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].action, "humanize", "newest first");
        assert_eq!(mine[1].metadata["count"], 5);
        assert!(mine.iter().all(|e| e.session_id == "session_u1_1"));

        assert_eq!(store.list(&UsageQuery::default()).unwrap().len(), 3);
        assert_eq!(store.count(None).unwrap(), 3);
        assert_eq!(store.count(Some("u2")).unwrap(), 1);
    }

    #[test]
    fn test_pagination() {
        let store = store();
        for _ in 0..5 {
            store.record("u1", "s", "outline", json!({})).unwrap();
        }
        assert_eq!(store.list_for_user("u1", Some(2), None).unwrap().len(), 2);
        assert_eq!(store.list_for_user("u1", Some(2), Some(4)).unwrap().len(), 1);
    }

    #[test]
    fn test_summary_by_action() {
        let store = store();
        store.record("u1", "s1", "humanize", json!({})).unwrap();
        store.record("u2", "s2", "humanize", json!({})).unwrap();
        store.record("u2", "s2", "humanize", json!({})).unwrap();
        store.record("u1", "s1", "generate_titles", json!({})).unwrap();

        let summary = store.summary_by_action().unwrap();
        assert_eq!(
            summary,
            vec![
                ActionCount {
                    action: "humanize".into(),
                    count: 3,
                    users: 2
                },
                ActionCount {
                    action: "generate_titles".into(),
                    count: 1,
                    users: 1
                },
            ]
        );
    }

    #[test]
    fn test_validate_action() {
        assert!(validate_action("generate_titles").is_ok());
        assert!(validate_action("step-2").is_ok());
        assert!(validate_action("").is_err());
        assert!(validate_action("Drop Table").is_err());
        assert!(validate_action(&"a".repeat(65)).is_err());
    }
}

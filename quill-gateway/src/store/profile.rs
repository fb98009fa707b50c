//! User profiles.
//!
//! Identity lives in the auth provider; this table only holds what the app
//! adds on top of it (display name, admin flag). Rows are created lazily the
//! first time an authenticated user touches a route that needs one.

use super::{format_ts, now_utc, page, parse_ts, Database};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use quill_common::Error;
use serde::{Deserialize, Serialize};

/// Profile record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Self-service profile update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

const COLUMNS: &str = "id, email, display_name, is_admin, created_at, updated_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Profile> {
    let created_at: String = row.get(4)?;
    let updated_at: String = row.get(5)?;
    Ok(Profile {
        id: row.get(0)?,
        email: row.get(1)?,
        display_name: row.get(2)?,
        is_admin: row.get::<_, i64>(3)? != 0,
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
    })
}

/// Profile store.
#[derive(Clone)]
pub struct ProfileStore {
    db: Database,
}

impl ProfileStore {
    pub(crate) fn new(db: Database) -> Self {
        Self { db }
    }

    fn get_internal(conn: &Connection, id: &str) -> Result<Option<Profile>> {
        conn.query_row(
            &format!("SELECT {COLUMNS} FROM profiles WHERE id = ?1"),
            params![id],
            from_row,
        )
        .optional()
        .with_context(|| format!("Failed to get profile {}", id))
    }

    /// Return the user's profile, creating it on first sight.
    ///
    /// A provider-supplied email fills in a missing one but never overwrites
    /// an existing value.
    pub fn ensure(&self, id: &str, email: Option<&str>) -> Result<Profile> {
        let conn = self.db.lock()?;
        let now = format_ts(&now_utc());

        let inserted = conn.execute(
            "INSERT OR IGNORE INTO profiles (id, email, is_admin, created_at, updated_at)
             VALUES (?1, ?2, 0, ?3, ?3)",
            params![id, email, now],
        )?;
        if inserted > 0 {
            tracing::info!(user_id = %id, "Created profile");
        } else if let Some(email) = email {
            conn.execute(
                "UPDATE profiles SET email = ?1, updated_at = ?2 WHERE id = ?3 AND email IS NULL",
                params![email, now, id],
            )?;
        }

        Self::get_internal(&conn, id)?
            .ok_or_else(|| anyhow::anyhow!("Profile {} vanished after insert", id))
    }

    /// Get a profile by user ID.
    pub fn get(&self, id: &str) -> Result<Option<Profile>> {
        let conn = self.db.lock()?;
        Self::get_internal(&conn, id)
    }

    /// Apply a self-service update. Returns `None` when the profile is missing.
    pub fn update(&self, id: &str, request: &UpdateProfileRequest) -> Result<Option<Profile>> {
        if let Some(name) = &request.display_name {
            if name.trim().is_empty() || name.chars().count() > 80 {
                return Err(Error::InvalidInput("Display name must be 1-80 characters".into()).into());
            }
        }

        let conn = self.db.lock()?;
        let now = format_ts(&now_utc());

        let rows = conn.execute(
            "UPDATE profiles SET
                display_name = COALESCE(?1, display_name),
                email = COALESCE(?2, email),
                updated_at = ?3
             WHERE id = ?4",
            params![request.display_name.as_deref().map(str::trim), request.email, now, id],
        )?;

        if rows == 0 {
            return Ok(None);
        }
        Self::get_internal(&conn, id)
    }

    /// Grant or revoke the admin flag. Returns `None` when the profile is missing.
    pub fn set_admin(&self, id: &str, is_admin: bool) -> Result<Option<Profile>> {
        let conn = self.db.lock()?;
        let rows = conn.execute(
            "UPDATE profiles SET is_admin = ?1, updated_at = ?2 WHERE id = ?3",
            params![is_admin as i64, format_ts(&now_utc()), id],
        )?;

        if rows == 0 {
            return Ok(None);
        }
        Self::get_internal(&conn, id)
    }

    /// Whether the user carries the admin flag. Unknown users are not admins.
    pub fn is_admin(&self, id: &str) -> Result<bool> {
        Ok(self.get(id)?.is_some_and(|p| p.is_admin))
    }

    /// List profiles, newest first.
    pub fn list(&self, limit: Option<u32>, offset: Option<u32>) -> Result<Vec<Profile>> {
        let (limit, offset) = page(limit, offset);
        let conn = self.db.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM profiles ORDER BY created_at DESC, id LIMIT ?1 OFFSET ?2"
        ))?;

        let profiles = stmt
            .query_map(params![limit, offset], from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(profiles)
    }

    /// Count all profiles.
    pub fn count(&self) -> Result<u64> {
        let conn = self.db.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM profiles", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ProfileStore {
        Database::open_in_memory().unwrap().profiles()
    }

    #[test]
    fn test_ensure_creates_once() {
        let store = store();
        let first = store.ensure("u1", Some("u1@example.com")).unwrap();
        assert_eq!(first.email.as_deref(), Some("u1@example.com"));
        assert!(!first.is_admin);

        let second = store.ensure("u1", Some("other@example.com")).unwrap();
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.email.as_deref(), Some("u1@example.com"));
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_ensure_backfills_missing_email() {
        let store = store();
        store.ensure("u1", None).unwrap();
        let profile = store.ensure("u1", Some("late@example.com")).unwrap();
        assert_eq!(profile.email.as_deref(), Some("late@example.com"));
    }

    #[test]
    fn test_update_profile() {
        let store = store();
        store.ensure("u1", None).unwrap();

        let updated = store
            .update(
                "u1",
                &UpdateProfileRequest {
                    display_name: Some("  Ada  ".into()),
                    email: None,
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.display_name.as_deref(), Some("Ada"));
        assert!(updated.email.is_none());
    }

    #[test]
    fn test_update_missing_profile() {
        assert!(store()
            .update("ghost", &UpdateProfileRequest::default())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_update_rejects_blank_name() {
        let store = store();
        store.ensure("u1", None).unwrap();
        let result = store.update(
            "u1",
            &UpdateProfileRequest {
                display_name: Some("   ".into()),
                email: None,
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_admin_flag() {
        let store = store();
        store.ensure("boss", None).unwrap();
        assert!(!store.is_admin("boss").unwrap());
        assert!(!store.is_admin("nobody").unwrap());

        let profile = store.set_admin("boss", true).unwrap().unwrap();
        assert!(profile.is_admin);
        assert!(store.is_admin("boss").unwrap());

        assert!(store.set_admin("nobody", true).unwrap().is_none());
    }

    #[test]
    fn test_list_and_count() {
        let store = store();
        for id in ["a", "b", "c"] {
            store.ensure(id, None).unwrap();
        }
        assert_eq!(store.count().unwrap(), 3);
        assert_eq!(store.list(None, None).unwrap().len(), 3);
        assert_eq!(store.list(Some(2), None).unwrap().len(), 2);
        assert_eq!(store.list(Some(2), Some(2)).unwrap().len(), 1);
    }
}

//! SQLite preferences store — the external collaborator's local
//! implementation. The pipeline only ever sees the `PreferenceStore`
//! trait; this backing mirrors the original `user_preferences` table.

use async_trait::async_trait;
use gazette_core::error::{GazetteError, Result};
use gazette_core::traits::PreferenceStore;
use gazette_core::types::{Frequency, Subscription};
use std::path::Path;
use std::sync::Mutex;

/// File-backed preference store.
pub struct SqlitePreferenceStore {
    conn: Mutex<rusqlite::Connection>,
}

impl SqlitePreferenceStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = rusqlite::Connection::open(path)
            .map_err(|e| GazetteError::Database(format!("Prefs open: {e}")))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS user_preferences (
                user_id TEXT PRIMARY KEY,
                email TEXT NOT NULL,
                categories TEXT NOT NULL,    -- JSON array
                frequency TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1
            );",
        )
        .map_err(|e| GazetteError::Database(format!("Prefs migration: {e}")))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create or replace a subscription (subscribe-time path).
    pub fn upsert(&self, sub: &Subscription) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO user_preferences
             (user_id, email, categories, frequency, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                sub.user_id,
                sub.email,
                serde_json::to_string(&sub.categories).unwrap_or_else(|_| "[]".into()),
                sub.frequency.as_str(),
                sub.is_active as i32,
            ],
        )
        .map_err(|e| GazetteError::Database(format!("Prefs upsert: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl PreferenceStore for SqlitePreferenceStore {
    async fn get(&self, user_id: &str) -> Result<Option<Subscription>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT user_id, email, categories, frequency, is_active
             FROM user_preferences WHERE user_id = ?1",
            rusqlite::params![user_id],
            |row| {
                let categories_str: String = row.get(2)?;
                let frequency_str: String = row.get(3)?;
                Ok(Subscription {
                    user_id: row.get(0)?,
                    email: row.get(1)?,
                    categories: serde_json::from_str(&categories_str).unwrap_or_default(),
                    frequency: Frequency::parse(&frequency_str),
                    is_active: row.get::<_, i32>(4)? != 0,
                })
            },
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(GazetteError::Preferences(format!("read: {other}"))),
        })
    }

    async fn set_active(&self, user_id: &str, active: bool) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let n = conn
            .execute(
                "UPDATE user_preferences SET is_active = ?1 WHERE user_id = ?2",
                rusqlite::params![active as i32, user_id],
            )
            .map_err(|e| GazetteError::Preferences(format!("write: {e}")))?;
        if n == 0 {
            return Err(GazetteError::Preferences(format!(
                "unknown user: {user_id}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_prefs() -> (SqlitePreferenceStore, std::path::PathBuf) {
        let path = std::env::temp_dir().join(format!("gazette-prefs-{}.db", uuid::Uuid::new_v4()));
        (SqlitePreferenceStore::open(&path).unwrap(), path)
    }

    fn sub(user: &str, active: bool) -> Subscription {
        Subscription {
            user_id: user.into(),
            email: format!("{user}@x.com"),
            categories: vec!["technology".into(), "science".into()],
            frequency: Frequency::Daily,
            is_active: active,
        }
    }

    #[tokio::test]
    async fn test_upsert_get_roundtrip() {
        let (store, path) = temp_prefs();
        store.upsert(&sub("u1", true)).unwrap();
        let loaded = store.get("u1").await.unwrap().unwrap();
        assert_eq!(loaded, sub("u1", true));
        assert!(store.get("nobody").await.unwrap().is_none());
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_set_active_flips_flag() {
        let (store, path) = temp_prefs();
        store.upsert(&sub("u1", true)).unwrap();
        store.set_active("u1", false).await.unwrap();
        assert!(!store.get("u1").await.unwrap().unwrap().is_active);

        // Unknown users are a preferences error, not a silent no-op.
        assert!(store.set_active("ghost", false).await.is_err());
        std::fs::remove_file(&path).ok();
    }
}

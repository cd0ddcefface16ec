use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::schema::Database;

/// Preference key holding the detail screen's restorable state.
const SCREEN_STATE_KEY: &str = "session.detail";

/// Restorable detail-screen state: the entry being viewed and the browsing
/// sequence it was navigated from. Written on every retarget, read on
/// startup.
///
/// String fields rather than enums keep old snapshots loadable if the
/// format grows new fields (`#[serde(default)]`).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct ScreenState {
    pub entry_id: String,
    pub entry_ids: Vec<String>,
}

impl Database {
    // ========================================================================
    // Preferences
    // ========================================================================

    /// Get a preference value. Keys use a dotted convention
    /// (`session.detail`, `ui.two_column`, ...).
    pub async fn get_preference(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM preferences WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(value,)| value))
    }

    /// Set a preference value (UPSERT), refreshing the timestamp.
    pub async fn set_preference(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO preferences (key, value, updated_at)
            VALUES (?, ?, datetime('now'))
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ========================================================================
    // Screen State
    // ========================================================================

    /// Persist the detail screen's restorable state as JSON.
    pub async fn save_screen_state(&self, state: &ScreenState) -> Result<()> {
        let json = serde_json::to_string(state)?;
        self.set_preference(SCREEN_STATE_KEY, &json).await
    }

    /// Load the persisted screen state, if any.
    ///
    /// An unreadable snapshot (format drift, manual edits) is treated as
    /// absent rather than an error; startup falls back to the newest entry.
    pub async fn load_screen_state(&self) -> Result<Option<ScreenState>> {
        let Some(json) = self.get_preference(SCREEN_STATE_KEY).await? else {
            return Ok(None);
        };
        match serde_json::from_str::<ScreenState>(&json) {
            Ok(state) if !state.entry_id.is_empty() => Ok(Some(state)),
            Ok(_) => Ok(None),
            Err(e) => {
                tracing::warn!(error = %e, "discarding unreadable screen state snapshot");
                Ok(None)
            }
        }
    }
}

//! System settings stored in the `system_settings` key/value table

use async_trait::async_trait;
use chrono::Utc;

use super::{Repository, SettingsStore};
use crate::error::AppResult;

const MAINTENANCE_KEY: &str = "maintenance_mode";

#[async_trait]
impl SettingsStore for Repository {
    async fn maintenance_enabled(&self) -> AppResult<bool> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM system_settings WHERE key = $1")
                .bind(MAINTENANCE_KEY)
                .fetch_optional(&self.pool)
                .await?;

        Ok(matches!(value.as_deref(), Some("on") | Some("true") | Some("1")))
    }

    async fn set_maintenance_enabled(&self, enabled: bool, stamped_by: i32) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO system_settings (key, value, updated_at, updated_by)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (key) DO UPDATE
            SET value = EXCLUDED.value, updated_at = EXCLUDED.updated_at, updated_by = EXCLUDED.updated_by
            "#,
        )
        .bind(MAINTENANCE_KEY)
        .bind(if enabled { "on" } else { "off" })
        .bind(Utc::now())
        .bind(stamped_by)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

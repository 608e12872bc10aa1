//! Postgres-backed preference and delivery log stores
//!
//! Preferences are stored as one JSONB document per preference; the delivery
//! log is a flat append-only table with a per-user cap enforced on insert.

use super::{DeliveryLogStore, PreferenceStore};
use crate::error::{AlertError, Result};
use crate::models::{
    AlertDeliveryLog, AlertPreference, AlertType, ChannelType, DeliveryLogPage, DeliveryLogQuery,
    DeliveryMetadata, DeliveryStats, DeliveryStatus,
};
use sqlx::{PgPool, Row};
use tracing::{debug, error};
use uuid::Uuid;

/// Page size cap enforced by log queries
const MAX_PAGE_LIMIT: u32 = 100;

/// Postgres preference store. Per-user serialization of mutations relies on
/// row-level locking of the preference rows within each statement.
pub struct PgPreferenceStore {
    db: PgPool,
}

impl PgPreferenceStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl PreferenceStore for PgPreferenceStore {
    async fn get_preferences(&self, user_id: Uuid) -> Result<Vec<AlertPreference>> {
        let query = r#"
            SELECT document
            FROM alert_preferences
            WHERE user_id = $1
            ORDER BY created_at ASC
        "#;

        let rows = sqlx::query(query)
            .bind(user_id)
            .fetch_all(&self.db)
            .await
            .map_err(|e| {
                error!(user_id = %user_id, "Failed to fetch preferences: {}", e);
                AlertError::Database(e.to_string())
            })?;

        let mut preferences = Vec::with_capacity(rows.len());
        for row in rows {
            let document: serde_json::Value = row.get("document");
            preferences.push(serde_json::from_value(document)?);
        }
        Ok(preferences)
    }

    async fn save_preference(&self, user_id: Uuid, preference: &AlertPreference) -> Result<()> {
        let query = r#"
            INSERT INTO alert_preferences (id, user_id, document, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
        "#;

        sqlx::query(query)
            .bind(preference.id)
            .bind(user_id)
            .bind(serde_json::to_value(preference)?)
            .bind(preference.created_at)
            .bind(preference.updated_at)
            .execute(&self.db)
            .await
            .map_err(|e| AlertError::Database(format!("failed to save preference: {}", e)))?;

        debug!(user_id = %user_id, preference_id = %preference.id, "Saved preference");
        Ok(())
    }

    async fn update_preference(&self, user_id: Uuid, preference: &AlertPreference) -> Result<()> {
        let query = r#"
            UPDATE alert_preferences
            SET document = $1, updated_at = $2
            WHERE id = $3 AND user_id = $4
        "#;

        let result = sqlx::query(query)
            .bind(serde_json::to_value(preference)?)
            .bind(preference.updated_at)
            .bind(preference.id)
            .bind(user_id)
            .execute(&self.db)
            .await
            .map_err(|e| AlertError::Database(format!("failed to update preference: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(AlertError::NotFound(format!(
                "preference {} not found",
                preference.id
            )));
        }
        Ok(())
    }

    async fn delete_preference(&self, user_id: Uuid, preference_id: Uuid) -> Result<()> {
        let query = r#"
            DELETE FROM alert_preferences
            WHERE id = $1 AND user_id = $2
        "#;

        let result = sqlx::query(query)
            .bind(preference_id)
            .bind(user_id)
            .execute(&self.db)
            .await
            .map_err(|e| AlertError::Database(format!("failed to delete preference: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(AlertError::NotFound(format!(
                "preference {} not found",
                preference_id
            )));
        }
        Ok(())
    }
}

/// Postgres delivery log store with per-user cap
pub struct PgDeliveryLogStore {
    db: PgPool,
    max_per_user: i64,
}

impl PgDeliveryLogStore {
    pub fn new(db: PgPool, max_per_user: usize) -> Self {
        Self {
            db,
            max_per_user: max_per_user as i64,
        }
    }

    fn row_to_log(row: &sqlx::postgres::PgRow) -> Result<AlertDeliveryLog> {
        let alert_type: String = row.get("alert_type");
        let status: String = row.get("status");
        let channels: serde_json::Value = row.get("channels");
        let metadata: serde_json::Value = row.get("metadata");
        let attempts: i32 = row.get("attempts");

        Ok(AlertDeliveryLog {
            id: row.get("id"),
            user_id: row.get("user_id"),
            preference_id: row.get("preference_id"),
            alert_type: AlertType::parse(&alert_type),
            channels: serde_json::from_value::<Vec<ChannelType>>(channels)?,
            status: DeliveryStatus::parse(&status),
            attempts: attempts.max(0) as u32,
            failure_reason: row.get("failure_reason"),
            metadata: serde_json::from_value::<DeliveryMetadata>(metadata)?,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait::async_trait]
impl DeliveryLogStore for PgDeliveryLogStore {
    async fn append(&self, log: &AlertDeliveryLog) -> Result<()> {
        let query = r#"
            INSERT INTO alert_delivery_logs (
                id, user_id, preference_id, alert_type, channels, status,
                attempts, failure_reason, metadata, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#;

        sqlx::query(query)
            .bind(log.id)
            .bind(log.user_id)
            .bind(log.preference_id)
            .bind(log.alert_type.as_str())
            .bind(serde_json::to_value(&log.channels)?)
            .bind(log.status.as_str())
            .bind(log.attempts as i32)
            .bind(&log.failure_reason)
            .bind(serde_json::to_value(&log.metadata)?)
            .bind(log.created_at)
            .bind(log.updated_at)
            .execute(&self.db)
            .await
            .map_err(|e| AlertError::Database(format!("failed to append delivery log: {}", e)))?;

        // Evict oldest entries beyond the per-user cap
        let evict = r#"
            DELETE FROM alert_delivery_logs
            WHERE user_id = $1 AND id NOT IN (
                SELECT id FROM alert_delivery_logs
                WHERE user_id = $1
                ORDER BY created_at DESC
                LIMIT $2
            )
        "#;

        sqlx::query(evict)
            .bind(log.user_id)
            .bind(self.max_per_user)
            .execute(&self.db)
            .await
            .map_err(|e| AlertError::Database(format!("failed to trim delivery log: {}", e)))?;

        Ok(())
    }

    async fn query(&self, user_id: Uuid, query: &DeliveryLogQuery) -> Result<DeliveryLogPage> {
        let limit = query.limit.clamp(1, MAX_PAGE_LIMIT) as i64;
        let page = query.page.max(1);
        let offset = (page as i64 - 1) * limit;
        let alert_type = query.alert_type.map(|t| t.as_str().to_string());
        let status = query.status.map(|s| s.as_str().to_string());

        let count_sql = r#"
            SELECT COUNT(*) AS total
            FROM alert_delivery_logs
            WHERE user_id = $1
              AND ($2::text IS NULL OR alert_type = $2)
              AND ($3::text IS NULL OR status = $3)
              AND ($4::timestamptz IS NULL OR created_at >= $4)
              AND ($5::timestamptz IS NULL OR created_at <= $5)
        "#;

        let total: i64 = sqlx::query(count_sql)
            .bind(user_id)
            .bind(&alert_type)
            .bind(&status)
            .bind(query.from)
            .bind(query.to)
            .fetch_one(&self.db)
            .await
            .map_err(|e| AlertError::Database(format!("failed to count delivery logs: {}", e)))?
            .get("total");

        let select_sql = r#"
            SELECT id, user_id, preference_id, alert_type, channels, status,
                   attempts, failure_reason, metadata, created_at, updated_at
            FROM alert_delivery_logs
            WHERE user_id = $1
              AND ($2::text IS NULL OR alert_type = $2)
              AND ($3::text IS NULL OR status = $3)
              AND ($4::timestamptz IS NULL OR created_at >= $4)
              AND ($5::timestamptz IS NULL OR created_at <= $5)
            ORDER BY created_at DESC
            LIMIT $6 OFFSET $7
        "#;

        let rows = sqlx::query(select_sql)
            .bind(user_id)
            .bind(&alert_type)
            .bind(&status)
            .bind(query.from)
            .bind(query.to)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.db)
            .await
            .map_err(|e| AlertError::Database(format!("failed to query delivery logs: {}", e)))?;

        let mut logs = Vec::with_capacity(rows.len());
        for row in &rows {
            logs.push(Self::row_to_log(row)?);
        }

        let total_u64 = total.max(0) as u64;
        let page_count = total_u64.div_ceil(limit as u64) as u32;

        Ok(DeliveryLogPage {
            logs,
            total: total_u64,
            page,
            page_count,
        })
    }

    async fn stats(&self, user_id: Uuid) -> Result<DeliveryStats> {
        let query = r#"
            SELECT status, COUNT(*) AS count
            FROM alert_delivery_logs
            WHERE user_id = $1
            GROUP BY status
        "#;

        let rows = sqlx::query(query)
            .bind(user_id)
            .fetch_all(&self.db)
            .await
            .map_err(|e| AlertError::Database(format!("failed to aggregate delivery logs: {}", e)))?;

        let mut stats = DeliveryStats::default();
        for row in rows {
            let status: String = row.get("status");
            let count: i64 = row.get("count");
            stats.total += count.max(0) as u64;
            stats.by_status.insert(status, count.max(0) as u64);
        }

        let channel_query = r#"
            SELECT channel, COUNT(*) AS count
            FROM alert_delivery_logs, jsonb_array_elements_text(channels) AS channel
            WHERE user_id = $1
            GROUP BY channel
        "#;

        let rows = sqlx::query(channel_query)
            .bind(user_id)
            .fetch_all(&self.db)
            .await
            .map_err(|e| AlertError::Database(format!("failed to aggregate channels: {}", e)))?;

        for row in rows {
            let channel: String = row.get("channel");
            let count: i64 = row.get("count");
            stats.by_channel.insert(channel, count.max(0) as u64);
        }
        Ok(stats)
    }
}

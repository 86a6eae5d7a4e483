//! Target repository

use crate::db::DatabasePool;
use crate::models::{NewTarget, Target};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use phishsim_common::types::{CampaignId, TargetId};
use phishsim_common::{Error, Result};
use uuid::Uuid;

/// Target repository trait
#[async_trait]
pub trait TargetRepository: Send + Sync {
    /// Insert a target with the given token.
    ///
    /// Returns `Ok(None)` when the token is already taken; the caller is
    /// expected to retry with a freshly issued token.
    async fn insert(
        &self,
        campaign_id: CampaignId,
        input: NewTarget,
        token: &str,
    ) -> Result<Option<Target>>;

    async fn get_by_token(&self, token: &str) -> Result<Option<Target>>;

    /// All targets of a campaign in creation order
    async fn list_by_campaign(&self, campaign_id: CampaignId) -> Result<Vec<Target>>;

    /// Targets of a campaign with `sent = false`, in creation order
    async fn list_unsent(&self, campaign_id: CampaignId) -> Result<Vec<Target>>;

    /// Flip `sent` to true and set `sent_at`.
    ///
    /// Only applies while `sent = false`; returns whether this call made the
    /// transition.
    async fn mark_sent(&self, id: TargetId, sent_at: DateTime<Utc>) -> Result<bool>;
}

/// Database target repository
pub struct DbTargetRepository {
    pool: DatabasePool,
}

impl DbTargetRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TargetRepository for DbTargetRepository {
    async fn insert(
        &self,
        campaign_id: CampaignId,
        input: NewTarget,
        token: &str,
    ) -> Result<Option<Target>> {
        let id = Uuid::now_v7();

        sqlx::query_as::<_, Target>(
            r#"
            INSERT INTO targets (
                id, campaign_id, name, email, department, role, location,
                employee_id, manager, token, sent, sent_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, FALSE, NULL, $11)
            ON CONFLICT (token) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(campaign_id)
        .bind(&input.name)
        .bind(&input.email)
        .bind(&input.department)
        .bind(&input.role)
        .bind(&input.location)
        .bind(&input.employee_id)
        .bind(&input.manager)
        .bind(token)
        .bind(Utc::now())
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn get_by_token(&self, token: &str) -> Result<Option<Target>> {
        sqlx::query_as::<_, Target>("SELECT * FROM targets WHERE token = $1")
            .bind(token)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_by_campaign(&self, campaign_id: CampaignId) -> Result<Vec<Target>> {
        sqlx::query_as::<_, Target>(
            "SELECT * FROM targets WHERE campaign_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(campaign_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_unsent(&self, campaign_id: CampaignId) -> Result<Vec<Target>> {
        sqlx::query_as::<_, Target>(
            r#"
            SELECT * FROM targets
            WHERE campaign_id = $1 AND sent = FALSE
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(campaign_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn mark_sent(&self, id: TargetId, sent_at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE targets SET sent = TRUE, sent_at = $2 WHERE id = $1 AND sent = FALSE",
        )
        .bind(id)
        .bind(sent_at)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}

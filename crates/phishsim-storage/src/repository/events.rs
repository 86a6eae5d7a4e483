//! Event repository
//!
//! The event log is append-only: this repository has no update or delete
//! operations.

use crate::db::DatabasePool;
use crate::models::{Event, NewEvent};
use async_trait::async_trait;
use phishsim_common::types::CampaignId;
use phishsim_common::{Error, Result};
use uuid::Uuid;

/// Event repository trait
#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn append(&self, input: NewEvent) -> Result<Event>;

    /// Events for every target of a campaign, oldest first
    async fn list_by_campaign(&self, campaign_id: CampaignId) -> Result<Vec<Event>>;
}

/// Database event repository
pub struct DbEventRepository {
    pool: DatabasePool,
}

impl DbEventRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventRepository for DbEventRepository {
    async fn append(&self, input: NewEvent) -> Result<Event> {
        let id = Uuid::now_v7();

        sqlx::query_as::<_, Event>(
            r#"
            INSERT INTO events (id, target_id, event_type, meta, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(input.target_id)
        .bind(input.metadata.event_type().as_str())
        .bind(input.metadata.to_value())
        .bind(input.occurred_at)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_by_campaign(&self, campaign_id: CampaignId) -> Result<Vec<Event>> {
        sqlx::query_as::<_, Event>(
            r#"
            SELECT e.* FROM events e
            INNER JOIN targets t ON t.id = e.target_id
            WHERE t.campaign_id = $1
            ORDER BY e.created_at ASC, e.id ASC
            "#,
        )
        .bind(campaign_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }
}

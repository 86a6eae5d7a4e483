//! Statistics repository
//!
//! Read-only aggregate queries over targets and the event log. Counts are of
//! distinct targets, restricted to targets whose email was sent, so repeated
//! events for one target never inflate a count.

use crate::db::DatabasePool;
use crate::models::{EventCounts, GroupCounts};
use async_trait::async_trait;
use phishsim_common::types::{CampaignId, GroupDimension, StatsScope, UNKNOWN_GROUP};
use phishsim_common::{Error, Result};

/// Statistics repository trait
#[async_trait]
pub trait StatsRepository: Send + Sync {
    /// Totals for a campaign or for every campaign
    async fn counts(&self, scope: StatsScope) -> Result<EventCounts>;

    /// Totals bucketed by a recipient attribute.
    ///
    /// Targets with a blank value fall into the `Unknown` bucket. Rows are
    /// ordered by `emails_sent` descending, then by group name.
    async fn grouped_counts(
        &self,
        scope: StatsScope,
        dimension: GroupDimension,
    ) -> Result<Vec<GroupCounts>>;
}

/// Database statistics repository
pub struct DbStatsRepository {
    pool: DatabasePool,
}

impl DbStatsRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn scope_campaign(scope: StatsScope) -> Option<CampaignId> {
    match scope {
        StatsScope::Campaign(id) => Some(id),
        StatsScope::All => None,
    }
}

const COUNT_COLUMNS: &str = r#"
    COUNT(*) AS total_targets,
    COUNT(*) FILTER (WHERE t.sent) AS emails_sent,
    COUNT(*) FILTER (WHERE t.sent AND EXISTS (
        SELECT 1 FROM events e WHERE e.target_id = t.id AND e.event_type = 'open'
    )) AS opened,
    COUNT(*) FILTER (WHERE t.sent AND EXISTS (
        SELECT 1 FROM events e WHERE e.target_id = t.id AND e.event_type = 'click'
    )) AS clicked,
    COUNT(*) FILTER (WHERE t.sent AND EXISTS (
        SELECT 1 FROM events e WHERE e.target_id = t.id AND e.event_type = 'submit'
    )) AS submitted
"#;

#[async_trait]
impl StatsRepository for DbStatsRepository {
    async fn counts(&self, scope: StatsScope) -> Result<EventCounts> {
        let query = format!(
            "SELECT {} FROM targets t WHERE ($1::uuid IS NULL OR t.campaign_id = $1)",
            COUNT_COLUMNS
        );

        sqlx::query_as::<_, EventCounts>(&query)
            .bind(scope_campaign(scope))
            .fetch_one(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn grouped_counts(
        &self,
        scope: StatsScope,
        dimension: GroupDimension,
    ) -> Result<Vec<GroupCounts>> {
        // The column name comes from the closed GroupDimension set, never from caller text.
        let column = dimension.column();
        let query = format!(
            r#"
            SELECT COALESCE(NULLIF(TRIM(t.{column}), ''), '{unknown}') AS group_name, {counts}
            FROM targets t
            WHERE ($1::uuid IS NULL OR t.campaign_id = $1)
            GROUP BY 1
            ORDER BY emails_sent DESC, group_name ASC
            "#,
            column = column,
            unknown = UNKNOWN_GROUP,
            counts = COUNT_COLUMNS,
        );

        sqlx::query_as::<_, GroupCounts>(&query)
            .bind(scope_campaign(scope))
            .fetch_all(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }
}

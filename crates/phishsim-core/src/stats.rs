//! Statistics aggregator - Distinct-target conversion rates
//!
//! All figures are computed on demand from the target table and the event
//! log. `opened`, `clicked` and `submitted` count distinct sent targets with
//! at least one event of the type; rates divide by `emails_sent` and are 0
//! when nothing was sent.

use chrono::{DateTime, Utc};
use phishsim_common::types::{CampaignId, GroupDimension, StatsScope};
use phishsim_common::{Error, Result};
use phishsim_storage::models::{EventCounts, GroupCounts};
use phishsim_storage::repository::{CampaignRepository, Repositories, StatsRepository};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

/// Percentage of `count` over `sent`, rounded to two decimals
pub fn rate(count: i64, sent: i64) -> f64 {
    if sent <= 0 {
        return 0.0;
    }
    let pct = count as f64 / sent as f64 * 100.0;
    ((pct * 100.0).round() / 100.0).clamp(0.0, 100.0)
}

/// Totals and rates for a campaign or for every campaign
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CampaignStats {
    pub total_targets: i64,
    pub emails_sent: i64,
    pub opened: i64,
    pub clicked: i64,
    pub submitted: i64,
    pub open_rate: f64,
    pub click_rate: f64,
    pub submit_rate: f64,
}

impl From<EventCounts> for CampaignStats {
    fn from(c: EventCounts) -> Self {
        Self {
            total_targets: c.total_targets,
            emails_sent: c.emails_sent,
            opened: c.opened,
            clicked: c.clicked,
            submitted: c.submitted,
            open_rate: rate(c.opened, c.emails_sent),
            click_rate: rate(c.clicked, c.emails_sent),
            submit_rate: rate(c.submitted, c.emails_sent),
        }
    }
}

/// Stats for one value of a grouping dimension
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupStats {
    pub group: String,
    #[serde(flatten)]
    pub stats: CampaignStats,
}

impl From<GroupCounts> for GroupStats {
    fn from(g: GroupCounts) -> Self {
        let stats = CampaignStats::from(EventCounts {
            total_targets: g.total_targets,
            emails_sent: g.emails_sent,
            opened: g.opened,
            clicked: g.clicked,
            submitted: g.submitted,
        });
        Self {
            group: g.group_name,
            stats,
        }
    }
}

/// One row of the per-campaign dashboard list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignSummary {
    pub campaign_id: CampaignId,
    pub name: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub stats: CampaignStats,
}

/// Read-only statistics over campaigns, targets and events
pub struct StatsAggregator {
    campaigns: Arc<dyn CampaignRepository>,
    stats: Arc<dyn StatsRepository>,
}

impl StatsAggregator {
    pub fn new(repos: &Repositories) -> Self {
        Self {
            campaigns: repos.campaigns.clone(),
            stats: repos.stats.clone(),
        }
    }

    /// Stats for one campaign
    pub async fn campaign_stats(&self, campaign_id: CampaignId) -> Result<CampaignStats> {
        self.campaigns
            .get(campaign_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Campaign {} not found", campaign_id)))?;

        let counts = self.stats.counts(StatsScope::Campaign(campaign_id)).await?;
        Ok(counts.into())
    }

    /// Stats across every campaign
    pub async fn overall_stats(&self) -> Result<CampaignStats> {
        Ok(self.stats.counts(StatsScope::All).await?.into())
    }

    /// Stats bucketed by `dimension`, ordered by emails sent descending.
    ///
    /// A failing backend yields an empty list so dashboards still render.
    pub async fn grouped_stats(
        &self,
        scope: StatsScope,
        dimension: GroupDimension,
    ) -> Vec<GroupStats> {
        match self.stats.grouped_counts(scope, dimension).await {
            Ok(groups) => groups.into_iter().map(GroupStats::from).collect(),
            Err(e) => {
                error!(?scope, %dimension, error = %e, "Grouped stats query failed");
                Vec::new()
            }
        }
    }

    /// Stats for every campaign, newest campaign first
    pub async fn campaign_summaries(&self) -> Result<Vec<CampaignSummary>> {
        let campaigns = self.campaigns.list().await?;
        let mut summaries = Vec::with_capacity(campaigns.len());

        for campaign in campaigns {
            let counts = self.stats.counts(StatsScope::Campaign(campaign.id)).await?;
            summaries.push(CampaignSummary {
                campaign_id: campaign.id,
                name: campaign.name,
                created_by: campaign.created_by,
                created_at: campaign.created_at,
                stats: counts.into(),
            });
        }

        Ok(summaries)
    }
}

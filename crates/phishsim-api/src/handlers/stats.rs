//! Dashboard statistics handler

use axum::{
    extract::{Query, State},
    Json,
};
use phishsim_common::types::{GroupDimension, StatsScope};
use phishsim_core::{CampaignStats, CampaignSummary, GroupStats};
use serde::Serialize;
use std::sync::Arc;

use crate::auth::AppState;
use crate::error::{from_error, ApiError};
use crate::handlers::campaigns::{parse_dimension, StatsQuery};

/// Statistics across every campaign
#[derive(Debug, Serialize)]
pub struct OverallStatsResponse {
    pub overall_stats: CampaignStats,
    pub campaign_stats: Vec<CampaignSummary>,
    pub grouped_stats: Vec<GroupStats>,
    pub grouped_by: GroupDimension,
}

/// GET /api/stats
pub async fn get_overall_stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<OverallStatsResponse>, ApiError> {
    let dimension = parse_dimension(query.group_by.as_deref())?;

    let overall_stats = state
        .stats
        .overall_stats()
        .await
        .map_err(|e| from_error(e, "Failed to compute stats"))?;
    let campaign_stats = state
        .stats
        .campaign_summaries()
        .await
        .map_err(|e| from_error(e, "Failed to compute stats"))?;
    let grouped_stats = state.stats.grouped_stats(StatsScope::All, dimension).await;

    Ok(Json(OverallStatsResponse {
        overall_stats,
        campaign_stats,
        grouped_stats,
        grouped_by: dimension,
    }))
}

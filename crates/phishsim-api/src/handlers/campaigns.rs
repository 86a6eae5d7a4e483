//! Campaign handlers

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use phishsim_common::types::{is_minimal_email, CampaignId, GroupDimension, StatsScope};
use phishsim_core::{CampaignStats, DispatchProgress, GroupStats, RejectedRow, TargetResult};
use phishsim_storage::models::{Campaign, CreateCampaign, NewTarget, Target};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::auth::{AppState, AuthContext};
use crate::error::{from_dispatch_error, from_error, not_found, validation_error, ApiError};

/// Request body for creating a campaign
#[derive(Debug, Deserialize)]
pub struct CreateCampaignRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email_subject: String,
    #[serde(default)]
    pub email_body: String,
    #[serde(default)]
    pub from_address: String,
}

/// Campaign with per-target results
#[derive(Debug, Serialize)]
pub struct CampaignDetailResponse {
    #[serde(flatten)]
    pub campaign: Campaign,
    pub targets: Vec<TargetResult>,
}

/// Result of a bulk target upload
#[derive(Debug, Serialize)]
pub struct AddTargetsResponse {
    pub imported: usize,
    pub targets: Vec<Target>,
    pub errors: Vec<RejectedRow>,
    pub message: String,
}

/// Answer to a send request, given before any email goes out
#[derive(Debug, Serialize)]
pub struct SendCampaignResponse {
    pub message: String,
    pub campaign_id: CampaignId,
    pub targets: usize,
    pub coalesced: bool,
}

/// Query parameters for stats endpoints
#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    pub group_by: Option<String>,
}

/// Campaign stats response
#[derive(Debug, Serialize)]
pub struct CampaignStatsResponse {
    pub campaign: Campaign,
    pub overall_stats: CampaignStats,
    pub grouped_stats: Vec<GroupStats>,
    pub grouped_by: GroupDimension,
}

/// Parse the grouping dimension, defaulting to department
pub(crate) fn parse_dimension(group_by: Option<&str>) -> Result<GroupDimension, ApiError> {
    match group_by.map(str::trim).filter(|g| !g.is_empty()) {
        None => Ok(GroupDimension::default()),
        Some(raw) => raw
            .parse()
            .map_err(|_| validation_error(format!("Unsupported group_by value: {}", raw))),
    }
}

async fn load_campaign(state: &AppState, campaign_id: CampaignId) -> Result<Campaign, ApiError> {
    state
        .repos
        .campaigns
        .get(campaign_id)
        .await
        .map_err(|e| from_error(e, "Failed to get campaign"))?
        .ok_or_else(|| not_found("Campaign not found"))
}

fn validate_campaign(input: &CreateCampaignRequest) -> Result<(), ApiError> {
    let required = [
        ("name", &input.name),
        ("email_subject", &input.email_subject),
        ("email_body", &input.email_body),
        ("from_address", &input.from_address),
    ];
    if let Some((field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
        return Err(validation_error(format!("{} is required", field)));
    }

    if !is_minimal_email(&input.from_address) {
        return Err(validation_error("from_address must be an email address"));
    }

    Ok(())
}

/// List campaigns, newest first
///
/// GET /api/campaigns
pub async fn list_campaigns(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Campaign>>, ApiError> {
    let campaigns = state
        .repos
        .campaigns
        .list()
        .await
        .map_err(|e| from_error(e, "Failed to list campaigns"))?;

    Ok(Json(campaigns))
}

/// Create a new campaign
///
/// POST /api/campaigns
pub async fn create_campaign(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(input): Json<CreateCampaignRequest>,
) -> Result<(StatusCode, Json<Campaign>), ApiError> {
    validate_campaign(&input)?;

    let campaign = state
        .repos
        .campaigns
        .create(CreateCampaign {
            name: input.name.trim().to_string(),
            email_subject: input.email_subject,
            email_body: input.email_body,
            from_address: input.from_address.trim().to_string(),
            created_by: auth.operator,
        })
        .await
        .map_err(|e| from_error(e, "Failed to create campaign"))?;

    info!(campaign_id = %campaign.id, created_by = %campaign.created_by, "Created campaign");

    Ok((StatusCode::CREATED, Json(campaign)))
}

/// Get a campaign with per-target results
///
/// GET /api/campaigns/:id
pub async fn get_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<CampaignId>,
) -> Result<Json<CampaignDetailResponse>, ApiError> {
    let (campaign, targets) = state
        .exporter
        .campaign_results(campaign_id)
        .await
        .map_err(|e| from_error(e, "Failed to get campaign"))?;

    Ok(Json(CampaignDetailResponse { campaign, targets }))
}

/// Add already-parsed recipients to a campaign
///
/// POST /api/campaigns/:id/targets
pub async fn add_targets(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<CampaignId>,
    Json(rows): Json<Vec<NewTarget>>,
) -> Result<Json<AddTargetsResponse>, ApiError> {
    load_campaign(&state, campaign_id).await?;

    let report = state
        .enroller
        .enroll(campaign_id, rows)
        .await
        .map_err(|e| from_error(e, "Failed to save targets"))?;

    let imported = report.created.len();
    Ok(Json(AddTargetsResponse {
        imported,
        targets: report.created,
        errors: report.rejected,
        message: format!("Imported {} targets", imported),
    }))
}

/// Start sending to every unsent target.
///
/// Returns as soon as the pass is queued; sending happens in the background.
///
/// POST /api/campaigns/:id/send
pub async fn send_campaign(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(campaign_id): Path<CampaignId>,
) -> Result<(StatusCode, Json<SendCampaignResponse>), ApiError> {
    let ack = state
        .supervisor
        .dispatch(campaign_id)
        .await
        .map_err(from_dispatch_error)?;

    info!(
        %campaign_id,
        operator = %auth.operator,
        queued = ack.queued,
        coalesced = ack.coalesced,
        "Send requested"
    );

    let (status, message) = if ack.queued == 0 {
        (StatusCode::OK, "No unsent targets found")
    } else {
        (StatusCode::ACCEPTED, "Email sending started")
    };

    Ok((
        status,
        Json(SendCampaignResponse {
            message: message.to_string(),
            campaign_id,
            targets: ack.queued,
            coalesced: ack.coalesced,
        }),
    ))
}

/// Progress of the campaign's dispatch worker
///
/// GET /api/campaigns/:id/dispatch
pub async fn dispatch_progress(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<CampaignId>,
) -> Result<Json<DispatchProgress>, ApiError> {
    load_campaign(&state, campaign_id).await?;
    Ok(Json(state.supervisor.progress(campaign_id).await))
}

/// Download per-target results as CSV
///
/// GET /api/campaigns/:id/export
pub async fn export_results(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<CampaignId>,
) -> Result<Response, ApiError> {
    let csv = state
        .exporter
        .export_csv(campaign_id)
        .await
        .map_err(|e| from_error(e, "Failed to export results"))?;

    let disposition = format!("attachment; filename=\"campaign_{}_results.csv\"", campaign_id);
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    )
        .into_response())
}

/// Campaign statistics with grouped breakdown
///
/// GET /api/campaigns/:id/stats
pub async fn get_campaign_stats(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<CampaignId>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<CampaignStatsResponse>, ApiError> {
    let dimension = parse_dimension(query.group_by.as_deref())?;
    let campaign = load_campaign(&state, campaign_id).await?;

    let overall_stats = state
        .stats
        .campaign_stats(campaign_id)
        .await
        .map_err(|e| from_error(e, "Failed to compute stats"))?;
    let grouped_stats = state
        .stats
        .grouped_stats(StatsScope::Campaign(campaign_id), dimension)
        .await;

    Ok(Json(CampaignStatsResponse {
        campaign,
        overall_stats,
        grouped_stats,
        grouped_by: dimension,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn request(name: &str, from: &str) -> CreateCampaignRequest {
        CreateCampaignRequest {
            name: name.to_string(),
            email_subject: "Subject".to_string(),
            email_body: "<p>{{Link}}</p>".to_string(),
            from_address: from.to_string(),
        }
    }

    #[test]
    fn test_parse_dimension() {
        assert_eq!(parse_dimension(None).unwrap(), GroupDimension::Department);
        assert_eq!(parse_dimension(Some("")).unwrap(), GroupDimension::Department);
        assert_eq!(parse_dimension(Some("location")).unwrap(), GroupDimension::Location);

        let (status, Json(body)) = parse_dimension(Some("email")).unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.message, "Unsupported group_by value: email");
    }

    #[test]
    fn test_validate_campaign() {
        assert!(validate_campaign(&request("Q3 payroll", "hr@example.com")).is_ok());

        let (_, Json(body)) = validate_campaign(&request("  ", "hr@example.com")).unwrap_err();
        assert_eq!(body.message, "name is required");

        let (status, _) = validate_campaign(&request("Q3 payroll", "hr")).unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

//! Target enrollment - Creates campaign targets with fresh tracking tokens

use crate::token::TokenIssuer;
use phishsim_common::types::{is_minimal_email, token_prefix, CampaignId};
use phishsim_common::{Error, Result};
use phishsim_storage::models::{NewTarget, Target};
use phishsim_storage::repository::TargetRepository;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Attempts at finding an unused token before giving up
const MAX_TOKEN_ATTEMPTS: usize = 3;

/// A row that was not enrolled
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRow {
    /// Zero-based position in the submitted list
    pub index: usize,
    pub email: String,
    pub reason: String,
}

/// Result of a bulk enrollment
#[derive(Debug, Clone, Serialize)]
pub struct EnrollmentReport {
    pub created: Vec<Target>,
    pub rejected: Vec<RejectedRow>,
}

/// Enrolls already-parsed recipient rows into a campaign
pub struct TargetEnroller {
    targets: Arc<dyn TargetRepository>,
    issuer: TokenIssuer,
}

impl TargetEnroller {
    pub fn new(targets: Arc<dyn TargetRepository>, issuer: TokenIssuer) -> Self {
        Self { targets, issuer }
    }

    /// Create one target per valid row.
    ///
    /// Rows without a minimally valid email are reported and skipped. A token
    /// collision is retried with a freshly issued token.
    pub async fn enroll(
        &self,
        campaign_id: CampaignId,
        rows: Vec<NewTarget>,
    ) -> Result<EnrollmentReport> {
        let mut report = EnrollmentReport {
            created: Vec::with_capacity(rows.len()),
            rejected: Vec::new(),
        };

        for (index, row) in rows.into_iter().enumerate() {
            let row = row.normalized();
            if !is_minimal_email(&row.email) {
                report.rejected.push(RejectedRow {
                    index,
                    email: row.email,
                    reason: "email must contain '@' and '.'".to_string(),
                });
                continue;
            }

            let target = self.insert_with_fresh_token(campaign_id, row).await?;
            report.created.push(target);
        }

        info!(
            %campaign_id,
            created = report.created.len(),
            rejected = report.rejected.len(),
            "Targets enrolled"
        );

        Ok(report)
    }

    async fn insert_with_fresh_token(
        &self,
        campaign_id: CampaignId,
        row: NewTarget,
    ) -> Result<Target> {
        for _ in 0..MAX_TOKEN_ATTEMPTS {
            let token = self.issuer.issue()?;
            if let Some(target) = self.targets.insert(campaign_id, row.clone(), &token).await? {
                return Ok(target);
            }
            warn!(%campaign_id, token = token_prefix(&token), "Token collision, issuing another");
        }

        Err(Error::Internal(format!(
            "No unused token after {} attempts",
            MAX_TOKEN_ATTEMPTS
        )))
    }
}

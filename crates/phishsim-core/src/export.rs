//! Campaign results - Per-target interaction summary and CSV export

use chrono::{DateTime, SecondsFormat, Utc};
use phishsim_common::types::{CampaignId, EventType, TargetId};
use phishsim_common::{Error, Result};
use phishsim_storage::models::{Campaign, Event, Target};
use phishsim_storage::repository::{
    CampaignRepository, EventRepository, Repositories, TargetRepository,
};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Arc;

/// CSV header row
pub const CSV_HEADER: &str =
    "Name,Email,Department,Role,Location,Sent,Opened,Clicked,Submitted,First Opened,First Clicked";

/// One target with its derived interaction flags
#[derive(Debug, Clone, Serialize)]
pub struct TargetResult {
    #[serde(flatten)]
    pub target: Target,
    pub has_opened: bool,
    pub has_clicked: bool,
    pub has_submitted: bool,
    pub first_opened_at: Option<DateTime<Utc>>,
    pub first_clicked_at: Option<DateTime<Utc>>,
    pub first_submitted_at: Option<DateTime<Utc>>,
}

impl TargetResult {
    fn new(target: Target, firsts: Option<&HashMap<EventType, DateTime<Utc>>>) -> Self {
        let first = |kind: EventType| firsts.and_then(|f| f.get(&kind)).copied();
        let first_opened_at = first(EventType::Open);
        let first_clicked_at = first(EventType::Click);
        let first_submitted_at = first(EventType::Submit);

        Self {
            target,
            has_opened: first_opened_at.is_some(),
            has_clicked: first_clicked_at.is_some(),
            has_submitted: first_submitted_at.is_some(),
            first_opened_at,
            first_clicked_at,
            first_submitted_at,
        }
    }

    fn csv_row(&self) -> String {
        let t = &self.target;
        let fields = [
            t.name.clone().unwrap_or_default(),
            t.email.clone(),
            t.department.clone().unwrap_or_default(),
            t.role.clone().unwrap_or_default(),
            t.location.clone().unwrap_or_default(),
            t.sent.to_string(),
            self.has_opened.to_string(),
            self.has_clicked.to_string(),
            self.has_submitted.to_string(),
            timestamp(self.first_opened_at),
            timestamp(self.first_clicked_at),
        ];

        fields
            .iter()
            .map(|f| escape_field(f))
            .collect::<Vec<_>>()
            .join(",")
    }
}

fn timestamp(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}

/// Quote a field when it contains a delimiter, quote or line break
fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Earliest event time per target and event type
fn first_occurrences(events: &[Event]) -> HashMap<TargetId, HashMap<EventType, DateTime<Utc>>> {
    let mut firsts: HashMap<TargetId, HashMap<EventType, DateTime<Utc>>> = HashMap::new();

    for event in events {
        let Some(kind) = event.event_type_enum() else {
            continue;
        };
        firsts
            .entry(event.target_id)
            .or_default()
            .entry(kind)
            .and_modify(|at| {
                if event.created_at < *at {
                    *at = event.created_at;
                }
            })
            .or_insert(event.created_at);
    }

    firsts
}

/// Builds per-target results for a campaign
pub struct ResultExporter {
    campaigns: Arc<dyn CampaignRepository>,
    targets: Arc<dyn TargetRepository>,
    events: Arc<dyn EventRepository>,
}

impl ResultExporter {
    pub fn new(repos: &Repositories) -> Self {
        Self {
            campaigns: repos.campaigns.clone(),
            targets: repos.targets.clone(),
            events: repos.events.clone(),
        }
    }

    /// Campaign with one result per target
    pub async fn campaign_results(
        &self,
        campaign_id: CampaignId,
    ) -> Result<(Campaign, Vec<TargetResult>)> {
        let campaign = self
            .campaigns
            .get(campaign_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Campaign {} not found", campaign_id)))?;

        let targets = self.targets.list_by_campaign(campaign_id).await?;
        let events = self.events.list_by_campaign(campaign_id).await?;
        let firsts = first_occurrences(&events);

        let results = targets
            .into_iter()
            .map(|target| {
                let target_firsts = firsts.get(&target.id);
                TargetResult::new(target, target_firsts)
            })
            .collect();

        Ok((campaign, results))
    }

    /// CSV document with one row per target
    pub async fn export_csv(&self, campaign_id: CampaignId) -> Result<String> {
        let (_, results) = self.campaign_results(campaign_id).await?;

        let mut csv = String::new();
        csv.push_str(CSV_HEADER);
        csv.push_str("\r\n");
        for result in &results {
            // Writing to a String cannot fail.
            let _ = write!(csv, "{}\r\n", result.csv_row());
        }

        Ok(csv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::seed_campaign;
    use chrono::TimeZone;
    use phishsim_common::types::{EventMetadata, VisitMetadata};
    use phishsim_storage::models::NewEvent;
    use phishsim_storage::MemoryStore;
    use pretty_assertions::assert_eq;

    async fn event(repos: &Repositories, target: &Target, metadata: EventMetadata, at: DateTime<Utc>) {
        repos
            .events
            .append(NewEvent {
                target_id: target.id,
                metadata,
                occurred_at: at,
            })
            .await
            .unwrap();
    }

    #[test]
    fn test_escape_field() {
        assert_eq!(escape_field("plain"), "plain");
        assert_eq!(escape_field("Doe, John"), "\"Doe, John\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[tokio::test]
    async fn test_export_reports_first_open() {
        let repos = Repositories::memory(Arc::new(MemoryStore::new()));
        let (campaign, targets) = seed_campaign(&repos, &["a@example.com", "b@example.com"]).await;
        repos.targets.mark_sent(targets[0].id, Utc::now()).await.unwrap();

        let t1 = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 3, 1, 11, 0, 0).unwrap();
        // Appended out of order on purpose.
        event(&repos, &targets[0], EventMetadata::Open(VisitMetadata::default()), t2).await;
        event(&repos, &targets[0], EventMetadata::Open(VisitMetadata::default()), t1).await;
        event(&repos, &targets[0], EventMetadata::Click(VisitMetadata::default()), t2).await;

        let csv = ResultExporter::new(&repos)
            .export_csv(campaign.id)
            .await
            .unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(
            lines[1],
            ",a@example.com,,,,true,true,true,false,2024-03-01T09:30:00Z,2024-03-01T11:00:00Z"
        );
        assert_eq!(lines[2], ",b@example.com,,,,false,false,false,false,,");
    }

    #[tokio::test]
    async fn test_export_truncates_to_whole_seconds() {
        let repos = Repositories::memory(Arc::new(MemoryStore::new()));
        let (campaign, targets) = seed_campaign(&repos, &["a@example.com"]).await;

        let opened = Utc.with_ymd_and_hms(2024, 3, 1, 14, 8, 26).unwrap()
            + chrono::Duration::nanoseconds(695_305_227);
        event(&repos, &targets[0], EventMetadata::Open(VisitMetadata::default()), opened).await;

        let csv = ResultExporter::new(&repos)
            .export_csv(campaign.id)
            .await
            .unwrap();
        let row = csv.lines().nth(1).unwrap();

        assert!(row.ends_with(",2024-03-01T14:08:26Z,"), "{}", row);
        assert!(!row.contains(".695"));
    }

    #[tokio::test]
    async fn test_campaign_results_flags() {
        let repos = Repositories::memory(Arc::new(MemoryStore::new()));
        let (campaign, targets) = seed_campaign(&repos, &["a@example.com"]).await;
        event(
            &repos,
            &targets[0],
            EventMetadata::Open(VisitMetadata::default()),
            Utc::now(),
        )
        .await;

        let (loaded, results) = ResultExporter::new(&repos)
            .campaign_results(campaign.id)
            .await
            .unwrap();
        assert_eq!(loaded.id, campaign.id);
        assert!(results[0].has_opened);
        assert!(!results[0].has_clicked);
        assert!(results[0].first_submitted_at.is_none());
    }

    #[tokio::test]
    async fn test_export_unknown_campaign() {
        let repos = Repositories::memory(Arc::new(MemoryStore::new()));
        let err = ResultExporter::new(&repos)
            .export_csv(uuid::Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}

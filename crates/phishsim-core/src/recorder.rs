//! Event recorder - Appends tracking events for resolved tokens

use crate::metrics::Metrics;
use chrono::Utc;
use phishsim_common::types::{token_prefix, EventMetadata};
use phishsim_storage::models::{Event, NewEvent, Target};
use phishsim_storage::repository::{EventRepository, Repositories, TargetRepository};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Recording errors
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Token not found")]
    TokenNotFound,

    #[error(transparent)]
    Storage(#[from] phishsim_common::Error),
}

/// Event recorder.
///
/// Every call appends a new event. There is no deduplication: ten opens
/// are ten rows, and first-occurrence semantics are derived when reading.
pub struct EventRecorder {
    targets: Arc<dyn TargetRepository>,
    events: Arc<dyn EventRepository>,
    metrics: Metrics,
}

impl EventRecorder {
    pub fn new(repos: &Repositories, metrics: Metrics) -> Self {
        Self {
            targets: repos.targets.clone(),
            events: repos.events.clone(),
            metrics,
        }
    }

    /// Resolve a token to its target without recording anything
    pub async fn resolve(&self, token: &str) -> Result<Target, RecordError> {
        self.targets
            .get_by_token(token)
            .await?
            .ok_or(RecordError::TokenNotFound)
    }

    /// Record an event for the target owning `token`
    pub async fn record(&self, token: &str, metadata: EventMetadata) -> Result<Event, RecordError> {
        let event_type = metadata.event_type();

        let target = match self.resolve(token).await {
            Ok(target) => target,
            Err(RecordError::TokenNotFound) => {
                debug!(token = token_prefix(token), %event_type, "Unresolved tracking token");
                return Err(RecordError::TokenNotFound);
            }
            Err(e) => return Err(e),
        };

        if let EventMetadata::Submit(submit) = &metadata {
            debug!(
                target_id = %target.id,
                username = %submit.username,
                password_length = submit.password_length,
                "Decoy form submitted"
            );
        }

        let event = self
            .events
            .append(NewEvent {
                target_id: target.id,
                metadata,
                occurred_at: Utc::now(),
            })
            .await?;

        self.metrics
            .tracking_events
            .with_label_values(&[event_type.as_str()])
            .inc();

        info!(
            campaign_id = %target.campaign_id,
            target_id = %target.id,
            %event_type,
            "Tracking event recorded"
        );

        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::seed_campaign;
    use phishsim_common::types::{EventType, SubmitMetadata, VisitMetadata};
    use phishsim_storage::MemoryStore;
    use pretty_assertions::assert_eq;

    fn visit() -> VisitMetadata {
        VisitMetadata {
            ip: Some("203.0.113.7".to_string()),
            user_agent: Some("Mozilla/5.0".to_string()),
            referer: None,
        }
    }

    #[tokio::test]
    async fn test_record_appends_every_event() {
        let repos = Repositories::memory(Arc::new(MemoryStore::new()));
        let (campaign, targets) = seed_campaign(&repos, &["a@example.com"]).await;
        let recorder = EventRecorder::new(&repos, Metrics::new().unwrap());

        for _ in 0..3 {
            recorder
                .record(&targets[0].token, EventMetadata::Open(visit()))
                .await
                .unwrap();
        }

        let events = repos.events.list_by_campaign(campaign.id).await.unwrap();
        assert_eq!(events.len(), 3);
        assert!(events
            .iter()
            .all(|e| e.event_type_enum() == Some(EventType::Open)));
        assert_eq!(events[0].meta["ip"], "203.0.113.7");
        assert_eq!(
            recorder.metrics.tracking_events.with_label_values(&["open"]).get(),
            3
        );
    }

    #[tokio::test]
    async fn test_unknown_token_has_no_side_effects() {
        let repos = Repositories::memory(Arc::new(MemoryStore::new()));
        let (campaign, _) = seed_campaign(&repos, &["a@example.com"]).await;
        let recorder = EventRecorder::new(&repos, Metrics::new().unwrap());

        let err = recorder
            .record("deadbeef", EventMetadata::Click(visit()))
            .await
            .unwrap_err();
        assert!(matches!(err, RecordError::TokenNotFound));
        assert!(repos.events.list_by_campaign(campaign.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_submit_keeps_password_length_only() {
        let repos = Repositories::memory(Arc::new(MemoryStore::new()));
        let (campaign, targets) = seed_campaign(&repos, &["a@example.com"]).await;
        let recorder = EventRecorder::new(&repos, Metrics::new().unwrap());

        recorder
            .record(
                &targets[0].token,
                EventMetadata::Submit(SubmitMetadata::new(visit(), "alice", "hunter2")),
            )
            .await
            .unwrap();

        let events = repos.events.list_by_campaign(campaign.id).await.unwrap();
        assert_eq!(events[0].event_type, "submit");
        assert_eq!(events[0].meta["password_length"], 7);
        assert_eq!(events[0].meta["username"], "alice");
        assert!(events[0].meta.get("password").is_none());
    }
}

//! Campaign dispatch - Renders and sends campaign emails to unsent targets

mod rate_limiter;
mod supervisor;
mod transport;

pub use rate_limiter::SendThrottle;
pub use supervisor::DispatchSupervisor;
pub use transport::{MailTransport, OutgoingEmail, SmtpTransport, TransportError};

use crate::metrics::Metrics;
use crate::template::TemplateRenderer;
use chrono::{DateTime, Utc};
use phishsim_common::types::{token_prefix, CampaignId};
use phishsim_storage::repository::{CampaignRepository, Repositories, TargetRepository};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Dispatch errors
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Campaign not found: {0}")]
    CampaignNotFound(CampaignId),

    #[error(transparent)]
    Storage(#[from] phishsim_common::Error),

    #[error("Dispatch supervisor is not accepting work")]
    SupervisorClosed,
}

/// Immediate answer to a dispatch request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchAck {
    pub campaign_id: CampaignId,
    /// Unsent targets at the time of the request
    pub queued: usize,
    /// The request joined a pass that was already pending
    pub coalesced: bool,
}

/// Outcome of one pass over a campaign's unsent targets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub attempted: u64,
    pub sent: u64,
    pub failed: u64,
}

/// Snapshot of a campaign's dispatch worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchProgress {
    pub campaign_id: CampaignId,
    pub active: bool,
    pub attempted: u64,
    pub sent: u64,
    pub failed: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl DispatchProgress {
    /// Progress for a campaign that has never been dispatched by this process
    pub fn idle(campaign_id: CampaignId) -> Self {
        Self {
            campaign_id,
            active: false,
            attempted: 0,
            sent: 0,
            failed: 0,
            started_at: None,
            finished_at: None,
        }
    }
}

/// Live counters shared between a worker and progress readers
#[derive(Debug)]
pub struct WorkerProgress {
    attempted: AtomicU64,
    sent: AtomicU64,
    failed: AtomicU64,
    started_at: DateTime<Utc>,
    finished_at: Mutex<Option<DateTime<Utc>>>,
}

impl Default for WorkerProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerProgress {
    pub fn new() -> Self {
        Self {
            attempted: AtomicU64::new(0),
            sent: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            started_at: Utc::now(),
            finished_at: Mutex::new(None),
        }
    }

    pub fn finish(&self) {
        if let Ok(mut finished_at) = self.finished_at.lock() {
            *finished_at = Some(Utc::now());
        }
    }

    pub fn snapshot(&self, campaign_id: CampaignId) -> DispatchProgress {
        let finished_at = self.finished_at.lock().ok().and_then(|f| *f);
        DispatchProgress {
            campaign_id,
            active: finished_at.is_none(),
            attempted: self.attempted.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            started_at: Some(self.started_at),
            finished_at,
        }
    }
}

/// Campaign dispatcher - Sends one campaign's unsent targets sequentially
pub struct CampaignDispatcher {
    campaigns: Arc<dyn CampaignRepository>,
    targets: Arc<dyn TargetRepository>,
    renderer: TemplateRenderer,
    transport: Arc<dyn MailTransport>,
    metrics: Metrics,
}

impl CampaignDispatcher {
    /// Create a new campaign dispatcher
    pub fn new(
        repos: &Repositories,
        renderer: TemplateRenderer,
        transport: Arc<dyn MailTransport>,
        metrics: Metrics,
    ) -> Self {
        Self {
            campaigns: repos.campaigns.clone(),
            targets: repos.targets.clone(),
            renderer,
            transport,
            metrics,
        }
    }

    pub(crate) fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Number of unsent targets of an existing campaign
    pub async fn pending(&self, campaign_id: CampaignId) -> Result<usize, DispatchError> {
        self.campaigns
            .get(campaign_id)
            .await?
            .ok_or(DispatchError::CampaignNotFound(campaign_id))?;

        Ok(self.targets.list_unsent(campaign_id).await?.len())
    }

    /// Send to every target that is unsent when the pass starts.
    ///
    /// A transport failure leaves the target unsent and moves on. Sends are
    /// spaced by `throttle` regardless of outcome.
    pub async fn run_pass(
        &self,
        campaign_id: CampaignId,
        throttle: &mut SendThrottle,
        progress: &WorkerProgress,
    ) -> Result<PassSummary, DispatchError> {
        let campaign = self
            .campaigns
            .get(campaign_id)
            .await?
            .ok_or(DispatchError::CampaignNotFound(campaign_id))?;

        let targets = self.targets.list_unsent(campaign_id).await?;
        let mut summary = PassSummary::default();

        if targets.is_empty() {
            debug!(%campaign_id, "No unsent targets");
            return Ok(summary);
        }

        info!(%campaign_id, targets = targets.len(), "Starting dispatch pass");

        for target in targets {
            throttle.ready().await;

            let rendered = self.renderer.render_email(&campaign, &target);
            let email = OutgoingEmail {
                from: campaign.from_address.clone(),
                to: target.email.clone(),
                subject: rendered.subject,
                html_body: rendered.html_body,
            };

            summary.attempted += 1;
            progress.attempted.fetch_add(1, Ordering::Relaxed);

            if let Err(e) = self.transport.send(&email).await {
                warn!(
                    %campaign_id,
                    target_id = %target.id,
                    token = token_prefix(&target.token),
                    error = %e,
                    "Failed to send campaign email"
                );
                summary.failed += 1;
                progress.failed.fetch_add(1, Ordering::Relaxed);
                self.metrics.emails_failed.inc();
                continue;
            }

            self.metrics.emails_sent.inc();

            match self.targets.mark_sent(target.id, Utc::now()).await {
                Ok(true) => {
                    debug!(%campaign_id, target_id = %target.id, "Target marked sent");
                    summary.sent += 1;
                    progress.sent.fetch_add(1, Ordering::Relaxed);
                }
                Ok(false) => {
                    warn!(
                        %campaign_id,
                        target_id = %target.id,
                        "Target was already marked sent by another dispatcher"
                    );
                }
                Err(e) => {
                    error!(
                        %campaign_id,
                        target_id = %target.id,
                        error = %e,
                        "Email sent but target state was not updated"
                    );
                }
            }
        }

        info!(
            %campaign_id,
            attempted = summary.attempted,
            sent = summary.sent,
            failed = summary.failed,
            "Dispatch pass completed"
        );

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{seed_campaign, RecordingTransport};
    use phishsim_storage::MemoryStore;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn dispatcher(repos: &Repositories, transport: Arc<RecordingTransport>) -> CampaignDispatcher {
        CampaignDispatcher::new(
            repos,
            TemplateRenderer::new("https://track.example.com"),
            transport,
            Metrics::new().unwrap(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_pass_sends_only_unsent_targets() {
        let repos = Repositories::memory(Arc::new(MemoryStore::new()));
        let (campaign, targets) =
            seed_campaign(&repos, &["a@example.com", "b@example.com", "c@example.com"]).await;
        repos.targets.mark_sent(targets[0].id, Utc::now()).await.unwrap();

        let transport = Arc::new(RecordingTransport::new());
        let dispatcher = dispatcher(&repos, transport.clone());
        assert_eq!(dispatcher.pending(campaign.id).await.unwrap(), 2);

        let triggered_at = Utc::now();
        let progress = WorkerProgress::new();
        let mut throttle = SendThrottle::new(Duration::from_millis(500));
        let summary = dispatcher
            .run_pass(campaign.id, &mut throttle, &progress)
            .await
            .unwrap();

        assert_eq!(
            summary,
            PassSummary {
                attempted: 2,
                sent: 2,
                failed: 0
            }
        );
        assert_eq!(transport.recipients(), vec!["b@example.com", "c@example.com"]);

        for target in repos.targets.list_by_campaign(campaign.id).await.unwrap() {
            assert!(target.sent);
            assert!(target.sent_at.is_some());
        }
        let resent = repos.targets.get_by_token(&targets[1].token).await.unwrap().unwrap();
        assert!(resent.sent_at.unwrap() >= triggered_at);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_does_not_abort_pass() {
        let repos = Repositories::memory(Arc::new(MemoryStore::new()));
        let (campaign, targets) =
            seed_campaign(&repos, &["a@example.com", "b@example.com", "c@example.com"]).await;

        let transport = Arc::new(RecordingTransport::failing(&["b@example.com"]));
        let dispatcher = dispatcher(&repos, transport.clone());
        let progress = WorkerProgress::new();
        let mut throttle = SendThrottle::new(Duration::from_millis(500));

        let summary = dispatcher
            .run_pass(campaign.id, &mut throttle, &progress)
            .await
            .unwrap();
        assert_eq!(summary.sent, 2);
        assert_eq!(summary.failed, 1);

        let unsent = repos.targets.list_unsent(campaign.id).await.unwrap();
        assert_eq!(unsent.len(), 1);
        assert_eq!(unsent[0].id, targets[1].id);
        assert_eq!(dispatcher.metrics().emails_failed.get(), 1);
        assert_eq!(dispatcher.metrics().emails_sent.get(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sends_are_spaced() {
        let repos = Repositories::memory(Arc::new(MemoryStore::new()));
        let (campaign, _) = seed_campaign(
            &repos,
            &["a@example.com", "b@example.com", "c@example.com", "d@example.com"],
        )
        .await;

        let transport = Arc::new(RecordingTransport::failing(&["b@example.com"]));
        let dispatcher = dispatcher(&repos, transport.clone());
        let progress = WorkerProgress::new();
        let mut throttle = SendThrottle::new(Duration::from_millis(500));
        dispatcher
            .run_pass(campaign.id, &mut throttle, &progress)
            .await
            .unwrap();

        let times = transport.send_times();
        assert_eq!(times.len(), 4);
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(500));
        }
    }

    #[tokio::test]
    async fn test_rendered_email_contents() {
        let repos = Repositories::memory(Arc::new(MemoryStore::new()));
        let (campaign, targets) = seed_campaign(&repos, &["a@example.com"]).await;

        let transport = Arc::new(RecordingTransport::new());
        let dispatcher = dispatcher(&repos, transport.clone());
        let progress = WorkerProgress::new();
        let mut throttle = SendThrottle::new(Duration::from_millis(1));
        dispatcher
            .run_pass(campaign.id, &mut throttle, &progress)
            .await
            .unwrap();

        let sent = transport.emails();
        assert_eq!(sent[0].from, campaign.from_address);
        assert_eq!(sent[0].subject, "Action needed, a@example.com");
        assert!(sent[0]
            .html_body
            .contains(&format!("https://track.example.com/t/{}", targets[0].token)));
        assert!(sent[0]
            .html_body
            .ends_with(&format!(
                r#"<img src="https://track.example.com/open/{}" width="1" height="1" alt="" style="display:none" />"#,
                targets[0].token
            )));
    }

    #[tokio::test]
    async fn test_unknown_campaign() {
        let repos = Repositories::memory(Arc::new(MemoryStore::new()));
        let dispatcher = dispatcher(&repos, Arc::new(RecordingTransport::new()));

        let err = dispatcher.pending(uuid::Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, DispatchError::CampaignNotFound(_)));
    }
}

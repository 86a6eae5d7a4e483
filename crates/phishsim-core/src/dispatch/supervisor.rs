//! Dispatch supervisor - One worker task per campaign, fed by a bounded queue

use super::{
    CampaignDispatcher, DispatchAck, DispatchError, DispatchProgress, SendThrottle,
    WorkerProgress,
};
use chrono::{DateTime, Utc};
use phishsim_common::types::CampaignId;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, error, info};

/// A request for one more pass over a campaign's unsent targets
#[derive(Debug, Clone, Copy)]
struct DispatchJob {
    requested_at: DateTime<Utc>,
}

struct Worker {
    jobs: mpsc::Sender<DispatchJob>,
    progress: Arc<WorkerProgress>,
}

/// Finished-dispatch snapshots kept for progress queries
const FINISHED_HISTORY: usize = 256;

#[derive(Default)]
struct SupervisorState {
    workers: HashMap<CampaignId, Worker>,
    finished: HashMap<CampaignId, DispatchProgress>,
    finished_order: VecDeque<CampaignId>,
}

impl SupervisorState {
    fn remember_finished(&mut self, campaign_id: CampaignId, progress: DispatchProgress) {
        if self.finished.insert(campaign_id, progress).is_none() {
            self.finished_order.push_back(campaign_id);
        }
        while self.finished.len() > FINISHED_HISTORY {
            let Some(oldest) = self.finished_order.pop_front() else {
                break;
            };
            self.finished.remove(&oldest);
        }
    }

    fn forget_finished(&mut self, campaign_id: CampaignId) {
        if self.finished.remove(&campaign_id).is_some() {
            self.finished_order.retain(|id| *id != campaign_id);
        }
    }
}

struct SupervisorInner {
    dispatcher: CampaignDispatcher,
    send_interval: Duration,
    queue_depth: usize,
    state: Mutex<SupervisorState>,
    idle: Notify,
}

/// Supervises campaign dispatch.
///
/// Each campaign has at most one worker. Requests for a campaign whose
/// worker already has a pass pending coalesce into that pass, and every pass
/// re-reads the unsent targets when it starts, so concurrent requests never
/// send the same target twice within this process.
#[derive(Clone)]
pub struct DispatchSupervisor {
    inner: Arc<SupervisorInner>,
}

impl DispatchSupervisor {
    /// Create a supervisor
    pub fn new(dispatcher: CampaignDispatcher, send_interval: Duration, queue_depth: usize) -> Self {
        Self {
            inner: Arc::new(SupervisorInner {
                dispatcher,
                send_interval,
                queue_depth: queue_depth.max(1),
                state: Mutex::new(SupervisorState::default()),
                idle: Notify::new(),
            }),
        }
    }

    /// Queue a dispatch pass for a campaign and return immediately
    pub async fn dispatch(&self, campaign_id: CampaignId) -> Result<DispatchAck, DispatchError> {
        let queued = self.inner.dispatcher.pending(campaign_id).await?;
        let mut ack = DispatchAck {
            campaign_id,
            queued,
            coalesced: false,
        };

        if queued == 0 {
            info!(%campaign_id, "Dispatch requested with no unsent targets");
            return Ok(ack);
        }

        let job = DispatchJob {
            requested_at: Utc::now(),
        };

        let mut state = self.inner.state.lock().await;

        if let Some(worker) = state.workers.get(&campaign_id) {
            match worker.jobs.try_send(job) {
                Ok(()) => {
                    info!(%campaign_id, queued, "Dispatch pass queued");
                    return Ok(ack);
                }
                Err(TrySendError::Full(_)) => {
                    debug!(%campaign_id, "Dispatch pass already pending, coalescing");
                    ack.coalesced = true;
                    return Ok(ack);
                }
                Err(TrySendError::Closed(_)) => {
                    state.workers.remove(&campaign_id);
                }
            }
        }

        let (tx, rx) = mpsc::channel(self.inner.queue_depth);
        tx.try_send(job).map_err(|_| DispatchError::SupervisorClosed)?;

        let progress = Arc::new(WorkerProgress::new());
        state.workers.insert(
            campaign_id,
            Worker {
                jobs: tx,
                progress: progress.clone(),
            },
        );
        state.forget_finished(campaign_id);
        drop(state);

        self.inner.dispatcher.metrics().active_dispatches.inc();
        info!(%campaign_id, queued, "Dispatch worker started");

        let inner = self.inner.clone();
        tokio::spawn(async move {
            inner.run_worker(campaign_id, rx, progress).await;
        });

        Ok(ack)
    }

    /// Current or last known progress of a campaign's dispatch
    pub async fn progress(&self, campaign_id: CampaignId) -> DispatchProgress {
        let state = self.inner.state.lock().await;
        if let Some(worker) = state.workers.get(&campaign_id) {
            return worker.progress.snapshot(campaign_id);
        }
        state
            .finished
            .get(&campaign_id)
            .cloned()
            .unwrap_or_else(|| DispatchProgress::idle(campaign_id))
    }

    /// Number of running workers
    pub async fn active_workers(&self) -> usize {
        self.inner.state.lock().await.workers.len()
    }

    /// Wait until no worker is running
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.inner.state.lock().await.workers.is_empty() {
                return;
            }
            notified.await;
        }
    }
}

impl SupervisorInner {
    async fn run_worker(
        self: Arc<Self>,
        campaign_id: CampaignId,
        mut jobs: mpsc::Receiver<DispatchJob>,
        progress: Arc<WorkerProgress>,
    ) {
        let mut throttle = SendThrottle::new(self.send_interval);

        loop {
            let job = match jobs.try_recv() {
                Ok(job) => job,
                Err(_) => {
                    // Enqueuers hold the state lock, so an empty queue seen
                    // under the lock stays empty until this worker is gone.
                    let mut state = self.state.lock().await;
                    match jobs.try_recv() {
                        Ok(job) => job,
                        Err(_) => {
                            progress.finish();
                            state.workers.remove(&campaign_id);
                            state.remember_finished(
                                campaign_id,
                                progress.snapshot(campaign_id),
                            );
                            break;
                        }
                    }
                }
            };

            debug!(
                %campaign_id,
                waited_ms = (Utc::now() - job.requested_at).num_milliseconds(),
                "Starting queued dispatch pass"
            );

            if let Err(e) = self
                .dispatcher
                .run_pass(campaign_id, &mut throttle, &progress)
                .await
            {
                error!(%campaign_id, error = %e, "Dispatch pass failed");
            }
        }

        self.dispatcher.metrics().active_dispatches.dec();
        self.idle.notify_waiters();
        info!(%campaign_id, "Dispatch worker finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metrics;
    use crate::template::TemplateRenderer;
    use crate::testing::{seed_campaign, RecordingTransport};
    use phishsim_storage::repository::Repositories;
    use phishsim_storage::MemoryStore;
    use pretty_assertions::assert_eq;

    fn supervisor(repos: &Repositories, transport: Arc<RecordingTransport>) -> DispatchSupervisor {
        let dispatcher = CampaignDispatcher::new(
            repos,
            TemplateRenderer::new("https://track.example.com"),
            transport,
            Metrics::new().unwrap(),
        );
        DispatchSupervisor::new(dispatcher, Duration::from_millis(500), 1)
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_acknowledges_before_sending() {
        let repos = Repositories::memory(Arc::new(MemoryStore::new()));
        let (campaign, _) = seed_campaign(&repos, &["a@example.com", "b@example.com"]).await;
        let transport = Arc::new(RecordingTransport::new());
        let supervisor = supervisor(&repos, transport.clone());

        let ack = supervisor.dispatch(campaign.id).await.unwrap();
        assert_eq!(ack.queued, 2);
        assert!(!ack.coalesced);
        assert_eq!(supervisor.active_workers().await, 1);

        supervisor.wait_idle().await;
        assert_eq!(transport.recipients().len(), 2);
        assert!(repos.targets.list_unsent(campaign.id).await.unwrap().is_empty());
        assert_eq!(supervisor.active_workers().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_to_send() {
        let repos = Repositories::memory(Arc::new(MemoryStore::new()));
        let (campaign, _) = seed_campaign(&repos, &[]).await;
        let supervisor = supervisor(&repos, Arc::new(RecordingTransport::new()));

        let ack = supervisor.dispatch(campaign.id).await.unwrap();
        assert_eq!(ack.queued, 0);
        assert_eq!(supervisor.active_workers().await, 0);
        assert_eq!(supervisor.progress(campaign.id).await, DispatchProgress::idle(campaign.id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_dispatch_sends_each_target_once() {
        let repos = Repositories::memory(Arc::new(MemoryStore::new()));
        let (campaign, _) = seed_campaign(
            &repos,
            &["a@example.com", "b@example.com", "c@example.com"],
        )
        .await;
        let transport = Arc::new(RecordingTransport::new());
        let supervisor = supervisor(&repos, transport.clone());

        supervisor.dispatch(campaign.id).await.unwrap();
        let second = supervisor.dispatch(campaign.id).await.unwrap();
        let third = supervisor.dispatch(campaign.id).await.unwrap();
        assert_eq!(second.queued, 3);
        assert!(third.coalesced);

        supervisor.wait_idle().await;

        let mut recipients = transport.recipients();
        recipients.sort();
        assert_eq!(
            recipients,
            vec!["a@example.com", "b@example.com", "c@example.com"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_after_completion() {
        let repos = Repositories::memory(Arc::new(MemoryStore::new()));
        let (campaign, _) = seed_campaign(&repos, &["a@example.com", "b@example.com"]).await;
        let transport = Arc::new(RecordingTransport::failing(&["a@example.com"]));
        let supervisor = supervisor(&repos, transport);

        supervisor.dispatch(campaign.id).await.unwrap();
        supervisor.wait_idle().await;

        let progress = supervisor.progress(campaign.id).await;
        assert!(!progress.active);
        assert_eq!(progress.attempted, 2);
        assert_eq!(progress.sent, 1);
        assert_eq!(progress.failed, 1);
        assert!(progress.finished_at.is_some());

        // The failed target stays eligible for the next request.
        let ack = supervisor.dispatch(campaign.id).await.unwrap();
        assert_eq!(ack.queued, 1);
        supervisor.wait_idle().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_history_is_bounded() {
        let repos = Repositories::memory(Arc::new(MemoryStore::new()));
        let supervisor = supervisor(&repos, Arc::new(RecordingTransport::new()));

        let mut campaigns = Vec::new();
        for _ in 0..=FINISHED_HISTORY {
            let (campaign, _) = seed_campaign(&repos, &["a@example.com"]).await;
            supervisor.dispatch(campaign.id).await.unwrap();
            supervisor.wait_idle().await;
            campaigns.push(campaign.id);
        }

        {
            let state = supervisor.inner.state.lock().await;
            assert_eq!(state.finished.len(), FINISHED_HISTORY);
            assert_eq!(state.finished_order.len(), FINISHED_HISTORY);
        }

        let evicted = supervisor.progress(campaigns[0]).await;
        assert_eq!(evicted, DispatchProgress::idle(campaigns[0]));

        let latest = supervisor.progress(campaigns[FINISHED_HISTORY]).await;
        assert_eq!(latest.sent, 1);
        assert!(latest.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_unknown_campaign_is_rejected() {
        let repos = Repositories::memory(Arc::new(MemoryStore::new()));
        let supervisor = supervisor(&repos, Arc::new(RecordingTransport::new()));

        let err = supervisor.dispatch(uuid::Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, DispatchError::CampaignNotFound(_)));
    }
}

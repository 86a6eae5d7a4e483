//! Test doubles shared by the unit tests of this crate

use crate::dispatch::{MailTransport, OutgoingEmail, TransportError};
use crate::token::TokenIssuer;
use async_trait::async_trait;
use phishsim_storage::models::{Campaign, CreateCampaign, NewTarget, Target};
use phishsim_storage::repository::Repositories;
use std::collections::HashSet;
use std::sync::Mutex;
use tokio::time::Instant;

/// Transport that records every send and fails for chosen recipients
#[derive(Default)]
pub struct RecordingTransport {
    fail_for: HashSet<String>,
    sent: Mutex<Vec<(OutgoingEmail, Instant)>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(recipients: &[&str]) -> Self {
        Self {
            fail_for: recipients.iter().map(|r| r.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Every attempted email, successful or not
    pub fn emails(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap().iter().map(|(e, _)| e.clone()).collect()
    }

    /// Recipients that were accepted
    pub fn recipients(&self) -> Vec<String> {
        self.emails()
            .into_iter()
            .map(|e| e.to)
            .filter(|to| !self.fail_for.contains(to))
            .collect()
    }

    pub fn send_times(&self) -> Vec<Instant> {
        self.sent.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push((email.clone(), Instant::now()));
        if self.fail_for.contains(&email.to) {
            return Err(TransportError::Send("550 mailbox unavailable".to_string()));
        }
        Ok(())
    }
}

/// Create a campaign with one target per address
pub async fn seed_campaign(repos: &Repositories, emails: &[&str]) -> (Campaign, Vec<Target>) {
    let campaign = repos
        .campaigns
        .create(CreateCampaign {
            name: "Payroll update".to_string(),
            email_subject: "Action needed, {{Email}}".to_string(),
            email_body: r#"<p>Hello {{Name}}</p><a href="{{Link}}">Review</a>"#.to_string(),
            from_address: "hr@example.com".to_string(),
            created_by: "soc".to_string(),
        })
        .await
        .unwrap();

    let mut targets = Vec::new();
    for email in emails {
        let target = repos
            .targets
            .insert(
                campaign.id,
                NewTarget {
                    email: email.to_string(),
                    ..Default::default()
                },
                &TokenIssuer::new().issue().unwrap(),
            )
            .await
            .unwrap()
            .unwrap();
        targets.push(target);
    }

    (campaign, targets)
}

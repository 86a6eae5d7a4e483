//! In-process store
//!
//! Implements every repository trait over vectors guarded by a single
//! `RwLock`. Semantics match the PostgreSQL repositories: unique tokens,
//! conditional `mark_sent`, append-only events, distinct-target statistics.

use crate::models::{
    Campaign, CreateCampaign, Event, EventCounts, GroupCounts, NewEvent, NewTarget, Target,
};
use crate::repository::{CampaignRepository, EventRepository, StatsRepository, TargetRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use phishsim_common::types::{
    CampaignId, EventType, GroupDimension, StatsScope, TargetId, UNKNOWN_GROUP,
};
use phishsim_common::Result;
use std::collections::{BTreeMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    campaigns: Vec<Campaign>,
    targets: Vec<Target>,
    events: Vec<Event>,
}

impl MemoryState {
    fn in_scope(&self, scope: StatsScope) -> impl Iterator<Item = &Target> {
        self.targets.iter().filter(move |t| match scope {
            StatsScope::Campaign(id) => t.campaign_id == id,
            StatsScope::All => true,
        })
    }

    fn interactions(&self) -> HashSet<(TargetId, EventType)> {
        self.events
            .iter()
            .filter_map(|e| e.event_type_enum().map(|kind| (e.target_id, kind)))
            .collect()
    }
}

/// In-process implementation of every repository trait
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn attribute(target: &Target, dimension: GroupDimension) -> Option<&str> {
    let value = match dimension {
        GroupDimension::Department => target.department.as_deref(),
        GroupDimension::Role => target.role.as_deref(),
        GroupDimension::Location => target.location.as_deref(),
        GroupDimension::Manager => target.manager.as_deref(),
    };
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn tally(
    counts: &mut EventCounts,
    target: &Target,
    interactions: &HashSet<(TargetId, EventType)>,
) {
    counts.total_targets += 1;
    if !target.sent {
        return;
    }
    counts.emails_sent += 1;
    if interactions.contains(&(target.id, EventType::Open)) {
        counts.opened += 1;
    }
    if interactions.contains(&(target.id, EventType::Click)) {
        counts.clicked += 1;
    }
    if interactions.contains(&(target.id, EventType::Submit)) {
        counts.submitted += 1;
    }
}

#[async_trait]
impl CampaignRepository for MemoryStore {
    async fn create(&self, input: CreateCampaign) -> Result<Campaign> {
        let campaign = Campaign {
            id: Uuid::now_v7(),
            name: input.name,
            email_subject: input.email_subject,
            email_body: input.email_body,
            from_address: input.from_address,
            created_by: input.created_by,
            created_at: Utc::now(),
        };

        self.state.write().await.campaigns.push(campaign.clone());
        Ok(campaign)
    }

    async fn get(&self, id: CampaignId) -> Result<Option<Campaign>> {
        let state = self.state.read().await;
        Ok(state.campaigns.iter().find(|c| c.id == id).cloned())
    }

    async fn list(&self) -> Result<Vec<Campaign>> {
        let state = self.state.read().await;
        let mut campaigns = state.campaigns.clone();
        campaigns.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(campaigns)
    }
}

#[async_trait]
impl TargetRepository for MemoryStore {
    async fn insert(
        &self,
        campaign_id: CampaignId,
        input: NewTarget,
        token: &str,
    ) -> Result<Option<Target>> {
        let mut state = self.state.write().await;
        if state.targets.iter().any(|t| t.token == token) {
            return Ok(None);
        }

        let target = Target {
            id: Uuid::now_v7(),
            campaign_id,
            name: input.name,
            email: input.email,
            department: input.department,
            role: input.role,
            location: input.location,
            employee_id: input.employee_id,
            manager: input.manager,
            token: token.to_string(),
            sent: false,
            sent_at: None,
            created_at: Utc::now(),
        };
        state.targets.push(target.clone());
        Ok(Some(target))
    }

    async fn get_by_token(&self, token: &str) -> Result<Option<Target>> {
        let state = self.state.read().await;
        Ok(state.targets.iter().find(|t| t.token == token).cloned())
    }

    async fn list_by_campaign(&self, campaign_id: CampaignId) -> Result<Vec<Target>> {
        let state = self.state.read().await;
        Ok(state
            .targets
            .iter()
            .filter(|t| t.campaign_id == campaign_id)
            .cloned()
            .collect())
    }

    async fn list_unsent(&self, campaign_id: CampaignId) -> Result<Vec<Target>> {
        let state = self.state.read().await;
        Ok(state
            .targets
            .iter()
            .filter(|t| t.campaign_id == campaign_id && !t.sent)
            .cloned()
            .collect())
    }

    async fn mark_sent(&self, id: TargetId, sent_at: DateTime<Utc>) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.targets.iter_mut().find(|t| t.id == id && !t.sent) {
            Some(target) => {
                target.sent = true;
                target.sent_at = Some(sent_at);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl EventRepository for MemoryStore {
    async fn append(&self, input: NewEvent) -> Result<Event> {
        let event = Event {
            id: Uuid::now_v7(),
            target_id: input.target_id,
            event_type: input.metadata.event_type().as_str().to_string(),
            meta: input.metadata.to_value(),
            created_at: input.occurred_at,
        };

        self.state.write().await.events.push(event.clone());
        Ok(event)
    }

    async fn list_by_campaign(&self, campaign_id: CampaignId) -> Result<Vec<Event>> {
        let state = self.state.read().await;
        let targets: HashSet<TargetId> = state
            .targets
            .iter()
            .filter(|t| t.campaign_id == campaign_id)
            .map(|t| t.id)
            .collect();

        let mut events: Vec<Event> = state
            .events
            .iter()
            .filter(|e| targets.contains(&e.target_id))
            .cloned()
            .collect();
        events.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(events)
    }
}

#[async_trait]
impl StatsRepository for MemoryStore {
    async fn counts(&self, scope: StatsScope) -> Result<EventCounts> {
        let state = self.state.read().await;
        let interactions = state.interactions();

        let mut counts = EventCounts::default();
        for target in state.in_scope(scope) {
            tally(&mut counts, target, &interactions);
        }
        Ok(counts)
    }

    async fn grouped_counts(
        &self,
        scope: StatsScope,
        dimension: GroupDimension,
    ) -> Result<Vec<GroupCounts>> {
        let state = self.state.read().await;
        let interactions = state.interactions();

        let mut groups: BTreeMap<String, EventCounts> = BTreeMap::new();
        for target in state.in_scope(scope) {
            let name = attribute(target, dimension).unwrap_or(UNKNOWN_GROUP);
            tally(groups.entry(name.to_string()).or_default(), target, &interactions);
        }

        let mut rows: Vec<GroupCounts> = groups
            .into_iter()
            .map(|(group_name, c)| GroupCounts {
                group_name,
                total_targets: c.total_targets,
                emails_sent: c.emails_sent,
                opened: c.opened,
                clicked: c.clicked,
                submitted: c.submitted,
            })
            .collect();
        rows.sort_by(|a, b| {
            b.emails_sent
                .cmp(&a.emails_sent)
                .then_with(|| a.group_name.cmp(&b.group_name))
        });
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phishsim_common::types::{EventMetadata, VisitMetadata};
    use pretty_assertions::assert_eq;

    async fn campaign(store: &MemoryStore) -> Campaign {
        CampaignRepository::create(
            store,
            CreateCampaign {
                name: "Q3 payroll lure".to_string(),
                email_subject: "Payroll update".to_string(),
                email_body: "<p>Hi {{Name}}</p>".to_string(),
                from_address: "hr@example.com".to_string(),
                created_by: "soc".to_string(),
            },
        )
        .await
        .unwrap()
    }

    fn person(email: &str, department: Option<&str>) -> NewTarget {
        NewTarget {
            email: email.to_string(),
            department: department.map(str::to_string),
            ..Default::default()
        }
    }

    async fn open(store: &MemoryStore, target: &Target) {
        store
            .append(NewEvent {
                target_id: target.id,
                metadata: EventMetadata::Open(VisitMetadata::default()),
                occurred_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_token() {
        let store = MemoryStore::new();
        let c = campaign(&store).await;

        let first = store.insert(c.id, person("a@example.com", None), "tok").await.unwrap();
        assert!(first.is_some());

        let second = store.insert(c.id, person("b@example.com", None), "tok").await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_mark_sent_transitions_once() {
        let store = MemoryStore::new();
        let c = campaign(&store).await;
        let t = store
            .insert(c.id, person("a@example.com", None), "tok")
            .await
            .unwrap()
            .unwrap();

        let first_at = Utc::now();
        assert!(store.mark_sent(t.id, first_at).await.unwrap());
        assert!(!store.mark_sent(t.id, Utc::now()).await.unwrap());

        let stored = store.get_by_token("tok").await.unwrap().unwrap();
        assert!(stored.sent);
        assert_eq!(stored.sent_at, Some(first_at));
        assert!(store.list_unsent(c.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_counts_are_distinct_and_sent_only() {
        let store = MemoryStore::new();
        let c = campaign(&store).await;
        let a = store.insert(c.id, person("a@example.com", None), "a").await.unwrap().unwrap();
        let b = store.insert(c.id, person("b@example.com", None), "b").await.unwrap().unwrap();

        store.mark_sent(a.id, Utc::now()).await.unwrap();
        open(&store, &a).await;
        open(&store, &a).await;
        open(&store, &b).await;

        let counts = store.counts(StatsScope::Campaign(c.id)).await.unwrap();
        assert_eq!(
            counts,
            EventCounts {
                total_targets: 2,
                emails_sent: 1,
                opened: 1,
                clicked: 0,
                submitted: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_grouped_counts_unknown_bucket_and_order() {
        let store = MemoryStore::new();
        let c = campaign(&store).await;
        let rows = [
            ("a@example.com", Some("Finance"), "a"),
            ("b@example.com", Some("Finance"), "b"),
            ("c@example.com", Some("  "), "c"),
            ("d@example.com", None, "d"),
            ("e@example.com", Some("Sales"), "e"),
        ];
        for (email, dept, token) in rows {
            let t = store.insert(c.id, person(email, dept), token).await.unwrap().unwrap();
            if token != "e" {
                store.mark_sent(t.id, Utc::now()).await.unwrap();
            }
        }

        let groups = store
            .grouped_counts(StatsScope::All, GroupDimension::Department)
            .await
            .unwrap();
        let names: Vec<(&str, i64)> = groups
            .iter()
            .map(|g| (g.group_name.as_str(), g.emails_sent))
            .collect();
        assert_eq!(names, vec![("Finance", 2), ("Unknown", 2), ("Sales", 0)]);
        assert_eq!(groups[1].total_targets, 2);
    }
}

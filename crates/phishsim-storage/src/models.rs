//! Database models

use chrono::{DateTime, Utc};
use phishsim_common::types::{
    CampaignId, EventId, EventMetadata, EventType, TargetId,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Campaign model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub name: String,
    pub email_subject: String,
    /// HTML body with placeholders
    pub email_body: String,
    pub from_address: String,
    /// Operator that created the campaign
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a campaign
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCampaign {
    pub name: String,
    pub email_subject: String,
    pub email_body: String,
    pub from_address: String,
    pub created_by: String,
}

/// Target (campaign recipient) model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Target {
    pub id: TargetId,
    pub campaign_id: CampaignId,
    pub name: Option<String>,
    pub email: String,
    pub department: Option<String>,
    pub role: Option<String>,
    pub location: Option<String>,
    pub employee_id: Option<String>,
    pub manager: Option<String>,
    /// Tracking token, unique across all campaigns
    pub token: String,
    pub sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Recipient attributes for a new target
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTarget {
    #[serde(default)]
    pub name: Option<String>,
    pub email: String,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub employee_id: Option<String>,
    #[serde(default)]
    pub manager: Option<String>,
}

impl NewTarget {
    /// Trim every attribute and turn blank optional attributes into `None`
    pub fn normalized(self) -> Self {
        fn clean(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }

        Self {
            name: clean(self.name),
            email: self.email.trim().to_string(),
            department: clean(self.department),
            role: clean(self.role),
            location: clean(self.location),
            employee_id: clean(self.employee_id),
            manager: clean(self.manager),
        }
    }
}

/// Tracking event model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub target_id: TargetId,
    pub event_type: String,
    pub meta: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Get event type enum
    pub fn event_type_enum(&self) -> Option<EventType> {
        self.event_type.parse().ok()
    }

    /// Decode the typed metadata payload
    pub fn metadata(&self) -> phishsim_common::Result<EventMetadata> {
        let event_type = self.event_type.parse()?;
        EventMetadata::from_parts(event_type, self.meta.clone())
    }
}

/// Input for appending an event
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub target_id: TargetId,
    pub metadata: EventMetadata,
    pub occurred_at: DateTime<Utc>,
}

/// Raw distinct-target counts for a statistics scope.
///
/// `opened`, `clicked` and `submitted` count targets with `sent = true` that
/// have at least one event of the type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct EventCounts {
    pub total_targets: i64,
    pub emails_sent: i64,
    pub opened: i64,
    pub clicked: i64,
    pub submitted: i64,
}

/// Raw distinct-target counts for one group of a grouped query
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct GroupCounts {
    pub group_name: String,
    pub total_targets: i64,
    pub emails_sent: i64,
    pub opened: i64,
    pub clicked: i64,
    pub submitted: i64,
}

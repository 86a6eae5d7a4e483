//! Common types for PhishSim

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for campaigns
pub type CampaignId = Uuid;

/// Unique identifier for targets (campaign recipients)
pub type TargetId = Uuid;

/// Unique identifier for tracking events
pub type EventId = Uuid;

/// Kind of recorded recipient interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Open,
    Click,
    Submit,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Open => "open",
            EventType::Click => "click",
            EventType::Submit => "submit",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(EventType::Open),
            "click" => Ok(EventType::Click),
            "submit" => Ok(EventType::Submit),
            _ => Err(crate::Error::Validation(format!("Invalid event type: {}", s))),
        }
    }
}

/// Recipient attribute that grouped statistics may be bucketed by.
///
/// This is a closed set: any caller-supplied grouping name must parse into
/// one of these variants before it can shape an aggregation query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GroupDimension {
    #[default]
    Department,
    Role,
    Location,
    Manager,
}

impl GroupDimension {
    /// Column name in the targets table
    pub fn column(&self) -> &'static str {
        match self {
            GroupDimension::Department => "department",
            GroupDimension::Role => "role",
            GroupDimension::Location => "location",
            GroupDimension::Manager => "manager",
        }
    }
}

impl std::fmt::Display for GroupDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.column())
    }
}

impl std::str::FromStr for GroupDimension {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "department" => Ok(GroupDimension::Department),
            "role" => Ok(GroupDimension::Role),
            "location" => Ok(GroupDimension::Location),
            "manager" => Ok(GroupDimension::Manager),
            other => Err(crate::Error::Validation(format!(
                "Unsupported grouping dimension: {}",
                other
            ))),
        }
    }
}

/// Bucket name for targets with no value for the grouping dimension
pub const UNKNOWN_GROUP: &str = "Unknown";

/// Which campaigns a statistics query covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsScope {
    Campaign(CampaignId),
    All,
}

/// Request metadata captured for open and click events
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VisitMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,
}

/// Metadata captured for a decoy form submission.
///
/// Only the length of the submitted password is kept. There is no field
/// that can hold the password itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub username: String,
    pub password_length: usize,
}

impl SubmitMetadata {
    /// Build submit metadata, reducing the password to its UTF-8 byte length
    pub fn new(visit: VisitMetadata, username: impl Into<String>, password: &str) -> Self {
        Self {
            ip: visit.ip,
            user_agent: visit.user_agent,
            username: username.into(),
            password_length: password.len(),
        }
    }
}

/// Typed metadata payload, one variant per event type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "meta", rename_all = "snake_case")]
pub enum EventMetadata {
    Open(VisitMetadata),
    Click(VisitMetadata),
    Submit(SubmitMetadata),
}

impl EventMetadata {
    /// Event type implied by this payload
    pub fn event_type(&self) -> EventType {
        match self {
            EventMetadata::Open(_) => EventType::Open,
            EventMetadata::Click(_) => EventType::Click,
            EventMetadata::Submit(_) => EventType::Submit,
        }
    }

    /// Serialize the inner payload for the `meta` column
    pub fn to_value(&self) -> serde_json::Value {
        let value = match self {
            EventMetadata::Open(meta) | EventMetadata::Click(meta) => serde_json::to_value(meta),
            EventMetadata::Submit(meta) => serde_json::to_value(meta),
        };
        value.unwrap_or_else(|_| serde_json::json!({}))
    }

    /// Rebuild a typed payload from a stored event type and `meta` column
    pub fn from_parts(event_type: EventType, value: serde_json::Value) -> crate::Result<Self> {
        let invalid = |e: serde_json::Error| {
            crate::Error::Validation(format!("Invalid {} metadata: {}", event_type, e))
        };
        Ok(match event_type {
            EventType::Open => EventMetadata::Open(serde_json::from_value(value).map_err(invalid)?),
            EventType::Click => {
                EventMetadata::Click(serde_json::from_value(value).map_err(invalid)?)
            }
            EventType::Submit => {
                EventMetadata::Submit(serde_json::from_value(value).map_err(invalid)?)
            }
        })
    }
}

/// Minimal email validation: non-empty and contains both `@` and `.`
pub fn is_minimal_email(email: &str) -> bool {
    let email = email.trim();
    !email.is_empty() && email.contains('@') && email.contains('.')
}

/// Shortened token suitable for log lines
pub fn token_prefix(token: &str) -> &str {
    let end = token
        .char_indices()
        .nth(8)
        .map(|(i, _)| i)
        .unwrap_or(token.len());
    &token[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_group_dimension_allow_list() {
        assert_eq!("department".parse::<GroupDimension>().unwrap(), GroupDimension::Department);
        assert_eq!(" Role ".parse::<GroupDimension>().unwrap(), GroupDimension::Role);
        assert!("department; DROP TABLE targets".parse::<GroupDimension>().is_err());
        assert!("email".parse::<GroupDimension>().is_err());
        assert_eq!(GroupDimension::default().column(), "department");
    }

    #[test]
    fn test_submit_metadata_keeps_only_password_length() {
        let meta = SubmitMetadata::new(VisitMetadata::default(), "jdoe", "hunter2");
        let value = EventMetadata::Submit(meta).to_value();

        assert_eq!(value["password_length"], 7);
        assert_eq!(value["username"], "jdoe");
        assert!(value.get("password").is_none());
    }

    #[test]
    fn test_password_length_counts_bytes() {
        let meta = SubmitMetadata::new(VisitMetadata::default(), "jdoe", "pässwörd");
        assert_eq!(meta.password_length, 10);
    }

    #[test]
    fn test_metadata_from_parts() {
        let value = serde_json::json!({"ip": "10.0.0.1", "user_agent": "curl/8"});
        let meta = EventMetadata::from_parts(EventType::Click, value).unwrap();
        assert_eq!(meta.event_type(), EventType::Click);

        let bad = serde_json::json!({"ip": "10.0.0.1"});
        assert!(EventMetadata::from_parts(EventType::Submit, bad).is_err());
    }

    #[test]
    fn test_minimal_email() {
        assert!(is_minimal_email("alice@example.com"));
        assert!(!is_minimal_email("alice@localhost"));
        assert!(!is_minimal_email("alice.example.com"));
        assert!(!is_minimal_email("   "));
    }

    #[test]
    fn test_token_prefix() {
        assert_eq!(token_prefix("0123456789abcdef"), "01234567");
        assert_eq!(token_prefix("abc"), "abc");
    }
}

//! PhishSim Core - Campaign dispatch and tracking pipeline
//!
//! This crate issues tracking tokens, renders and dispatches campaign
//! emails, records tracking events and aggregates campaign statistics.

pub mod dispatch;
pub mod enroll;
pub mod export;
pub mod metrics;
pub mod recorder;
pub mod stats;
pub mod template;
pub mod token;

#[cfg(test)]
pub(crate) mod testing;

pub use dispatch::{
    CampaignDispatcher, DispatchAck, DispatchError, DispatchProgress, DispatchSupervisor,
    MailTransport, OutgoingEmail, SmtpTransport, TransportError,
};
pub use enroll::{EnrollmentReport, RejectedRow, TargetEnroller};
pub use export::{ResultExporter, TargetResult, CSV_HEADER};
pub use metrics::Metrics;
pub use recorder::{EventRecorder, RecordError};
pub use stats::{CampaignStats, CampaignSummary, GroupStats, StatsAggregator};
pub use template::{RenderedEmail, TemplateRenderer};
pub use token::TokenIssuer;

//! Prometheus metrics
//!
//! The registry is owned by the application and handed to components at
//! construction. Nothing registers into the process-wide default registry.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Application metrics
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    /// Emails accepted by the transport
    pub emails_sent: IntCounter,
    /// Emails the transport rejected
    pub emails_failed: IntCounter,
    /// Recorded tracking events by type
    pub tracking_events: IntCounterVec,
    /// Tracking requests whose token did not resolve, by endpoint
    pub tracking_unresolved: IntCounterVec,
    /// Campaign dispatch workers currently running
    pub active_dispatches: IntGauge,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let emails_sent = IntCounter::with_opts(Opts::new(
            "phishsim_emails_sent_total",
            "Campaign emails accepted by the SMTP transport",
        ))?;
        let emails_failed = IntCounter::with_opts(Opts::new(
            "phishsim_emails_failed_total",
            "Campaign emails the SMTP transport failed to send",
        ))?;
        let tracking_events = IntCounterVec::new(
            Opts::new(
                "phishsim_tracking_events_total",
                "Tracking events recorded",
            ),
            &["event_type"],
        )?;
        let tracking_unresolved = IntCounterVec::new(
            Opts::new(
                "phishsim_tracking_unresolved_total",
                "Tracking requests with an unknown token",
            ),
            &["endpoint"],
        )?;
        let active_dispatches = IntGauge::with_opts(Opts::new(
            "phishsim_active_dispatches",
            "Campaign dispatch workers currently running",
        ))?;

        registry.register(Box::new(emails_sent.clone()))?;
        registry.register(Box::new(emails_failed.clone()))?;
        registry.register(Box::new(tracking_events.clone()))?;
        registry.register(Box::new(tracking_unresolved.clone()))?;
        registry.register(Box::new(active_dispatches.clone()))?;

        Ok(Self {
            registry,
            emails_sent,
            emails_failed,
            tracking_events,
            tracking_unresolved,
            active_dispatches,
        })
    }

    /// Render all metrics in the Prometheus text exposition format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_registered_metrics() {
        let metrics = Metrics::new().unwrap();
        metrics.emails_sent.inc();
        metrics.tracking_events.with_label_values(&["open"]).inc();
        metrics.tracking_unresolved.with_label_values(&["open"]).inc();

        let text = metrics.render().unwrap();
        assert!(text.contains("phishsim_emails_sent_total 1"));
        assert!(text.contains("phishsim_tracking_events_total{event_type=\"open\"} 1"));
        assert!(text.contains("phishsim_active_dispatches 0"));
    }

    #[test]
    fn test_registries_are_independent() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.emails_failed.inc();
        assert_eq!(b.emails_failed.get(), 0);
    }
}

//! Prometheus metrics for the relay.
//!
//! Exposed on the `/metrics` endpoint when `metrics_port` is set.
//!
//! - `relay_inbound_events_total{kind}` - normalized events applied by the session
//! - `relay_moderation_kicks_total{reason}` - kicks issued by moderation
//! - `relay_plugin_failures_total{stage}` - handler errors and panics
//! - `relay_ai_requests_total{outcome}` - conversational backend calls
//! - `relay_observer_connections` - connected web observers (gauge)
//! - `relay_channels` - channels the session occupies (gauge)

use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Counters
// ========================================================================

pub static INBOUND_EVENTS: OnceLock<IntCounterVec> = OnceLock::new();

/// Kicks by verdict (`flood`, `caps`).
pub static MODERATION_KICKS: OnceLock<IntCounterVec> = OnceLock::new();

/// Plugin failures by stage (`load`, `command`, `message`, `cleanup`).
pub static PLUGIN_FAILURES: OnceLock<IntCounterVec> = OnceLock::new();

pub static AI_REQUESTS: OnceLock<IntCounterVec> = OnceLock::new();

// ========================================================================
// Gauges
// ========================================================================

pub static OBSERVER_CONNECTIONS: OnceLock<IntGauge> = OnceLock::new();

pub static CHANNELS: OnceLock<IntGauge> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Called once at startup. Recording before `init` is a no-op.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            let m = $init.expect(concat!(stringify!($metric), " creation failed"));
            if let Err(e) = r.register(Box::new(m.clone())) {
                tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
            }
            let _ = $metric.set(m);
        };
    }

    register!(INBOUND_EVENTS, IntCounterVec::new(Opts::new("relay_inbound_events_total", "Normalized events applied by kind"), &["kind"]));
    register!(MODERATION_KICKS, IntCounterVec::new(Opts::new("relay_moderation_kicks_total", "Moderation kicks by reason"), &["reason"]));
    register!(PLUGIN_FAILURES, IntCounterVec::new(Opts::new("relay_plugin_failures_total", "Plugin failures by stage"), &["stage"]));
    register!(AI_REQUESTS, IntCounterVec::new(Opts::new("relay_ai_requests_total", "Conversational backend calls by outcome"), &["outcome"]));
    register!(OBSERVER_CONNECTIONS, IntGauge::new("relay_observer_connections", "Connected web observers"));
    register!(CHANNELS, IntGauge::new("relay_channels", "Channels occupied by the session"));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn inc_counter(metric: &OnceLock<IntCounterVec>, label: &str) {
    if let Some(c) = metric.get() {
        c.with_label_values(&[label]).inc();
    }
}

#[inline]
pub fn record_inbound_event(kind: &str) {
    inc_counter(&INBOUND_EVENTS, kind);
}

#[inline]
pub fn record_moderation_kick(reason: &str) {
    inc_counter(&MODERATION_KICKS, reason);
}

#[inline]
pub fn record_plugin_failure(stage: &str) {
    inc_counter(&PLUGIN_FAILURES, stage);
}

#[inline]
pub fn record_ai_request(outcome: &str) {
    inc_counter(&AI_REQUESTS, outcome);
}

#[inline]
pub fn observer_connected() {
    if let Some(g) = OBSERVER_CONNECTIONS.get() {
        g.inc();
    }
}

#[inline]
pub fn observer_disconnected() {
    if let Some(g) = OBSERVER_CONNECTIONS.get() {
        g.dec();
    }
}

#[inline]
pub fn set_channels(count: usize) {
    if let Some(g) = CHANNELS.get() {
        g.set(count as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_lifecycle() {
        init();

        record_inbound_event("join");
        record_moderation_kick("flood");
        set_channels(2);

        let output = gather_metrics();
        assert!(output.contains("relay_inbound_events_total"));
        assert!(output.contains("relay_moderation_kicks_total"));
        assert!(output.contains("relay_channels 2"));
    }
}

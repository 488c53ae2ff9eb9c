//! Prometheus metrics for the relay.
//!
//! All metric name constants live here. Call sites use these constants
//! rather than raw strings to prevent typos and keep renaming centralized.

use metrics::{counter, gauge};

/// Current number of open sessions on this process (gauge).
pub const SESSIONS_OPEN: &str = "shoal_sessions_open";
/// Total envelopes delivered to local sessions (counter).
pub const ENVELOPES_DELIVERED: &str = "shoal_envelopes_delivered_total";
/// Total envelopes published to the bus (counter).
pub const ENVELOPES_PUBLISHED: &str = "shoal_envelopes_published_total";
/// Total bus publish failures (counter).
pub const BUS_PUBLISH_FAILURES: &str = "shoal_bus_publish_failures_total";
/// Total bus payloads skipped because they failed to decode (counter).
pub const BUS_DECODE_SKIPPED: &str = "shoal_bus_decode_skipped_total";
/// Total envelopes dropped because a session's outbound queue was full (counter).
pub const OUTBOUND_DROPS: &str = "shoal_outbound_drops_total";

#[inline]
pub fn session_opened() {
    gauge!(SESSIONS_OPEN).increment(1.0);
}

#[inline]
pub fn session_closed() {
    gauge!(SESSIONS_OPEN).decrement(1.0);
}

#[inline]
pub fn envelope_delivered() {
    counter!(ENVELOPES_DELIVERED).increment(1);
}

#[inline]
pub fn envelope_published() {
    counter!(ENVELOPES_PUBLISHED).increment(1);
}

#[inline]
pub fn publish_failure() {
    counter!(BUS_PUBLISH_FAILURES).increment(1);
}

#[inline]
pub fn decode_skipped() {
    counter!(BUS_DECODE_SKIPPED).increment(1);
}

#[inline]
pub fn outbound_drop() {
    counter!(OUTBOUND_DROPS).increment(1);
}

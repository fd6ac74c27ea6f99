// Tephra Server - Prometheus metrics definitions
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Prometheus metrics for the ingestion loop, the store and the rule
//! scheduler.

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge_vec, Encoder, IntCounter,
    IntCounterVec, IntGaugeVec, TextEncoder,
};
use tephra::{Channel, ChannelStore, NotificationChannel, ReadingSet};

lazy_static! {
    // ============================================================
    // Ingestion
    // ============================================================

    /// Datagrams received on the UDP socket.
    pub static ref PACKETS_RECEIVED_TOTAL: IntCounter = register_int_counter!(
        "tephra_packets_received_total",
        "Datagrams received on the UDP socket"
    ).unwrap();

    /// Datagrams rejected by the decoder, labeled by reason.
    pub static ref PACKETS_REJECTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "tephra_packets_rejected_total",
        "Datagrams rejected by the decoder",
        &["reason"]
    ).unwrap();

    /// Readings appended to the store, labeled by channel.
    pub static ref READINGS_STORED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "tephra_readings_stored_total",
        "Readings appended to the store",
        &["channel"]
    ).unwrap();

    /// Readings currently retained, labeled by channel.
    pub static ref STORED_READINGS: IntGaugeVec = register_int_gauge_vec!(
        "tephra_stored_readings",
        "Readings currently retained per channel",
        &["channel"]
    ).unwrap();

    // ============================================================
    // Rules
    // ============================================================

    /// Completed rule evaluation ticks.
    pub static ref RULE_TICKS_TOTAL: IntCounter = register_int_counter!(
        "tephra_rule_ticks_total",
        "Completed rule evaluation ticks"
    ).unwrap();

    /// Rules whose condition held.
    pub static ref ALERTS_FIRED_TOTAL: IntCounter = register_int_counter!(
        "tephra_alerts_fired_total",
        "Rules whose condition held on a tick"
    ).unwrap();

    /// Failed notification deliveries, labeled by channel.
    pub static ref DISPATCH_FAILURES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "tephra_dispatch_failures_total",
        "Failed notification deliveries",
        &["channel"]
    ).unwrap();
}

/// Count a received datagram.
pub fn record_packet_received() {
    PACKETS_RECEIVED_TOTAL.inc();
}

/// Count a rejected datagram.
pub fn record_packet_rejected(reason: &str) {
    PACKETS_REJECTED_TOTAL.with_label_values(&[reason]).inc();
}

/// Count the readings of an ingested set and refresh the retained gauges.
pub fn record_ingest(set: &ReadingSet, store: &ChannelStore) {
    for reading in &set.readings {
        let channel = reading.channel.as_str();
        READINGS_STORED_TOTAL.with_label_values(&[channel]).inc();
        STORED_READINGS
            .with_label_values(&[channel])
            .set(store.len(reading.channel) as i64);
    }
}

/// Count a completed tick and its alerts.
pub fn record_tick(alerts: usize) {
    RULE_TICKS_TOTAL.inc();
    ALERTS_FIRED_TOTAL.inc_by(alerts as u64);
}

/// Count a failed delivery.
pub fn record_dispatch_failure(channel: NotificationChannel) {
    DISPATCH_FAILURES_TOTAL
        .with_label_values(&[channel.as_str()])
        .inc();
}

/// Current retained-readings gauge for a channel.
pub fn stored_readings(channel: Channel) -> i64 {
    STORED_READINGS.with_label_values(&[channel.as_str()]).get()
}

/// Encode all metrics to Prometheus text format.
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

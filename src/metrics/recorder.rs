//! Metrics recorded by the relay engines
//!
//! Every call is a no-op until a recorder is installed, so the engines
//! record unconditionally.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initialize metric descriptions (call once at startup)
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    // Node
    describe_counter!(
        "meshrelay_readings_total",
        "Sensor readings accepted into the queue"
    );
    describe_counter!(
        "meshrelay_readings_rejected_total",
        "Sensor readings the queue refused"
    );
    describe_counter!(
        "meshrelay_sent_total",
        "Queue entries delivered to the gateway"
    );
    describe_counter!(
        "meshrelay_fragmented_total",
        "Delivered entries that needed fragmentation"
    );
    describe_counter!(
        "meshrelay_send_failures_total",
        "Failed sends towards the gateway"
    );
    describe_counter!(
        "meshrelay_entries_discarded_total",
        "Queue entries too large to ever fit the radio frame"
    );
    describe_counter!(
        "meshrelay_discovery_attempts_total",
        "Gateway discovery broadcasts"
    );
    describe_counter!(
        "meshrelay_gateway_lost_total",
        "Times the failure threshold cleared the gateway"
    );
    describe_gauge!("meshrelay_queue_depth", "Entries waiting in the node queue");

    // Gateway
    describe_counter!(
        "meshrelay_published_total",
        "Messages published to the broker"
    );
    describe_counter!(
        "meshrelay_publish_failures_total",
        "Broker publishes that failed"
    );
    describe_counter!(
        "meshrelay_reassembled_total",
        "Multi-part messages reassembled"
    );
    describe_counter!(
        "meshrelay_fragments_dropped_total",
        "Fragments dropped as malformed or expired"
    );
    describe_histogram!(
        "meshrelay_reassembly_duration_seconds",
        "Time from first fragment to completed message"
    );
}

// ============== Node ==============

pub fn record_entry_discarded() {
    counter!("meshrelay_entries_discarded_total").increment(1);
}

pub fn record_reading(accepted: bool) {
    if accepted {
        counter!("meshrelay_readings_total").increment(1);
    } else {
        counter!("meshrelay_readings_rejected_total").increment(1);
    }
}

pub fn record_sent(fragments: usize) {
    counter!("meshrelay_sent_total").increment(1);
    if fragments > 1 {
        counter!("meshrelay_fragmented_total").increment(1);
    }
}

pub fn record_send_failure() {
    counter!("meshrelay_send_failures_total").increment(1);
}

pub fn record_discovery_attempt(found: bool) {
    let outcome = if found { "found" } else { "timeout" };
    counter!("meshrelay_discovery_attempts_total", "outcome" => outcome).increment(1);
}

pub fn record_gateway_lost() {
    counter!("meshrelay_gateway_lost_total").increment(1);
}

pub fn set_queue_depth(depth: usize) {
    gauge!("meshrelay_queue_depth").set(depth as f64);
}

// ============== Gateway ==============

/// `kind` is the topic family, `data` or `kpi`
pub fn record_published(kind: &'static str) {
    counter!("meshrelay_published_total", "kind" => kind).increment(1);
}

pub fn record_publish_failure(kind: &'static str) {
    counter!("meshrelay_publish_failures_total", "kind" => kind).increment(1);
}

pub fn record_reassembled(elapsed: Duration) {
    counter!("meshrelay_reassembled_total").increment(1);
    histogram!("meshrelay_reassembly_duration_seconds").record(elapsed.as_secs_f64());
}

/// `reason` is `malformed` or `expired`
pub fn record_fragment_dropped(reason: &'static str, count: usize) {
    counter!("meshrelay_fragments_dropped_total", "reason" => reason).increment(count as u64);
}

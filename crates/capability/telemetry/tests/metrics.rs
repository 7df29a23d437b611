use ems_telemetry::{
    TelemetryMetrics, metrics, record_deferred_tick, record_publish_latency_ms,
};

#[test]
fn fresh_metrics_start_at_zero() {
    let snapshot = TelemetryMetrics::new().snapshot();
    assert_eq!(snapshot, Default::default());
}

#[test]
fn global_counters_accumulate() {
    let before = metrics().snapshot();
    record_deferred_tick();
    record_publish_latency_ms(12);
    let after = metrics().snapshot();
    assert!(after.deferred_ticks >= before.deferred_ticks + 1);
    assert!(after.publish_latency_ms_total >= before.publish_latency_ms_total + 12);
    assert!(after.publish_latency_ms_count >= before.publish_latency_ms_count + 1);
}

#[test]
fn request_and_trace_ids_differ() {
    let ids = ems_telemetry::new_request_ids();
    assert_eq!(ids.request_id.len(), 36);
    assert_ne!(ids.request_id, ids.trace_id);
    assert_ne!(ids.request_id, ems_telemetry::new_request_ids().request_id);
}

//! Prometheus text exposition for tracker metrics
//!
//! Served at /metrics by the HTTP transport.

use crate::infra::metrics::{Metrics, MetricsSummary, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use std::fmt::Write;

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge) with site label
fn write_metric(
    output: &mut String,
    name: &str,
    help: &str,
    typ: MetricType,
    site: &str,
    val: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val}");
}

/// Write a histogram metric with buckets, sum, and count
fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    site: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    bounds: &[u64; 10],
    sum: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in bounds.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"+Inf\"}} {cumulative}");

    let count: u64 = buckets.iter().sum();
    let _ = writeln!(output, "{name}_sum{{site=\"{site}\"}} {sum}");
    let _ = writeln!(output, "{name}_count{{site=\"{site}\"}} {count}");
}

/// Format metrics in Prometheus text exposition format
pub fn format_prometheus_metrics(metrics: &Metrics, tracked_vehicles: usize, site_id: &str) -> String {
    let summary = metrics.snapshot(tracked_vehicles);
    let mut output = String::with_capacity(4096);

    write_core_metrics(&mut output, site_id, &summary);
    write_latency_metrics(&mut output, site_id, &summary);
    write_transition_metrics(&mut output, site_id, &summary);
    write_error_metrics(&mut output, site_id, &summary);
    write_audit_metrics(&mut output, site_id, &summary);

    output
}

fn write_core_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "zone_tracker_events_total",
        "Total location events processed",
        MetricType::Counter,
        site,
        summary.events_total,
    );
    let _ = writeln!(output, "# HELP zone_tracker_events_per_sec Average events processed per second since start");
    let _ = writeln!(output, "# TYPE zone_tracker_events_per_sec gauge");
    let _ = writeln!(
        output,
        "zone_tracker_events_per_sec{{site=\"{site}\"}} {:.2}",
        summary.events_per_sec
    );
    write_metric(
        output,
        "zone_tracker_tracked_vehicles",
        "Vehicles with state in the store",
        MetricType::Gauge,
        site,
        summary.tracked_vehicles as u64,
    );
}

fn write_latency_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_histogram(
        output,
        "zone_tracker_event_latency_us",
        "Location event processing latency in microseconds",
        site,
        &summary.lat_buckets,
        &METRICS_BUCKET_BOUNDS,
        summary.latency_sum_us,
    );

    write_metric(
        output,
        "zone_tracker_event_latency_p50_us",
        "50th percentile event latency",
        MetricType::Gauge,
        site,
        summary.lat_p50_us,
    );
    write_metric(
        output,
        "zone_tracker_event_latency_p95_us",
        "95th percentile event latency",
        MetricType::Gauge,
        site,
        summary.lat_p95_us,
    );
    write_metric(
        output,
        "zone_tracker_event_latency_p99_us",
        "99th percentile event latency",
        MetricType::Gauge,
        site,
        summary.lat_p99_us,
    );
    write_metric(
        output,
        "zone_tracker_event_latency_max_us",
        "Maximum event latency since start",
        MetricType::Gauge,
        site,
        summary.max_process_latency_us,
    );
}

fn write_transition_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    let _ = writeln!(output, "# HELP zone_tracker_transitions_total Zone transitions by kind");
    let _ = writeln!(output, "# TYPE zone_tracker_transitions_total counter");
    for (kind, val) in [
        ("entered", summary.entered_total),
        ("exited", summary.exited_total),
        ("moved", summary.moved_total),
    ] {
        let _ = writeln!(
            output,
            "zone_tracker_transitions_total{{site=\"{site}\",kind=\"{kind}\"}} {val}"
        );
    }
}

fn write_error_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "zone_tracker_invalid_coordinates_total",
        "Location events rejected for out-of-range coordinates",
        MetricType::Counter,
        site,
        summary.invalid_coordinates_total,
    );
    write_metric(
        output,
        "zone_tracker_vehicle_not_found_total",
        "Queries for vehicles with no recorded state",
        MetricType::Counter,
        site,
        summary.vehicle_not_found_total,
    );
    write_metric(
        output,
        "zone_tracker_internal_errors_total",
        "Location events failed with an internal error",
        MetricType::Counter,
        site,
        summary.internal_errors_total,
    );
}

fn write_audit_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "zone_tracker_audit_sent_total",
        "Audit records accepted by the audit channel",
        MetricType::Counter,
        site,
        summary.audit_sent_total,
    );
    write_metric(
        output,
        "zone_tracker_audit_dropped_total",
        "Audit records dropped due to channel full",
        MetricType::Counter,
        site,
        summary.audit_dropped_total,
    );
    write_metric(
        output,
        "zone_tracker_audit_written_total",
        "Audit records written to file",
        MetricType::Counter,
        site,
        summary.audit_written_total,
    );
}

//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All counter updates are lock-free; reporting is the only operation
//! that needs synchronization (via atomic swap).
//!
//! NOTE: All atomics use Relaxed ordering intentionally; these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use crate::domain::Transition;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Exponential bucket boundaries (microseconds)
/// Buckets: ≤5, ≤10, ≤20, ≤40, ≤80, ≤160, ≤320, ≤640, ≤1280, ≤2560, >2560
const BUCKET_BOUNDS: [u64; 10] = [5, 10, 20, 40, 80, 160, 320, 640, 1280, 2560];
const NUM_BUCKETS: usize = 11;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    // Rank of the percentile sample, 1-based
    let target = ((total as f64 * percentile).ceil() as u64).max(1);
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [5, 10, 20, 40, 80, 160, 320, 640, 1280, 2560, 5120];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
///
/// All recording operations are lock-free using atomics.
/// The `report()` method atomically swaps counters to get a consistent snapshot.
pub struct Metrics {
    /// Total location events processed (monotonic)
    events_total: AtomicU64,
    /// Events since last report (reset on report)
    events_since_report: AtomicU64,
    /// Sum of latencies in microseconds (reset on report)
    latency_sum_us: AtomicU64,
    /// Max latency in microseconds (reset on report)
    latency_max_us: AtomicU64,
    /// Processing latency histogram buckets (reset on report)
    latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Latency sum since start (monotonic)
    latency_sum_total_us: AtomicU64,
    /// Max latency since start (monotonic)
    latency_max_total_us: AtomicU64,
    /// Latency histogram since start (monotonic, exported to Prometheus)
    latency_buckets_total: [AtomicU64; NUM_BUCKETS],
    entered_total: AtomicU64,
    exited_total: AtomicU64,
    moved_total: AtomicU64,
    /// Events rejected for out-of-range coordinates (monotonic)
    invalid_coordinates_total: AtomicU64,
    /// Queries for vehicles never seen (monotonic)
    vehicle_not_found_total: AtomicU64,
    /// Events that failed with an internal error (monotonic)
    internal_errors_total: AtomicU64,
    /// Audit records accepted by the audit channel (monotonic)
    audit_sent_total: AtomicU64,
    /// Audit records dropped due to channel full or closed (monotonic)
    audit_dropped_total: AtomicU64,
    /// Audit records written by the writer task (monotonic)
    audit_written_total: AtomicU64,
    /// Last report time (only accessed from reporter, not atomic)
    last_report_time: parking_lot::Mutex<Instant>,
    started_at: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            events_total: AtomicU64::new(0),
            events_since_report: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_max_us: AtomicU64::new(0),
            latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            latency_sum_total_us: AtomicU64::new(0),
            latency_max_total_us: AtomicU64::new(0),
            latency_buckets_total: std::array::from_fn(|_| AtomicU64::new(0)),
            entered_total: AtomicU64::new(0),
            exited_total: AtomicU64::new(0),
            moved_total: AtomicU64::new(0),
            invalid_coordinates_total: AtomicU64::new(0),
            vehicle_not_found_total: AtomicU64::new(0),
            internal_errors_total: AtomicU64::new(0),
            audit_sent_total: AtomicU64::new(0),
            audit_dropped_total: AtomicU64::new(0),
            audit_written_total: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
            started_at: Instant::now(),
        }
    }

    /// Record an event was processed with given latency (lock-free)
    #[inline]
    pub fn record_event_processed(&self, latency_us: u64) {
        self.events_total.fetch_add(1, Ordering::Relaxed);
        self.events_since_report.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);

        let bucket = bucket_index(latency_us);
        self.latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);
        self.latency_buckets_total[bucket].fetch_add(1, Ordering::Relaxed);
        self.latency_sum_total_us.fetch_add(latency_us, Ordering::Relaxed);

        update_atomic_max(&self.latency_max_us, latency_us);
        update_atomic_max(&self.latency_max_total_us, latency_us);
    }

    /// Record a detected transition by kind (lock-free)
    #[inline]
    pub fn record_transition(&self, transition: &Transition) {
        let counter = match transition {
            Transition::Entered { .. } => &self.entered_total,
            Transition::Exited { .. } => &self.exited_total,
            Transition::Moved { .. } => &self.moved_total,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_invalid_coordinate(&self) {
        self.invalid_coordinates_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_vehicle_not_found(&self) {
        self.vehicle_not_found_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_internal_error(&self) {
        self.internal_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_audit_sent(&self) {
        self.audit_sent_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an audit record dropped due to channel full (lock-free)
    #[inline]
    pub fn record_audit_dropped(&self) {
        self.audit_dropped_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_audit_written(&self) {
        self.audit_written_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Get total events processed
    #[inline]
    pub fn events_total(&self) -> u64 {
        self.events_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn transitions_total(&self) -> u64 {
        self.entered_total.load(Ordering::Relaxed)
            + self.exited_total.load(Ordering::Relaxed)
            + self.moved_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn invalid_coordinates_total(&self) -> u64 {
        self.invalid_coordinates_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn internal_errors_total(&self) -> u64 {
        self.internal_errors_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn audit_dropped_total(&self) -> u64 {
        self.audit_dropped_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn audit_written_total(&self) -> u64 {
        self.audit_written_total.load(Ordering::Relaxed)
    }

    /// Calculate and return metrics summary, then reset periodic counters
    ///
    /// This is the only method that resets counters. It uses atomic swap
    /// to get a consistent snapshot while allowing concurrent updates.
    pub fn report(&self, tracked_vehicles: usize) -> MetricsSummary {
        // Swap periodic counters to zero and get their values
        let events_count = self.events_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.latency_sum_us.swap(0, Ordering::Relaxed);
        let max_latency = self.latency_max_us.swap(0, Ordering::Relaxed);
        let lat_buckets = swap_buckets(&self.latency_buckets);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let events_per_sec = if elapsed.as_secs_f64() > 0.0 {
            events_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        let avg_latency = if events_count > 0 { latency_sum / events_count } else { 0 };

        self.summary(events_per_sec, latency_sum, avg_latency, max_latency, lat_buckets, tracked_vehicles)
    }

    /// Cumulative view since start, without resetting anything
    ///
    /// Histogram buckets and the latency sum only grow, so repeated scrapes
    /// see monotonic series and never steal counts from `report()`.
    pub fn snapshot(&self, tracked_vehicles: usize) -> MetricsSummary {
        let events_total = self.events_total.load(Ordering::Relaxed);
        let latency_sum = self.latency_sum_total_us.load(Ordering::Relaxed);
        let max_latency = self.latency_max_total_us.load(Ordering::Relaxed);
        let mut lat_buckets = [0u64; NUM_BUCKETS];
        for (i, bucket) in self.latency_buckets_total.iter().enumerate() {
            lat_buckets[i] = bucket.load(Ordering::Relaxed);
        }

        let uptime = self.started_at.elapsed().as_secs_f64();
        let events_per_sec = if uptime > 0.0 { events_total as f64 / uptime } else { 0.0 };
        let avg_latency = if events_total > 0 { latency_sum / events_total } else { 0 };

        self.summary(events_per_sec, latency_sum, avg_latency, max_latency, lat_buckets, tracked_vehicles)
    }

    fn summary(
        &self,
        events_per_sec: f64,
        latency_sum_us: u64,
        avg_latency: u64,
        max_latency: u64,
        lat_buckets: [u64; NUM_BUCKETS],
        tracked_vehicles: usize,
    ) -> MetricsSummary {
        MetricsSummary {
            events_total: self.events_total.load(Ordering::Relaxed),
            events_per_sec,
            latency_sum_us,
            avg_process_latency_us: avg_latency,
            max_process_latency_us: max_latency,
            lat_buckets,
            lat_p50_us: percentile_from_buckets(&lat_buckets, 0.50),
            lat_p95_us: percentile_from_buckets(&lat_buckets, 0.95),
            lat_p99_us: percentile_from_buckets(&lat_buckets, 0.99),
            tracked_vehicles,
            entered_total: self.entered_total.load(Ordering::Relaxed),
            exited_total: self.exited_total.load(Ordering::Relaxed),
            moved_total: self.moved_total.load(Ordering::Relaxed),
            invalid_coordinates_total: self.invalid_coordinates_total.load(Ordering::Relaxed),
            vehicle_not_found_total: self.vehicle_not_found_total.load(Ordering::Relaxed),
            internal_errors_total: self.internal_errors_total.load(Ordering::Relaxed),
            audit_sent_total: self.audit_sent_total.load(Ordering::Relaxed),
            audit_dropped_total: self.audit_dropped_total.load(Ordering::Relaxed),
            audit_written_total: self.audit_written_total.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of histogram buckets
pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;

/// Exported bucket bounds for Prometheus formatting
pub const METRICS_BUCKET_BOUNDS: [u64; 10] = BUCKET_BOUNDS;

#[derive(Debug)]
pub struct MetricsSummary {
    pub events_total: u64,
    pub events_per_sec: f64,
    /// Sum of latencies covered by `lat_buckets` (µs)
    pub latency_sum_us: u64,
    pub avg_process_latency_us: u64,
    pub max_process_latency_us: u64,
    /// Processing latency histogram buckets
    /// Bounds: ≤5, ≤10, ≤20, ≤40, ≤80, ≤160, ≤320, ≤640, ≤1280, ≤2560, >2560 µs
    pub lat_buckets: [u64; NUM_BUCKETS],
    /// 50th percentile latency (µs)
    pub lat_p50_us: u64,
    /// 95th percentile latency (µs)
    pub lat_p95_us: u64,
    /// 99th percentile latency (µs)
    pub lat_p99_us: u64,
    /// Vehicles with state in the store
    pub tracked_vehicles: usize,
    pub entered_total: u64,
    pub exited_total: u64,
    pub moved_total: u64,
    pub invalid_coordinates_total: u64,
    pub vehicle_not_found_total: u64,
    pub internal_errors_total: u64,
    pub audit_sent_total: u64,
    pub audit_dropped_total: u64,
    pub audit_written_total: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            events_total = %self.events_total,
            events_per_sec = format!("{:.1}", self.events_per_sec),
            avg_latency_us = %self.avg_process_latency_us,
            max_latency_us = %self.max_process_latency_us,
            p50_us = %self.lat_p50_us,
            p99_us = %self.lat_p99_us,
            vehicles = %self.tracked_vehicles,
            entered = %self.entered_total,
            exited = %self.exited_total,
            moved = %self.moved_total,
            invalid = %self.invalid_coordinates_total,
            internal_errors = %self.internal_errors_total,
            audit_dropped = %self.audit_dropped_total,
            "metrics"
        );
    }
}

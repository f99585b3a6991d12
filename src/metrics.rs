//! Metrics façade (spec.md §4.10/§6): the forensics consumer calls
//! `record_event`/`record_anomaly`/`record_incident`/`record_drop`/
//! `set_queue_depth`; Prometheus *exposition* over HTTP stays out of the
//! core (spec.md §1 Non-goals framing), but the façade side, the trait
//! and a concrete sink a caller can wire up to their own listener, is
//! in scope and grounded in `original_source/services/processor/metrics.py`.
//!
//! "Metrics module absent" (spec.md §7) is modeled as a real type,
//! [`NoopMetricsSink`], rather than an `Option` check scattered through
//! `forensics`, the same sentinel-implementation shape as
//! `forwarder::status_http`'s `JournalAccess`/no-op journal pattern.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Anomaly kinds the forensics consumer reports, matching spec.md §6's
/// `kind ∈ {duplicate, ooo, gap, drift, latency_spike}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnomalyKind {
    Duplicate,
    OutOfOrder,
    Gap,
    Drift,
    LatencySpike,
}

impl AnomalyKind {
    fn label(self) -> &'static str {
        match self {
            AnomalyKind::Duplicate => "duplicate",
            AnomalyKind::OutOfOrder => "out_of_order",
            AnomalyKind::Gap => "sequence_gap",
            AnomalyKind::Drift => "schema_drift",
            AnomalyKind::LatencySpike => "latency_spike",
        }
    }
}

/// The metrics façade every collaborator (forensics consumer, ingest
/// server, analytic consumers) calls. Calls must be cheap and never
/// fail: a missing or misconfigured metrics backend must never take
/// down the pipeline (spec.md §7).
pub trait MetricsSink: Send + Sync {
    fn record_event(&self, latency_ms: Option<i64>);
    fn record_anomaly(&self, kind: AnomalyKind);
    fn record_incident(&self);
    fn record_drop(&self);
    fn set_queue_depth(&self, depth: usize);
}

/// "Metrics module absent": every call is a no-op. Used when no metrics
/// backend is configured; forensics and the ingest server continue
/// functioning identically either way.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn record_event(&self, _latency_ms: Option<i64>) {}
    fn record_anomaly(&self, _kind: AnomalyKind) {}
    fn record_incident(&self) {}
    fn record_drop(&self) {}
    fn set_queue_depth(&self, _depth: usize) {}
}

/// Latency histogram bucket boundaries (ms), identical in shape to
/// `metrics.py`'s `_latency_buckets` fixed bucket list.
const LATENCY_BUCKETS_MS: [f64; 9] = [1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0];

/// In-memory metrics sink: atomic counters plus a fixed-bucket latency
/// histogram, with a [`render_prometheus_text`](Self::render_prometheus_text)
/// method producing the same exposition shape as the original
/// `get_prometheus_metrics()`. Binding an HTTP listener to serve that
/// text is the caller's concern (spec.md §1: Prometheus exposition is an
/// external collaborator), not this crate's.
pub struct InMemoryMetricsSink {
    events_total: AtomicU64,
    drops_total: AtomicU64,
    anomalies_duplicate: AtomicU64,
    anomalies_ooo: AtomicU64,
    anomalies_gap: AtomicU64,
    anomalies_drift: AtomicU64,
    anomalies_latency_spike: AtomicU64,
    incidents_total: AtomicU64,
    queue_depth_max: AtomicU64,
    latency_sum_ms: AtomicU64,
    latency_count: AtomicU64,
    // Bucket counts (inclusive, <= boundary) plus one overflow "+Inf" bucket.
    latency_buckets: Mutex<[u64; LATENCY_BUCKETS_MS.len() + 1]>,
}

impl Default for InMemoryMetricsSink {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMetricsSink {
    pub fn new() -> Self {
        InMemoryMetricsSink {
            events_total: AtomicU64::new(0),
            drops_total: AtomicU64::new(0),
            anomalies_duplicate: AtomicU64::new(0),
            anomalies_ooo: AtomicU64::new(0),
            anomalies_gap: AtomicU64::new(0),
            anomalies_drift: AtomicU64::new(0),
            anomalies_latency_spike: AtomicU64::new(0),
            incidents_total: AtomicU64::new(0),
            queue_depth_max: AtomicU64::new(0),
            latency_sum_ms: AtomicU64::new(0),
            latency_count: AtomicU64::new(0),
            latency_buckets: Mutex::new([0; LATENCY_BUCKETS_MS.len() + 1]),
        }
    }

    pub fn events_total(&self) -> u64 {
        self.events_total.load(Ordering::Relaxed)
    }

    pub fn incidents_total(&self) -> u64 {
        self.incidents_total.load(Ordering::Relaxed)
    }

    /// Render the current snapshot in Prometheus text exposition format,
    /// matching `metrics.py::get_prometheus_metrics`'s layout (HELP/TYPE
    /// comments, cumulative histogram buckets, `_sum`/`_count` trailers).
    pub fn render_prometheus_text(&self) -> String {
        let mut out = String::new();
        out.push_str("# HELP mercurystream_events_total Total events processed\n");
        out.push_str("# TYPE mercurystream_events_total counter\n");
        out.push_str(&format!(
            "mercurystream_events_total {}\n\n",
            self.events_total()
        ));

        out.push_str("# HELP mercurystream_drops_total Total dropped events\n");
        out.push_str("# TYPE mercurystream_drops_total counter\n");
        out.push_str(&format!(
            "mercurystream_drops_total {}\n\n",
            self.drops_total.load(Ordering::Relaxed)
        ));

        out.push_str("# HELP mercurystream_anomalies_total Total anomalies detected by type\n");
        out.push_str("# TYPE mercurystream_anomalies_total counter\n");
        out.push_str(&format!(
            "mercurystream_anomalies_total{{type=\"duplicate\"}} {}\n",
            self.anomalies_duplicate.load(Ordering::Relaxed)
        ));
        out.push_str(&format!(
            "mercurystream_anomalies_total{{type=\"out_of_order\"}} {}\n",
            self.anomalies_ooo.load(Ordering::Relaxed)
        ));
        out.push_str(&format!(
            "mercurystream_anomalies_total{{type=\"sequence_gap\"}} {}\n",
            self.anomalies_gap.load(Ordering::Relaxed)
        ));
        out.push_str(&format!(
            "mercurystream_anomalies_total{{type=\"schema_drift\"}} {}\n",
            self.anomalies_drift.load(Ordering::Relaxed)
        ));
        out.push_str(&format!(
            "mercurystream_anomalies_total{{type=\"latency_spike\"}} {}\n\n",
            self.anomalies_latency_spike.load(Ordering::Relaxed)
        ));

        out.push_str("# HELP mercurystream_incidents_total Total incidents captured\n");
        out.push_str("# TYPE mercurystream_incidents_total counter\n");
        out.push_str(&format!(
            "mercurystream_incidents_total {}\n\n",
            self.incidents_total()
        ));

        out.push_str("# HELP mercurystream_latency_ms Event latency histogram\n");
        out.push_str("# TYPE mercurystream_latency_ms histogram\n");
        let buckets = self.latency_buckets.lock().unwrap();
        let mut cumulative = 0u64;
        for (i, boundary) in LATENCY_BUCKETS_MS.iter().enumerate() {
            cumulative += buckets[i];
            out.push_str(&format!(
                "mercurystream_latency_ms_bucket{{le=\"{boundary}\"}} {cumulative}\n"
            ));
        }
        cumulative += buckets[LATENCY_BUCKETS_MS.len()];
        out.push_str(&format!(
            "mercurystream_latency_ms_bucket{{le=\"+Inf\"}} {cumulative}\n"
        ));
        out.push_str(&format!(
            "mercurystream_latency_ms_sum {}\n",
            self.latency_sum_ms.load(Ordering::Relaxed)
        ));
        out.push_str(&format!(
            "mercurystream_latency_ms_count {}\n\n",
            self.latency_count.load(Ordering::Relaxed)
        ));

        out.push_str("# HELP mercurystream_queue_depth_max Maximum queue depth across consumers\n");
        out.push_str("# TYPE mercurystream_queue_depth_max gauge\n");
        out.push_str(&format!(
            "mercurystream_queue_depth_max {}\n",
            self.queue_depth_max.load(Ordering::Relaxed)
        ));

        out
    }

    fn observe_latency(&self, latency_ms: i64) {
        if latency_ms < 0 {
            return;
        }
        self.latency_sum_ms
            .fetch_add(latency_ms as u64, Ordering::Relaxed);
        self.latency_count.fetch_add(1, Ordering::Relaxed);

        let mut buckets = self.latency_buckets.lock().unwrap();
        let slot = LATENCY_BUCKETS_MS
            .iter()
            .position(|&boundary| (latency_ms as f64) <= boundary)
            .unwrap_or(LATENCY_BUCKETS_MS.len());
        buckets[slot] += 1;
    }
}

impl MetricsSink for InMemoryMetricsSink {
    fn record_event(&self, latency_ms: Option<i64>) {
        self.events_total.fetch_add(1, Ordering::Relaxed);
        if let Some(ms) = latency_ms {
            self.observe_latency(ms);
        }
    }

    fn record_anomaly(&self, kind: AnomalyKind) {
        let counter = match kind {
            AnomalyKind::Duplicate => &self.anomalies_duplicate,
            AnomalyKind::OutOfOrder => &self.anomalies_ooo,
            AnomalyKind::Gap => &self.anomalies_gap,
            AnomalyKind::Drift => &self.anomalies_drift,
            AnomalyKind::LatencySpike => &self.anomalies_latency_spike,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record_incident(&self) {
        self.incidents_total.fetch_add(1, Ordering::Relaxed);
    }

    fn record_drop(&self) {
        self.drops_total.fetch_add(1, Ordering::Relaxed);
    }

    fn set_queue_depth(&self, depth: usize) {
        self.queue_depth_max.store(depth as u64, Ordering::Relaxed);
    }
}

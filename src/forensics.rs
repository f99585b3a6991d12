//! Forensics consumer: orchestrates drift/integrity/latency checks and
//! drives the flight recorder (spec.md §4.10), grounded in
//! `original_source/services/processor/forensics.py::consumer_forensics`.

use crate::bus::Bus;
use crate::config::Config;
use crate::drift::check_schema_drift;
use crate::drift_sink::DriftSink;
use crate::event::Event;
use crate::flight_recorder::{write_bundle, FlightRecorder};
use crate::integrity::IntegrityTracker;
use crate::latency::LatencySpikeDetector;
use crate::metrics::{AnomalyKind, MetricsSink};
use std::sync::Arc;
use std::time::{Duration, Instant};

const SUBSCRIBER_QUEUE: usize = 5000;
const PRINT_EVERY: Duration = Duration::from_secs(10);

/// Running anomaly/throughput counters, logged every [`PRINT_EVERY`].
#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    processed: u64,
    drift: u64,
    duplicates: u64,
    out_of_order: u64,
    gaps: u64,
    spikes: u64,
    incidents: u64,
}

/// Run the forensics pipeline to completion (it never returns under
/// normal operation; the caller typically `tokio::spawn`s it).
pub async fn run(bus: Bus, config: Config, metrics: Arc<dyn MetricsSink>) {
    let sub = bus.subscribe(SUBSCRIBER_QUEUE);
    let mut counters = Counters::default();

    let mut integrity_tracker = IntegrityTracker::new(config.duplicate_lru_max);
    let mut latency_detector = LatencySpikeDetector::new(
        config.latency_buffer_size,
        config.latency_spike_threshold_ms,
        config.latency_spike_consecutive,
    );
    let (drift_sink, _drift_writer_handle) = DriftSink::spawn(config.drift_sample_file.clone());
    let mut flight_recorder = FlightRecorder::new(
        config.flight_pre_events,
        config.flight_post_events,
        config.flight_cooldown_s,
        config.incidents_dir.clone(),
    );

    let mut last_print = Instant::now();

    loop {
        let event = sub.recv().await;
        counters.processed += 1;

        let ingest_ts = event.get("ingest_ts_ms").and_then(|v| v.as_i64());
        let recv_ts = event.get("recv_ts_ms").and_then(|v| v.as_i64());
        let latency_ms = match (ingest_ts, recv_ts) {
            (Some(i), Some(r)) => Some(r - i),
            _ => None,
        };
        metrics.record_event(latency_ms);

        if let Some(finalized) = flight_recorder.record(event.clone()) {
            persist_incident(&config.incidents_dir, finalized);
        }

        let drift_report = check_schema_drift(&event);
        if drift_report.is_drift() {
            counters.drift += 1;
            drift_sink.submit(&event, &drift_report);
            metrics.record_anomaly(AnomalyKind::Drift);
        }

        let flags = integrity_tracker.check(&event);
        if flags.is_duplicate {
            counters.duplicates += 1;
            metrics.record_anomaly(AnomalyKind::Duplicate);
        }
        if flags.is_out_of_order {
            counters.out_of_order += 1;
            metrics.record_anomaly(AnomalyKind::OutOfOrder);
        }
        if flags.is_gap {
            counters.gaps += 1;
            metrics.record_anomaly(AnomalyKind::Gap);
        }

        if let (Some(i), Some(r)) = (ingest_ts, recv_ts) {
            if latency_detector.add_sample(i, r) {
                counters.spikes += 1;
                metrics.record_anomaly(AnomalyKind::LatencySpike);
                let reason = format!("latency_spike_p99={}ms", latency_detector.get_p99());
                if flight_recorder.trigger(reason, Instant::now()) {
                    counters.incidents = flight_recorder.incident_count();
                    metrics.record_incident();
                }
            }
        }

        if flags.is_duplicate {
            let triggered = flight_recorder.trigger("duplicate_detected", Instant::now());
            counters.incidents = flight_recorder.incident_count();
            if triggered {
                metrics.record_incident();
            }
        }

        if flags.is_gap {
            let triggered = flight_recorder.trigger("sequence_gap", Instant::now());
            counters.incidents = flight_recorder.incident_count();
            if triggered {
                metrics.record_incident();
            }
        }

        if last_print.elapsed() >= PRINT_EVERY {
            tracing::info!(
                target: "mercurystream::forensics",
                processed = counters.processed,
                drift = counters.drift,
                duplicates = counters.duplicates,
                out_of_order = counters.out_of_order,
                gaps = counters.gaps,
                spikes = counters.spikes,
                incidents = counters.incidents,
                "forensics counters"
            );
            last_print = Instant::now();
        }
    }
}

fn persist_incident(incidents_dir: &std::path::Path, finalized: crate::flight_recorder::FinalizedIncident) {
    let incident_id = finalized.incident_id.clone();
    match write_bundle(incidents_dir, &finalized) {
        Ok(()) => tracing::info!(incident_id = %incident_id, events = finalized.events.len(), "incident saved"),
        Err(e) => tracing::error!(incident_id = %incident_id, error = %e, "failed to save incident"),
    }
}

/// Exposed for integration tests that want to drive the pipeline
/// without a live TCP connection: publish one event and run the
/// forensics checks inline (no counters, no periodic logging).
#[cfg(test)]
pub(crate) fn check_once(
    integrity_tracker: &mut IntegrityTracker,
    latency_detector: &mut LatencySpikeDetector,
    event: &Event,
) -> (crate::drift::DriftReport, crate::integrity::IntegrityFlags, bool) {
    let drift_report = check_schema_drift(event);
    let flags = integrity_tracker.check(event);
    let ingest_ts = event.get("ingest_ts_ms").and_then(|v| v.as_i64());
    let recv_ts = event.get("recv_ts_ms").and_then(|v| v.as_i64());
    let spiked = match (ingest_ts, recv_ts) {
        (Some(i), Some(r)) => latency_detector.add_sample(i, r),
        _ => false,
    };
    (drift_report, flags, spiked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::NoopMetricsSink;
    use serde_json::json;
    use std::sync::Arc;

    fn complete_event(ingest_ts: i64, recv_ts: i64) -> Event {
        match json!({
            "type": "ticker",
            "product_id": "BTC-USD",
            "price": 1.0,
            "last_size": 0.1,
            "time": "2024-01-01T00:00:00Z",
            "ingest_ts_ms": ingest_ts,
            "recv_ts_ms": recv_ts,
        }) {
            serde_json::Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn drift_free_event_produces_no_anomalies() {
        let mut tracker = IntegrityTracker::new(100);
        let mut detector = LatencySpikeDetector::new(3000, 100, 2);
        let (drift, flags, spiked) = check_once(&mut tracker, &mut detector, &complete_event(1, 5));
        assert!(!drift.is_drift());
        assert_eq!(flags, crate::integrity::IntegrityFlags::default());
        assert!(!spiked);
    }

    #[tokio::test]
    async fn run_processes_published_events_without_panicking() {
        let dir = tempfile::tempdir().unwrap();
        let bus = Bus::new();
        let config = Config {
            bind: "0.0.0.0:0".parse().unwrap(),
            record: false,
            record_file: dir.path().join("rec.jsonl"),
            forensics: true,
            drift_sample_file: dir.path().join("drift.jsonl"),
            incidents_dir: dir.path().join("incidents"),
            duplicate_lru_max: 100,
            latency_buffer_size: 200,
            latency_spike_threshold_ms: 100,
            latency_spike_consecutive: 2,
            flight_pre_events: 10,
            flight_post_events: 2,
            flight_cooldown_s: 60,
            log_level: "info".into(),
        };
        let metrics: Arc<dyn MetricsSink> = Arc::new(NoopMetricsSink);
        let handle = tokio::spawn(run(bus.clone(), config, metrics));
        for i in 0..5 {
            bus.publish(complete_event(i, i));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();
    }
}

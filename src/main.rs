//! Processor entry point: loads config, wires up the bus, the ingest
//! server, the optional raw-event recorder, the analytic consumers, and
//! the forensics consumer, then runs until interrupted.

use mercurystream::bus::Bus;
use mercurystream::config::Config;
use mercurystream::metrics::{InMemoryMetricsSink, MetricsSink};
use mercurystream::recorder::Recorder;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            // tracing isn't initialized yet at this point; this is the
            // one place the crate talks to stderr directly.
            eprintln!("FATAL: failed to load config: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind = %config.bind,
        "mercurystream processor starting"
    );

    let bus = Bus::new();
    let metrics: Arc<dyn MetricsSink> = Arc::new(InMemoryMetricsSink::new());

    let recorder = if config.record {
        let (recorder, _handle) = Recorder::spawn(config.record_file.clone());
        tracing::info!(file = %config.record_file.display(), "raw-event recording enabled");
        Some(recorder)
    } else {
        None
    };

    tokio::spawn(mercurystream::consumers::vwap(
        bus.clone(),
        200,
        Duration::from_secs(5),
    ));
    tokio::spawn(mercurystream::consumers::health(
        bus.clone(),
        Duration::from_secs(5),
    ));
    tokio::spawn(mercurystream::consumers::volatility(
        bus.clone(),
        100,
        Duration::from_secs(10),
    ));
    tokio::spawn(mercurystream::consumers::volume(
        bus.clone(),
        Duration::from_secs(10),
    ));
    tokio::spawn(queue_depth_updater(bus.clone(), metrics.clone()));

    if config.forensics {
        tracing::info!("forensics consumer enabled");
        tokio::spawn(mercurystream::forensics::run(
            bus.clone(),
            config.clone(),
            metrics.clone(),
        ));
    }

    let serve = mercurystream::ingest::serve(config.bind, bus, recorder);
    tokio::select! {
        result = serve => {
            if let Err(e) = result {
                tracing::error!(error = %e, "ingest server terminated");
                std::process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }
}

/// Periodically exports the bus's max queue depth and drop count to the
/// metrics façade, mirroring `processor.py::metrics_updater`. The bus
/// itself stays metrics-agnostic (spec.md §5: its drop counter is owned
/// solely by the publish loop), so drops are forwarded here as the
/// delta since the last tick rather than one `record_drop()` call per
/// eviction inline in `publish`.
async fn queue_depth_updater(bus: Bus, metrics: Arc<dyn MetricsSink>) {
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    let mut last_drops = 0u64;
    loop {
        interval.tick().await;
        metrics.set_queue_depth(bus.max_queue_depth());
        let total_drops = bus.drops();
        for _ in 0..total_drops.saturating_sub(last_drops) {
            metrics.record_drop();
        }
        last_drops = total_drops;
    }
}

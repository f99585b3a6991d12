//! Bounded, non-blocking JSON-lines writer for schema drift diagnoses
//! (spec.md §4.8), grounded in
//! `original_source/services/processor/forensics.py::DriftSampleWriter`.
//!
//! `submit` never blocks the forensics hot path: on a full outbound
//! queue the sample is silently dropped (spec.md §7 "Queue overflow
//! (drift sink): drop silently"). The background writer offloads file
//! I/O to a blocking thread, the Rust analogue of `asyncio.to_thread` in
//! the source.

use crate::drift::DriftReport;
use crate::event::Event;
use chrono::Utc;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const QUEUE_CAPACITY: usize = 1000;

/// One line of `DRIFT_SAMPLE_FILE`, matching spec.md §6's layout.
#[derive(serde::Serialize)]
struct DriftSample<'a> {
    ts: String,
    event: &'a Event,
    missing_keys: &'a [String],
    type_mismatches: &'a std::collections::BTreeMap<String, String>,
    unexpected_keys: &'a [String],
}

/// Handle held by the forensics consumer. Cloning is cheap, it's just
/// the sending half of the channel feeding the background writer.
#[derive(Clone)]
pub struct DriftSink {
    tx: mpsc::Sender<Vec<u8>>,
}

impl DriftSink {
    /// Spawn the background writer task and return a handle plus its
    /// `JoinHandle` (for tests that want to await a clean shutdown).
    pub fn spawn(path: PathBuf) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let handle = tokio::spawn(run_writer(path, rx));
        (DriftSink { tx }, handle)
    }

    /// Submit one drift diagnosis for append. Non-blocking: drops the
    /// sample silently if the outbound queue is full.
    pub fn submit(&self, event: &Event, report: &DriftReport) {
        let sample = DriftSample {
            ts: Utc::now().to_rfc3339(),
            event,
            missing_keys: &report.missing_keys,
            type_mismatches: &report.type_mismatches,
            unexpected_keys: &report.unexpected_keys,
        };
        let Ok(mut line) = serde_json::to_vec(&sample) else {
            return;
        };
        line.push(b'\n');
        // try_send: never await, never block the caller on backpressure.
        let _ = self.tx.try_send(line);
    }
}

async fn run_writer(path: PathBuf, mut rx: mpsc::Receiver<Vec<u8>>) {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }
    }

    let file = match tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await
    {
        Ok(f) => f,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "drift sink: failed to open file");
            return;
        }
    };
    let mut file = file.into_std().await;

    while let Some(line) = rx.recv().await {
        file = match tokio::task::spawn_blocking(move || {
            use std::io::Write;
            file.write_all(&line)?;
            file.flush()?;
            Ok::<_, std::io::Error>(file)
        })
        .await
        {
            Ok(Ok(f)) => f,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "drift sink: write failed");
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "drift sink: writer task panicked");
                return;
            }
        };
    }
}

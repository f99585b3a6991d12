//! Optional raw-event capture to disk (`RECORD`/`RECORD_FILE`, spec.md
//! §6/§4.4 step 4), grounded in
//! `original_source/services/processor/recorder.py::Recorder`.
//!
//! Bounded queue of 10,000; on overflow the event is dropped and a
//! warning logged once per drop (spec.md §7's "Queue overflow
//! (recorder): producer-side drop-silently (sink) / warn (recorder)"
//! row). Flushes every 200 pending writes or every second of wall-clock,
//! whichever comes first, exactly as the source's `_run` loop.

use crate::event::Event;
use std::io::BufWriter;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const QUEUE_CAPACITY: usize = 10_000;
const FLUSH_EVERY_PENDING: usize = 200;
const FLUSH_EVERY: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct Recorder {
    tx: mpsc::Sender<Vec<u8>>,
}

impl Recorder {
    pub fn spawn(path: PathBuf) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let handle = tokio::spawn(run_writer(path, rx));
        (Recorder { tx }, handle)
    }

    /// Record one raw event. Drops it and logs a warning if the
    /// outbound queue is full. Never blocks the ingest hot path.
    pub fn record(&self, event: &Event) {
        let Ok(mut line) = serde_json::to_vec(event) else {
            return;
        };
        line.push(b'\n');
        if self.tx.try_send(line).is_err() {
            tracing::warn!("recorder queue full, dropping event");
        }
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
            tracing::error!(path = %path.display(), error = %e, "recorder: failed to open file");
            return;
        }
    };
    let mut writer = BufWriter::with_capacity(1024 * 1024, file.into_std().await);
    let mut pending = 0usize;
    let mut last_flush = tokio::time::Instant::now();

    loop {
        let line = tokio::select! {
            maybe_line = rx.recv() => match maybe_line {
                Some(line) => line,
                None => break,
            },
            () = tokio::time::sleep(FLUSH_EVERY) => {
                if pending > 0 {
                    writer = flush(writer).await;
                    pending = 0;
                    last_flush = tokio::time::Instant::now();
                }
                continue;
            }
        };

        writer = match tokio::task::spawn_blocking(move || {
            use std::io::Write;
            writer.write_all(&line)?;
            Ok::<_, std::io::Error>(writer)
        })
        .await
        {
            Ok(Ok(w)) => w,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "recorder: write failed");
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "recorder: writer task panicked");
                return;
            }
        };
        pending += 1;

        if pending >= FLUSH_EVERY_PENDING || last_flush.elapsed() >= FLUSH_EVERY {
            writer = flush(writer).await;
            pending = 0;
            last_flush = tokio::time::Instant::now();
        }
    }

    let _ = flush(writer).await;
}

async fn flush(mut writer: BufWriter<std::fs::File>) -> BufWriter<std::fs::File> {
    match tokio::task::spawn_blocking(move || {
        use std::io::Write;
        let _ = writer.flush();
        writer
    })
    .await
    {
        Ok(w) => w,
        Err(e) => {
            tracing::error!(error = %e, "recorder: flush task panicked");
            std::process::abort();
        }
    }
}

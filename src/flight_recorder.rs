//! Pre/post incident "black box" (spec.md §4.9).
//!
//! States: `idle` (feeding the pre-event ring) -> `capturing` (appending
//! to the capture buffer, counting down post-events) -> finalize -> back
//! to `idle`. At most one capture in progress; a cooldown throttles how
//! often a new capture can start.

use crate::error::FlightRecorderError;
use crate::event::Event;
use chrono::Utc;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Instant;
use uuid::Uuid;

pub struct FlightRecorder {
    pre_events: usize,
    post_events: usize,
    cooldown_s: u64,
    incidents_dir: PathBuf,

    pre_ring: VecDeque<Event>,
    capture_buffer: Vec<Event>,
    capture_remaining: usize,
    capturing: bool,
    reason: String,
    last_incident_monotonic: Option<Instant>,
    incident_count: u64,
}

/// What a completed capture produced, handed to the caller for disk
/// persistence (kept separate from the in-memory state machine so
/// finalize's I/O can be awaited by an async caller without holding the
/// recorder borrowed across an `.await`).
pub struct FinalizedIncident {
    pub incident_id: String,
    pub reason: String,
    pub events: Vec<Event>,
    pub pre_events: usize,
    pub post_events: usize,
}

impl FlightRecorder {
    pub fn new(
        pre_events: usize,
        post_events: usize,
        cooldown_s: u64,
        incidents_dir: impl Into<PathBuf>,
    ) -> Self {
        FlightRecorder {
            pre_events,
            post_events,
            cooldown_s,
            incidents_dir: incidents_dir.into(),
            pre_ring: VecDeque::with_capacity(pre_events.min(4096)),
            capture_buffer: Vec::new(),
            capture_remaining: 0,
            capturing: false,
            reason: String::new(),
            last_incident_monotonic: None,
            incident_count: 0,
        }
    }

    pub fn incident_count(&self) -> u64 {
        self.incident_count
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing
    }

    /// Feed one event into the recorder. If a capture just completed,
    /// returns the finalized incident for the caller to persist.
    pub fn record(&mut self, event: Event) -> Option<FinalizedIncident> {
        if self.capturing {
            self.capture_buffer.push(event);
            self.capture_remaining = self.capture_remaining.saturating_sub(1);
            if self.capture_remaining == 0 {
                return Some(self.finalize());
            }
            None
        } else {
            if self.pre_ring.len() >= self.pre_events {
                self.pre_ring.pop_front();
            }
            self.pre_ring.push_back(event);
            None
        }
    }

    /// Attempt to start a capture. Returns `false` if already capturing
    /// or the cooldown hasn't elapsed since the last capture started.
    pub fn trigger(&mut self, reason: impl Into<String>, now: Instant) -> bool {
        if self.capturing {
            return false;
        }
        if let Some(last) = self.last_incident_monotonic {
            if now.duration_since(last).as_secs() < self.cooldown_s {
                return false;
            }
        }

        self.capture_buffer = self.pre_ring.drain(..).collect();
        self.capture_remaining = self.post_events;
        self.capturing = true;
        self.reason = reason.into();
        self.last_incident_monotonic = Some(now);
        true
    }

    fn finalize(&mut self) -> FinalizedIncident {
        // pre_events actually captured = everything except the
        // post_events worth appended during the active capture window.
        let total = self.capture_buffer.len();
        let post_captured = self.post_events.min(total);

        let incident_id = format!(
            "{}_{}",
            Utc::now().format("%Y%m%d_%H%M%S"),
            &Uuid::new_v4().simple().to_string()[..8]
        );

        let finalized = FinalizedIncident {
            incident_id,
            reason: std::mem::take(&mut self.reason),
            events: std::mem::take(&mut self.capture_buffer),
            pre_events: total - post_captured,
            post_events: post_captured,
        };

        self.incident_count += 1;
        self.capturing = false;
        self.pre_ring.clear();

        finalized
    }
}

impl FinalizedIncident {
    /// Directory name for this incident's bundle, relative to
    /// `INCIDENTS_DIR`: `<incident_id>/`.
    pub fn bundle_dir(&self, incidents_dir: &Path) -> PathBuf {
        incidents_dir.join(&self.incident_id)
    }
}

/// Write `incident`'s bundle (`events.jsonl` + `meta.json`) under
/// `incidents_dir/<incident_id>/`. Blocking I/O, call from a
/// `spawn_blocking` context, not the forensics hot path.
pub fn write_bundle(
    incidents_dir: &Path,
    incident: &FinalizedIncident,
) -> Result<(), FlightRecorderError> {
    use std::io::Write;

    let dir = incident.bundle_dir(incidents_dir);
    std::fs::create_dir_all(&dir)?;

    let mut events_file = std::fs::File::create(dir.join("events.jsonl"))?;
    for event in &incident.events {
        serde_json::to_writer(&mut events_file, event)?;
        events_file.write_all(b"\n")?;
    }
    events_file.flush()?;

    let total_events = incident.events.len();
    let meta = serde_json::json!({
        "incident_id": incident.incident_id,
        "reason": incident.reason,
        "timestamp": Utc::now().to_rfc3339(),
        "pre_events": incident.pre_events,
        "post_events": incident.post_events,
        "total_events": total_events,
    });
    std::fs::write(dir.join("meta.json"), serde_json::to_string_pretty(&meta)?)?;

    Ok(())
}

//! spec.md §8 scenario 4 and §6's incident bundle layout, exercised
//! end-to-end through `write_bundle` rather than just the in-memory
//! `FinalizedIncident`.

use mercurystream::flight_recorder::{write_bundle, FlightRecorder};
use serde_json::json;
use std::time::{Duration, Instant};

fn ev(tag: &str) -> mercurystream::event::Event {
    match json!({"tag": tag}) {
        serde_json::Value::Object(m) => m,
        _ => unreachable!(),
    }
}

#[test]
fn pre_post_bundle_persists_expected_events_and_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let incidents_dir = dir.path().join("incidents");
    let mut recorder = FlightRecorder::new(3, 2, 60, &incidents_dir);

    recorder.record(ev("e1"));
    recorder.record(ev("e2"));
    recorder.record(ev("e3"));
    recorder.record(ev("e4"));
    assert!(recorder.trigger("latency_spike_p99=250ms", Instant::now()));
    recorder.record(ev("e5"));
    let finalized = recorder.record(ev("e6")).expect("capture completes");

    write_bundle(&incidents_dir, &finalized).unwrap();

    let bundle_dir = incidents_dir.join(&finalized.incident_id);
    let events_jsonl = std::fs::read_to_string(bundle_dir.join("events.jsonl")).unwrap();
    let tags: Vec<String> = events_jsonl
        .lines()
        .map(|line| {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            value["tag"].as_str().unwrap().to_owned()
        })
        .collect();
    assert_eq!(tags, vec!["e2", "e3", "e4", "e5", "e6"]);

    let meta: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(bundle_dir.join("meta.json")).unwrap())
            .unwrap();
    assert_eq!(meta["pre_events"], 3);
    assert_eq!(meta["post_events"], 2);
    assert_eq!(meta["total_events"], 5);
    assert_eq!(meta["reason"], "latency_spike_p99=250ms");
    assert!(meta["incident_id"].as_str().is_some());
    assert!(meta["timestamp"].as_str().is_some());
}

#[test]
fn cooldown_scenario_five_from_spec() {
    let dir = tempfile::tempdir().unwrap();
    let mut recorder = FlightRecorder::new(1, 1, 60, dir.path());
    let t0 = Instant::now();

    assert!(recorder.trigger("x", t0));
    recorder.record(ev("post")); // finalizes immediately (post_events=1)

    assert!(!recorder.trigger("x", t0 + Duration::from_secs(30)));
    assert!(recorder.trigger("x", t0 + Duration::from_secs(61)));
}

#[test]
fn each_incident_gets_its_own_directory() {
    let dir = tempfile::tempdir().unwrap();
    let incidents_dir = dir.path().join("incidents");
    let mut recorder = FlightRecorder::new(1, 1, 0, &incidents_dir);

    recorder.trigger("first", Instant::now());
    let first = recorder.record(ev("a")).unwrap();
    write_bundle(&incidents_dir, &first).unwrap();

    recorder.trigger("second", Instant::now());
    let second = recorder.record(ev("b")).unwrap();
    write_bundle(&incidents_dir, &second).unwrap();

    assert_ne!(first.incident_id, second.incident_id);
    assert!(incidents_dir.join(&first.incident_id).is_dir());
    assert!(incidents_dir.join(&second.incident_id).is_dir());
}

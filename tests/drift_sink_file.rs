//! spec.md §6's drift-sample file layout, exercised against a real
//! file on disk rather than just the in-process `DriftSink` unit tests.

use mercurystream::drift::check_schema_drift;
use mercurystream::drift_sink::DriftSink;
use serde_json::json;
use std::time::Duration;

fn ev(product_id: &str, extra: serde_json::Value) -> mercurystream::event::Event {
    let mut value = json!({"product_id": product_id});
    if let (serde_json::Value::Object(base), serde_json::Value::Object(extra)) =
        (&mut value, extra)
    {
        base.extend(extra);
    }
    match value {
        serde_json::Value::Object(m) => m,
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn drift_sample_lines_carry_the_event_and_the_full_diagnosis() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("drift_samples.jsonl");
    let (sink, handle) = DriftSink::spawn(path.clone());

    // Missing required keys, plus one unexpected key.
    let event = ev("BTC-USD", json!({"weird_extra": 1}));
    let report = check_schema_drift(&event);
    assert!(report.is_drift());
    sink.submit(&event, &report);

    drop(sink);
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 1);

    let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert!(parsed["ts"].as_str().is_some());
    assert_eq!(parsed["event"]["product_id"], "BTC-USD");
    let missing: Vec<&str> = parsed["missing_keys"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert!(missing.contains(&"type"));
    assert!(missing.contains(&"time"));
    assert_eq!(parsed["unexpected_keys"][0], "weird_extra");
    assert!(parsed["type_mismatches"].as_object().unwrap().is_empty());
}

#[tokio::test]
async fn type_mismatch_is_recorded_with_expected_and_runtime_type() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("drift_samples.jsonl");
    let (sink, handle) = DriftSink::spawn(path.clone());

    let event = ev(
        "BTC-USD",
        json!({"type": "ticker", "time": "2024-01-01T00:00:00Z", "price": "not-a-number"}),
    );
    let report = check_schema_drift(&event);
    assert!(report.type_mismatches.contains_key("price"));
    sink.submit(&event, &report);

    drop(sink);
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
    let mismatch = parsed["type_mismatches"]["price"].as_str().unwrap();
    assert!(mismatch.contains("str"), "got: {mismatch}");
}

#[tokio::test]
async fn multiple_submissions_append_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("drift_samples.jsonl");
    let (sink, handle) = DriftSink::spawn(path.clone());

    for i in 0..5 {
        let event = ev(&format!("SYM-{i}"), json!({}));
        let report = check_schema_drift(&event);
        sink.submit(&event, &report);
    }

    drop(sink);
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    let product_ids: Vec<String> = contents
        .lines()
        .map(|line| {
            let v: serde_json::Value = serde_json::from_str(line).unwrap();
            v["event"]["product_id"].as_str().unwrap().to_owned()
        })
        .collect();
    assert_eq!(
        product_ids,
        vec!["SYM-0", "SYM-1", "SYM-2", "SYM-3", "SYM-4"]
    );
}

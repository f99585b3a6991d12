//! The wire event is a free-form JSON object; forensics needs to see every
//! key it carries (including ones it doesn't recognize), so this crate
//! never deserializes into a fixed struct up front.
//!
//! # Required keys
//! `type`, `product_id`, `price`, `last_size`, `time`, `ingest_ts_ms`.
//!
//! # Optional recognized keys
//! `recv_ts_ms`, `trade_id`, `sequence`. Anything else is tolerated on the
//! wire but reported by the drift checker as unexpected.

use serde_json::{Map, Value};

/// A decoded event: an unordered string-keyed mapping of heterogeneous
/// JSON values.
pub type Event = Map<String, Value>;

pub const REQUIRED_KEYS: &[&str] = &["type", "product_id", "price", "last_size", "time", "ingest_ts_ms"];
pub const OPTIONAL_KEYS: &[&str] = &["recv_ts_ms", "trade_id", "sequence"];

/// Parse a frame payload as a JSON object. Returns `None` for malformed
/// JSON or a non-object top-level value.
pub fn parse(payload: &[u8]) -> Option<Event> {
    match serde_json::from_slice::<Value>(payload) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Read a string-valued field.
pub fn get_str<'a>(event: &'a Event, key: &str) -> Option<&'a str> {
    event.get(key)?.as_str()
}

/// Read a field expected to be an integer (ms-since-epoch style fields).
pub fn get_i64(event: &Event, key: &str) -> Option<i64> {
    event.get(key)?.as_i64()
}

/// `product_id`, defaulting to `"unknown"` when absent, matching the
/// integrity tracker's partition key rule.
pub fn product_id(event: &Event) -> &str {
    get_str(event, "product_id").unwrap_or("unknown")
}

/// Whether a JSON value's runtime type matches one of `type`/`product_id`/
/// `time` (single string type) vs `price`/`last_size` (int or float) vs
/// `ingest_ts_ms` (integer only).
pub fn matches_expected_type(key: &str, value: &Value) -> bool {
    match key {
        "price" | "last_size" => value.is_number(),
        "ingest_ts_ms" => value.is_i64() || value.is_u64(),
        "type" | "product_id" | "time" => value.is_string(),
        _ => true,
    }
}

/// Human-readable runtime type name, used in drift diagnosis messages.
pub fn runtime_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_i64() || n.is_u64() => "int",
        Value::Number(_) => "float",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

/// Human-readable expected-type label for a required key, used in
/// `type_mismatches` diagnosis messages (spec.md §8 scenario 6).
pub fn expected_type_label(key: &str) -> &'static str {
    match key {
        "price" | "last_size" => "(int, float)",
        "ingest_ts_ms" => "int",
        _ => "str",
    }
}

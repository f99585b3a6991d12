//! Per-symbol duplicate / out-of-order / gap detection.
//!
//! One [`IntegrityTracker`] is shared by the whole stream; it keeps a
//! [`SymbolState`] per `product_id`, created lazily and kept for the life
//! of the process (spec.md §3).

use crate::event::{self, Event};
use crate::lru_set::LruSet;
use chrono::DateTime;
use std::collections::HashMap;

struct SymbolState {
    last_exchange_ts_ms: i64,
    last_sequence: Option<i64>,
    trade_ids: LruSet<String>,
}

impl SymbolState {
    fn new(duplicate_lru_max: usize) -> Self {
        SymbolState {
            last_exchange_ts_ms: 0,
            last_sequence: None,
            trade_ids: LruSet::new(duplicate_lru_max),
        }
    }
}

/// Outcome of checking a single event against its symbol's tracked state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IntegrityFlags {
    pub is_duplicate: bool,
    pub is_out_of_order: bool,
    pub is_gap: bool,
}

pub struct IntegrityTracker {
    duplicate_lru_max: usize,
    symbols: HashMap<String, SymbolState>,
}

impl IntegrityTracker {
    pub fn new(duplicate_lru_max: usize) -> Self {
        IntegrityTracker {
            duplicate_lru_max,
            symbols: HashMap::new(),
        }
    }

    /// Check `event` against its `product_id`'s tracked state, updating
    /// that state in place.
    pub fn check(&mut self, event: &Event) -> IntegrityFlags {
        let symbol = event::product_id(event).to_owned();
        let duplicate_lru_max = self.duplicate_lru_max;
        let state = self
            .symbols
            .entry(symbol)
            .or_insert_with(|| SymbolState::new(duplicate_lru_max));

        let mut flags = IntegrityFlags::default();

        if let Some(trade_id) = event.get("trade_id") {
            let key = trade_id_key(trade_id);
            if state.trade_ids.contains(&key) {
                flags.is_duplicate = true;
            } else {
                state.trade_ids.add(key);
            }
        }

        if let Some(time) = event::get_str(event, "time") {
            if let Some(ts_ms) = parse_exchange_ts_ms(time) {
                if state.last_exchange_ts_ms > 0 && ts_ms < state.last_exchange_ts_ms {
                    flags.is_out_of_order = true;
                }
                state.last_exchange_ts_ms = state.last_exchange_ts_ms.max(ts_ms);
            }
        }

        if let Some(sequence) = event::get_i64(event, "sequence") {
            if let Some(last_sequence) = state.last_sequence {
                if sequence > last_sequence + 1 {
                    flags.is_gap = true;
                }
            }
            state.last_sequence = Some(sequence);
        }

        flags
    }
}

/// Canonical dedup key for an opaque `trade_id` value: strings and
/// numbers with the same textual form collide, matching how the source
/// uses whatever hashable value the wire sends as a dict/set key.
fn trade_id_key(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse an ISO-8601/RFC3339 `time` string (trailing `Z` permitted) into
/// milliseconds since the Unix epoch. Returns `None` for anything
/// malformed, per spec.md §4.6's "silently ignored" rule.
fn parse_exchange_ts_ms(time: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(time)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ev(product_id: &str, fields: serde_json::Value) -> Event {
        let mut map = match fields {
            serde_json::Value::Object(m) => m,
            _ => unreachable!(),
        };
        map.insert("product_id".into(), json!(product_id));
        map
    }

    #[test]
    fn first_event_for_a_symbol_has_no_flags() {
        let mut tracker = IntegrityTracker::new(100);
        let flags = tracker.check(&ev("BTC-USD", json!({"time": "2024-01-01T00:00:00Z"})));
        assert_eq!(flags, IntegrityFlags::default());
    }

    #[test]
    fn duplicate_trade_id_detected_on_second_occurrence() {
        let mut tracker = IntegrityTracker::new(100);
        let first = tracker.check(&ev("BTC-USD", json!({"trade_id": 1})));
        let second = tracker.check(&ev("BTC-USD", json!({"trade_id": 1})));
        assert!(!first.is_duplicate);
        assert!(second.is_duplicate);
    }

    #[test]
    fn missing_trade_id_never_counts_as_duplicate() {
        let mut tracker = IntegrityTracker::new(100);
        let first = tracker.check(&ev("BTC-USD", json!({})));
        let second = tracker.check(&ev("BTC-USD", json!({})));
        assert!(!first.is_duplicate);
        assert!(!second.is_duplicate);
    }

    #[test]
    fn out_of_order_detected_on_earlier_timestamp() {
        let mut tracker = IntegrityTracker::new(100);
        let first = tracker.check(&ev("BTC-USD", json!({"time": "2024-01-01T00:00:10Z"})));
        let second = tracker.check(&ev("BTC-USD", json!({"time": "2024-01-01T00:00:05Z"})));
        assert!(!first.is_out_of_order);
        assert!(second.is_out_of_order);
    }

    #[test]
    fn malformed_time_is_silently_ignored() {
        let mut tracker = IntegrityTracker::new(100);
        let flags = tracker.check(&ev("BTC-USD", json!({"time": "not-a-timestamp"})));
        assert!(!flags.is_out_of_order);
    }

    #[test]
    fn gap_detected_when_sequence_jumps_by_more_than_one() {
        let mut tracker = IntegrityTracker::new(100);
        tracker.check(&ev("BTC-USD", json!({"sequence": 11})));
        let flags = tracker.check(&ev("BTC-USD", json!({"sequence": 13})));
        assert!(flags.is_gap);
    }

    #[test]
    fn equal_sequence_is_not_a_gap() {
        let mut tracker = IntegrityTracker::new(100);
        tracker.check(&ev("BTC-USD", json!({"sequence": 13})));
        let flags = tracker.check(&ev("BTC-USD", json!({"sequence": 13})));
        assert!(!flags.is_gap);
    }

    #[test]
    fn regressing_sequence_is_not_a_gap() {
        let mut tracker = IntegrityTracker::new(100);
        tracker.check(&ev("BTC-USD", json!({"sequence": 13})));
        let flags = tracker.check(&ev("BTC-USD", json!({"sequence": 5})));
        assert!(!flags.is_gap);
    }

    /// spec.md §8 scenario 2: sequence 10, 11, 13 (trade_ids 1,2,3), then
    /// 13 again (trade_id 3). Third event: gap from 11->13, no duplicate.
    /// Fourth event: duplicate trade_id, equal sequence is not a gap.
    #[test]
    fn duplicate_and_gap_scenario_from_spec() {
        let mut tracker = IntegrityTracker::new(100);
        tracker.check(&ev("BTC-USD", json!({"sequence": 10, "trade_id": 1})));
        tracker.check(&ev("BTC-USD", json!({"sequence": 11, "trade_id": 2})));
        let ev3 = tracker.check(&ev("BTC-USD", json!({"sequence": 13, "trade_id": 3})));
        let ev4 = tracker.check(&ev("BTC-USD", json!({"sequence": 13, "trade_id": 3})));

        assert_eq!(
            ev3,
            IntegrityFlags {
                is_duplicate: false,
                is_out_of_order: false,
                is_gap: true,
            }
        );
        assert_eq!(
            ev4,
            IntegrityFlags {
                is_duplicate: true,
                is_out_of_order: false,
                is_gap: false,
            }
        );
    }

    #[test]
    fn symbols_are_tracked_independently() {
        let mut tracker = IntegrityTracker::new(100);
        tracker.check(&ev("BTC-USD", json!({"sequence": 100})));
        let flags = tracker.check(&ev("ETH-USD", json!({"sequence": 1})));
        assert!(!flags.is_gap);
    }

    #[test]
    fn trade_id_lru_bounded_by_duplicate_lru_max() {
        let mut tracker = IntegrityTracker::new(4);
        for id in 0..10 {
            tracker.check(&ev("BTC-USD", json!({"trade_id": id})));
        }
        // id 0 has long since been evicted, so it's "new" again.
        let flags = tracker.check(&ev("BTC-USD", json!({"trade_id": 0})));
        assert!(!flags.is_duplicate);
    }
}

//! Stateless schema drift checker.
//!
//! Every call is independent of every other, no tracker state, just a
//! pure function of one event against the fixed key schema in
//! [`event::REQUIRED_KEYS`]/[`event::OPTIONAL_KEYS`].

use crate::event::{self, Event, OPTIONAL_KEYS, REQUIRED_KEYS};
use std::collections::BTreeMap;

/// Result of checking one event against the required/optional key schema.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DriftReport {
    pub missing_keys: Vec<String>,
    /// Required key -> human-readable mismatch reason.
    pub type_mismatches: BTreeMap<String, String>,
    pub unexpected_keys: Vec<String>,
}

impl DriftReport {
    /// True iff any required key is missing or type-mismatched.
    /// Unexpected keys alone never count as drift.
    pub fn is_drift(&self) -> bool {
        !self.missing_keys.is_empty() || !self.type_mismatches.is_empty()
    }
}

pub fn check_schema_drift(event: &Event) -> DriftReport {
    let mut report = DriftReport::default();

    for &key in REQUIRED_KEYS {
        match event.get(key) {
            None => report.missing_keys.push(key.to_string()),
            Some(value) => {
                if !event::matches_expected_type(key, value) {
                    let reason = format!(
                        "expected {}, got {}",
                        event::expected_type_label(key),
                        event::runtime_type_name(value)
                    );
                    report.type_mismatches.insert(key.to_string(), reason);
                }
            }
        }
    }

    for key in event.keys() {
        if !REQUIRED_KEYS.contains(&key.as_str()) && !OPTIONAL_KEYS.contains(&key.as_str()) {
            report.unexpected_keys.push(key.clone());
        }
    }

    report
}

//! Startup configuration, read once from the environment into an
//! immutable [`Config`] and threaded explicitly into every component
//! that needs it (Design Note §9: "do not re-read env inside hot
//! paths").
//!
//! Grounded on `services/forwarder::config`'s `Raw*`/typed split, with
//! the TOML document replaced by `std::env::var` + `.parse()`. spec.md
//! §6 specifies environment variables as the sole configuration surface
//! for this component, not a file.

use crate::error::ConfigError;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Fully resolved, validated startup configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: SocketAddr,
    pub record: bool,
    pub record_file: PathBuf,
    pub forensics: bool,
    pub drift_sample_file: PathBuf,
    pub incidents_dir: PathBuf,
    pub duplicate_lru_max: usize,
    pub latency_buffer_size: usize,
    pub latency_spike_threshold_ms: u32,
    pub latency_spike_consecutive: u32,
    pub flight_pre_events: usize,
    pub flight_post_events: usize,
    pub flight_cooldown_s: u64,
    pub log_level: String,
}

impl Config {
    /// Load configuration from the process environment, applying the
    /// defaults in spec.md §6's table.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env_or("HOST", "0.0.0.0");
        let port = env_or("PORT", "9001");
        let bind_str = format!("{host}:{port}");
        let bind = bind_str.parse().map_err(|e| ConfigError::InvalidValue {
            var: "HOST/PORT",
            reason: format!("'{bind_str}' is not a valid socket address: {e}"),
        })?;

        Ok(Config {
            bind,
            record: env_bool("RECORD", false)?,
            record_file: PathBuf::from(env_or("RECORD_FILE", "data/btcusd.jsonl")),
            forensics: env_bool("FORENSICS", true)?,
            drift_sample_file: PathBuf::from(env_or(
                "DRIFT_SAMPLE_FILE",
                "data/drift_samples.jsonl",
            )),
            incidents_dir: PathBuf::from(env_or("INCIDENTS_DIR", "data/incidents")),
            duplicate_lru_max: env_parse("DUPLICATE_LRU_MAX", 50_000)?,
            latency_buffer_size: env_parse("LATENCY_BUFFER_SIZE", 3_000)?,
            latency_spike_threshold_ms: env_parse("LATENCY_SPIKE_THRESHOLD_MS", 100)?,
            latency_spike_consecutive: env_parse("LATENCY_SPIKE_CONSECUTIVE", 2)?,
            flight_pre_events: env_parse("FLIGHT_PRE_EVENTS", 5_000)?,
            flight_post_events: env_parse("FLIGHT_POST_EVENTS", 2_000)?,
            flight_cooldown_s: env_parse("FLIGHT_COOLDOWN_S", 60)?,
            log_level: env_or("LOG_LEVEL", "info"),
        })
    }
}

fn env_or(var: &'static str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_owned())
}

fn env_parse<T>(var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(var) {
        Err(_) => Ok(default),
        Ok(raw) => raw.parse().map_err(|e| ConfigError::InvalidValue {
            var,
            reason: format!("'{raw}' is not valid: {e}"),
        }),
    }
}

fn env_bool(var: &'static str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(var) {
        Err(_) => Ok(default),
        Ok(raw) => match raw.to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                var,
                reason: format!("'{raw}' is not a recognized boolean"),
            }),
        },
    }
}

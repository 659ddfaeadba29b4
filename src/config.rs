use std::{env, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Two leaves share a pod when their spine sets overlap by more than this
/// fraction of the smaller set.
pub const DEFAULT_POD_OVERLAP_THRESHOLD: f64 = 0.5;
/// A default-route signature is the fabric default when held by more than
/// this fraction of the leaves carrying the VRF.
pub const DEFAULT_BORDER_MAJORITY_THRESHOLD: f64 = 0.5;
/// A device seeds the leaf tier when more than this fraction of its
/// neighbours are non-fabric endpoints.
pub const DEFAULT_ENDPOINT_MAJORITY_THRESHOLD: f64 = 0.5;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// EngineConfig holds every tunable threshold of the inference engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub pod_overlap_threshold: f64,
    pub border_majority_threshold: f64,
    pub endpoint_majority_threshold: f64,
    /// Hostname globs (`*` wildcard) naming non-fabric hosts.
    pub endpoint_hints: Vec<String>,
    #[serde(with = "humantime_serde_compat")]
    pub poll_interval: Duration,
    pub snapshot_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pod_overlap_threshold: DEFAULT_POD_OVERLAP_THRESHOLD,
            border_majority_threshold: DEFAULT_BORDER_MAJORITY_THRESHOLD,
            endpoint_majority_threshold: DEFAULT_ENDPOINT_MAJORITY_THRESHOLD,
            endpoint_hints: Vec::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            snapshot_path: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults
    pub fn load() -> Self {
        Self {
            pod_overlap_threshold: get_env_f64("FABRIC_POD_OVERLAP", DEFAULT_POD_OVERLAP_THRESHOLD),
            border_majority_threshold: get_env_f64(
                "FABRIC_BORDER_MAJORITY",
                DEFAULT_BORDER_MAJORITY_THRESHOLD,
            ),
            endpoint_majority_threshold: get_env_f64(
                "FABRIC_ENDPOINT_MAJORITY",
                DEFAULT_ENDPOINT_MAJORITY_THRESHOLD,
            ),
            endpoint_hints: env::var("FABRIC_ENDPOINT_HINTS")
                .map(|raw| parse_hint_list(&raw))
                .unwrap_or_default(),
            poll_interval: env::var("FABRIC_POLL_INTERVAL")
                .ok()
                .and_then(|raw| match humantime::parse_duration(&raw) {
                    Ok(interval) => Some(interval),
                    Err(e) => {
                        tracing::warn!("Ignoring FABRIC_POLL_INTERVAL '{}': {}", raw, e);
                        None
                    }
                })
                .unwrap_or(DEFAULT_POLL_INTERVAL),
            snapshot_path: env::var("FABRIC_SNAPSHOT_PATH").ok().map(PathBuf::from),
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        for (name, value) in [
            ("pod_overlap_threshold", self.pod_overlap_threshold),
            ("border_majority_threshold", self.border_majority_threshold),
            ("endpoint_majority_threshold", self.endpoint_majority_threshold),
        ] {
            if !(0.0..1.0).contains(&value) {
                return Err(EngineError::Config(format!(
                    "{name} must be in [0, 1), got {value}"
                )));
            }
        }
        if self.poll_interval.is_zero() {
            return Err(EngineError::Config("poll_interval must be non-zero".to_string()));
        }
        Ok(())
    }
}

fn get_env_f64(key: &str, default: f64) -> f64 {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring {}='{}': not a number, using {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}

fn parse_hint_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|hint| !hint.is_empty())
        .map(str::to_string)
        .collect()
}

/// Serde adapter writing durations in humantime notation ("60s", "5m").
mod humantime_serde_compat {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

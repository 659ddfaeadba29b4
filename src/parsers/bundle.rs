/*!
The collector's per-generation bundle: the LLDP feed, every device snapshot and
optional endpoint hints in one JSON document.

Only the envelope is strict. A malformed LLDP row is skipped and recorded in
`SnapshotBundle::skipped_lldp`, and a device body
that fails to parse is recorded in `SnapshotBundle::missing` so the graph builder
can degrade that device alone.
*/

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::SystemTime,
};

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::{
    network::forwarding::DeviceSnapshot,
    parsers::{lldp::LldpNeighbor, snapshot::JsonDeviceSnapshot},
};

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Failed to read snapshot bundle {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed snapshot bundle: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct JsonBundle {
    #[serde(default)]
    generation: Option<u64>,
    #[serde(default, alias = "collectedAt")]
    collected_at: Option<String>,
    #[serde(default)]
    lldp: Vec<Value>,
    #[serde(default)]
    devices: BTreeMap<String, Value>,
    #[serde(default, alias = "endpointHints")]
    endpoint_hints: Vec<String>,
}

/// One atomically published set of collector outputs, already parsed into strong types.
#[derive(Debug, Clone, Default)]
pub struct SnapshotBundle {
    pub generation: Option<u64>,
    pub collected_at: Option<SystemTime>,
    pub lldp: Vec<LldpNeighbor>,
    /// LLDP rows that could not be parsed: row index in the feed and the reason.
    pub skipped_lldp: BTreeMap<usize, String>,
    pub snapshots: BTreeMap<String, DeviceSnapshot>,
    /// Devices named by the collector whose snapshot was absent or unusable, with the reason.
    pub missing: BTreeMap<String, String>,
    pub endpoint_hints: Vec<String>,
}

impl SnapshotBundle {
    pub fn from_json_str(raw: &str) -> Result<Self, SnapshotError> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, SnapshotError> {
        let json: JsonBundle = serde_json::from_value(value)?;

        let collected_at = json.collected_at.as_deref().and_then(|raw| {
            humantime::parse_rfc3339_weak(raw)
                .map_err(|e| tracing::warn!("Ignoring collected_at {:?}: {}", raw, e))
                .ok()
        });

        let mut lldp = Vec::with_capacity(json.lldp.len());
        let mut skipped_lldp = BTreeMap::new();
        for (index, row) in json.lldp.into_iter().enumerate() {
            match LldpNeighbor::from_value(row) {
                Ok(neighbor) => lldp.push(neighbor),
                Err(e) => {
                    tracing::warn!("Skipping LLDP row {}: {}", index, e);
                    skipped_lldp.insert(index, e.to_string());
                }
            }
        }

        let mut snapshots = BTreeMap::new();
        let mut missing = BTreeMap::new();
        for (hostname, body) in json.devices {
            if body.is_null() {
                missing.insert(hostname, "no snapshot collected".to_string());
                continue;
            }
            let parsed = JsonDeviceSnapshot::from_value(body).and_then(|json| json.try_into_snapshot(&hostname));
            match parsed {
                Ok(snapshot) => {
                    snapshots.insert(hostname, snapshot);
                }
                Err(e) => {
                    tracing::warn!("Snapshot of {} is unusable: {}", hostname, e);
                    missing.insert(hostname, e.to_string());
                }
            }
        }

        Ok(SnapshotBundle {
            generation: json.generation,
            collected_at,
            lldp,
            skipped_lldp,
            snapshots,
            missing,
            endpoint_hints: json.endpoint_hints,
        })
    }

    pub async fn load(path: &Path) -> Result<Self, SnapshotError> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Every hostname the collector knows about, whether or not its snapshot was usable.
    pub fn collected_devices(&self) -> impl Iterator<Item = &str> {
        self.snapshots
            .keys()
            .chain(self.missing.keys())
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_fixture_parses() {
        let bundle = SnapshotBundle::from_json_str(include_str!("../../test_data/fabric_snapshot.json")).unwrap();
        assert_eq!(bundle.generation, Some(7));
        assert!(bundle.collected_at.is_some());
        assert!(bundle.snapshots.contains_key("leaf-a"));
        assert!(bundle.snapshots.contains_key("border-1"));
        assert!(bundle.missing.is_empty());
        assert!(!bundle.lldp.is_empty());
    }

    #[test]
    fn test_bad_rows_and_bodies_are_isolated() {
        let bundle = SnapshotBundle::from_value(json!({
            "lldp": [
                {"device": "leaf-a", "local_iface": "swp1", "remote_device": "spine-1", "remote_iface": "swp1"},
                {"device": "leaf-a"}
            ],
            "devices": {
                "leaf-a": {"loopbacks": ["10.0.0.1"]},
                "leaf-b": {"loopbacks": ["not-an-ip"]},
                "spine-1": null
            }
        }))
        .unwrap();
        assert_eq!(bundle.lldp.len(), 1);
        assert_eq!(bundle.skipped_lldp.keys().copied().collect::<Vec<_>>(), vec![1]);
        assert!(bundle.skipped_lldp[&1].starts_with("Bad LLDP row"), "{}", bundle.skipped_lldp[&1]);
        assert_eq!(bundle.snapshots.len(), 1);
        assert!(bundle.missing["leaf-b"].contains("not-an-ip"));
        assert_eq!(bundle.missing["spine-1"], "no snapshot collected");
        assert_eq!(bundle.collected_devices().count(), 3);
    }

    #[test]
    fn test_broken_envelope_is_fatal() {
        assert!(matches!(
            SnapshotBundle::from_json_str("{\"lldp\": 5}"),
            Err(SnapshotError::Malformed(_))
        ));
        assert!(SnapshotBundle::from_json_str("not json").is_err());
    }

    #[tokio::test]
    async fn test_load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = SnapshotBundle::load(&dir.path().join("absent.json")).await;
        assert!(matches!(result, Err(SnapshotError::Io { .. })));
    }
}

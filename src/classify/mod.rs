/*!
Structural classification of a topology graph.

This module defines:
- `tier`: leaf/spine/core layering by BFS from seed leaves.
- `pod`: leaf grouping by shared spine majority.
- `border`: per-VRF border leaves by default-route signature majority.
- `Classification`: the per-generation result, and `ClassificationReport`, its
  serialisable view for callers.

Stages run in that order because pods need tiers and borders need leaves.
*/

pub mod border;
pub mod pod;
pub mod tier;

use std::{
    collections::{BTreeMap, BTreeSet},
    net::IpAddr,
};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::EngineConfig,
    error::Warning,
    network::{
        device::{Device, PodId, Tier},
        forwarding::DeviceSnapshot,
        link::Link,
        network_graph::TopologyGraph,
    },
};

pub use border::VrfBorders;
pub use pod::Pod;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub pods: Vec<Pod>,
    pub borders: BTreeMap<String, VrfBorders>,
}

impl Classification {
    pub fn pod(&self, id: PodId) -> Option<&Pod> {
        self.pods.iter().find(|pod| pod.id == id)
    }

    /// Border leaves of a VRF, sorted.
    pub fn borders_of(&self, vrf: &str) -> Vec<&str> {
        self.borders
            .get(vrf)
            .map(|b| b.borders.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn external_gateways(&self, vrf: &str, border: &str) -> Vec<IpAddr> {
        self.borders
            .get(vrf)
            .map(|b| b.external_gateways(border).to_vec())
            .unwrap_or_default()
    }
}

/// Runs every classification stage over `graph`, filling in device tiers, pods and border flags.
pub fn classify(
    graph: &mut TopologyGraph,
    snapshots: &BTreeMap<String, DeviceSnapshot>,
    config: &EngineConfig,
) -> (Classification, Vec<Warning>) {
    let mut warnings = tier::assign_tiers(graph, snapshots, config);
    let (pods, pod_warnings) = pod::detect_pods(graph, config);
    warnings.extend(pod_warnings);
    let (borders, border_warnings) = border::detect_borders(graph, snapshots, config);
    warnings.extend(border_warnings);
    (Classification { pods, borders }, warnings)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceReport {
    pub hostname: String,
    pub id: Uuid,
    pub tier: Tier,
    pub pod: Option<PodId>,
    pub pods: BTreeSet<PodId>,
    pub border_vrfs: BTreeSet<String>,
    pub loopbacks: BTreeSet<IpAddr>,
    pub vrfs: BTreeSet<String>,
    pub endpoints: BTreeSet<String>,
}

impl From<&Device> for DeviceReport {
    fn from(device: &Device) -> Self {
        Self {
            hostname: device.hostname.clone(),
            id: device.id,
            tier: device.tier,
            pod: device.pod,
            pods: device.pods.clone(),
            border_vrfs: device.border_vrfs.clone(),
            loopbacks: device.loopbacks.clone(),
            vrfs: device.vrfs.clone(),
            endpoints: device.endpoints.clone(),
        }
    }
}

/// What `classify` returns to callers: devices, every link with its confirmation
/// state, pods, border leaves per VRF and all warnings of the generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub generation: u64,
    pub devices: Vec<DeviceReport>,
    pub links: Vec<Link>,
    pub pods: Vec<Pod>,
    pub borders: BTreeMap<String, Vec<String>>,
    pub warnings: Vec<Warning>,
}

impl ClassificationReport {
    pub fn new(generation: u64, graph: &TopologyGraph, classification: &Classification, warnings: &[Warning]) -> Self {
        Self {
            generation,
            devices: graph.devices().map(DeviceReport::from).collect(),
            links: graph.links().to_vec(),
            pods: classification.pods.clone(),
            borders: classification
                .borders
                .iter()
                .filter(|(_, b)| !b.borders.is_empty())
                .map(|(vrf, b)| (vrf.clone(), b.borders.iter().cloned().collect()))
                .collect(),
            warnings: warnings.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{network::hints::EndpointHints, test_support::fixture_bundle};

    #[test]
    fn test_fixture_report() {
        let bundle = fixture_bundle();
        let (mut graph, mut warnings) = TopologyGraph::build(&bundle, &EndpointHints::new(&bundle.endpoint_hints));
        let (classification, classify_warnings) = classify(&mut graph, &bundle.snapshots, &EngineConfig::default());
        warnings.extend(classify_warnings);

        let report = ClassificationReport::new(7, &graph, &classification, &warnings);
        assert_eq!(report.devices.len(), 11);
        assert_eq!(report.pods.len(), 2);
        assert_eq!(report.borders.keys().collect::<Vec<_>>(), vec!["tenant-1", "tenant-2"]);
        // The one-sided leaf-c report is listed as a link but flagged.
        assert_eq!(report.links.iter().filter(|l| !l.confirmed).count(), 1);
        assert_eq!(
            report.warnings,
            vec![Warning::UnconfirmedLink {
                device: "leaf-c".to_string(),
                local_iface: "swp3".to_string(),
                remote_device: "spine-1".to_string(),
                remote_iface: "swp10".to_string(),
            }]
        );

        let value = serde_json::to_value(&report).unwrap();
        let leaf_a = value["devices"]
            .as_array()
            .unwrap()
            .iter()
            .find(|d| d["hostname"] == "leaf-a")
            .unwrap();
        assert_eq!(leaf_a["tier"], "leaf");
        assert_eq!(leaf_a["pod"], 1);
        assert_eq!(classification.borders_of("tenant-1"), vec!["border-1"]);
        assert_eq!(
            classification.external_gateways("tenant-2", "border-1"),
            vec!["203.0.113.5".parse::<IpAddr>().unwrap()]
        );
    }
}

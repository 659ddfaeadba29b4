/*!
Per-VRF border leaf detection.

For every VRF, each leaf carrying it contributes its default-route signature: the
sorted gateway addresses of its IPv4 default route, or the empty signature when it
has none. The signature most leaves share is the fabric-internal default; leaves
holding any other signature exit the fabric somewhere else and are borders.
*/

use std::{
    collections::{BTreeMap, BTreeSet},
    net::IpAddr,
};

use serde::{Deserialize, Serialize};

use crate::{
    config::EngineConfig,
    error::Warning,
    network::{device::Tier, forwarding::DeviceSnapshot, network_graph::TopologyGraph},
    routing::RouteResolver,
};

pub type Signature = Vec<IpAddr>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VrfBorders {
    /// The fabric-internal default signature, absent on a tie.
    pub majority: Option<Signature>,
    pub borders: BTreeSet<String>,
    /// Signature of every participating leaf.
    pub signatures: BTreeMap<String, Signature>,
}

impl VrfBorders {
    /// Gateways a border leaf sends off-fabric traffic to.
    pub fn external_gateways(&self, border: &str) -> &[IpAddr] {
        self.signatures.get(border).map(Vec::as_slice).unwrap_or(&[])
    }
}

pub fn default_route_signature(hostname: &str, snapshot: &DeviceSnapshot, vrf: &str) -> (Signature, Vec<Warning>) {
    let resolution = RouteResolver::new(hostname, &snapshot.routes).default_route(vrf);
    let signature = resolution.route().map(|route| route.gateways()).unwrap_or_default();
    (signature, resolution.into_warnings())
}

/// Marks border leaves per VRF and returns the signature analysis for each VRF.
pub fn detect_borders(
    graph: &mut TopologyGraph,
    snapshots: &BTreeMap<String, DeviceSnapshot>,
    config: &EngineConfig,
) -> (BTreeMap<String, VrfBorders>, Vec<Warning>) {
    let mut warnings = Vec::new();

    let mut per_vrf: BTreeMap<String, BTreeMap<String, Signature>> = BTreeMap::new();
    for device in graph.devices().filter(|d| d.tier == Tier::Leaf) {
        let Some(snapshot) = snapshots.get(&device.hostname) else {
            continue;
        };
        for vrf in snapshot.routes.vrf_names() {
            let (signature, resolve_warnings) = default_route_signature(&device.hostname, snapshot, vrf);
            warnings.extend(resolve_warnings);
            per_vrf
                .entry(vrf.to_string())
                .or_default()
                .insert(device.hostname.clone(), signature);
        }
    }

    let mut result = BTreeMap::new();
    for (vrf, signatures) in per_vrf {
        let majority = majority_signature(&signatures, config.border_majority_threshold);
        let borders: BTreeSet<String> = match &majority {
            Some(majority) => signatures
                .iter()
                .filter(|(_, signature)| *signature != majority)
                .map(|(leaf, _)| leaf.clone())
                .collect(),
            None => {
                tracing::warn!("No majority default-route signature in VRF {}", vrf);
                warnings.push(Warning::BorderSignatureTie { vrf: vrf.clone() });
                BTreeSet::new()
            }
        };
        for border in &borders {
            if let Some(device) = graph.device_mut(border) {
                device.border_vrfs.insert(vrf.clone());
            }
        }
        if !borders.is_empty() {
            tracing::info!(
                "VRF {}: border leaves {}",
                vrf,
                borders.iter().cloned().collect::<Vec<_>>().join(", ")
            );
        }
        result.insert(
            vrf,
            VrfBorders {
                majority,
                borders,
                signatures,
            },
        );
    }
    (result, warnings)
}

/// The signature held by more than `threshold` of the participants, provided no
/// other signature is held by as many.
pub fn majority_signature(signatures: &BTreeMap<String, Signature>, threshold: f64) -> Option<Signature> {
    let mut counts: BTreeMap<&Signature, usize> = BTreeMap::new();
    for signature in signatures.values() {
        *counts.entry(signature).or_default() += 1;
    }
    let top = counts.values().copied().max()?;
    let mut leaders = counts.iter().filter(|(_, count)| **count == top);
    let (leader, _) = leaders.next()?;
    if leaders.next().is_some() {
        return None;
    }
    if top as f64 > threshold * signatures.len() as f64 {
        Some((*leader).clone())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        classify::tier::assign_tiers,
        network::hints::EndpointHints,
        parsers::bundle::SnapshotBundle,
        test_support::{fabric_json, fixture_bundle},
    };

    /// `gateways` is comma separated; an empty string is the empty signature.
    fn signatures(entries: &[(&str, &str)]) -> BTreeMap<String, Signature> {
        entries
            .iter()
            .map(|(leaf, gateways)| {
                let signature: Signature = gateways
                    .split(',')
                    .filter(|g| !g.is_empty())
                    .map(|g| g.parse().unwrap())
                    .collect();
                (leaf.to_string(), signature)
            })
            .collect()
    }

    fn run(bundle: &SnapshotBundle) -> (TopologyGraph, BTreeMap<String, VrfBorders>, Vec<Warning>) {
        let (mut graph, _) = TopologyGraph::build(bundle, &EndpointHints::new(&bundle.endpoint_hints));
        assign_tiers(&mut graph, &bundle.snapshots, &EngineConfig::default());
        let (borders, warnings) = detect_borders(&mut graph, &bundle.snapshots, &EngineConfig::default());
        (graph, borders, warnings)
    }

    fn default_via(gateway: &str) -> serde_json::Value {
        json!({"routes": {"tenant-1": [{"dst": "default", "gateway": gateway, "dev": "swp1"}]}})
    }

    #[test]
    fn test_fixture_borders() {
        let (graph, borders, warnings) = run(&fixture_bundle());
        assert!(warnings.is_empty(), "{:?}", warnings);

        let tenant_1 = &borders["tenant-1"];
        assert_eq!(tenant_1.majority, Some(vec!["10.0.0.10".parse().unwrap()]));
        assert_eq!(tenant_1.borders, BTreeSet::from(["border-1".to_string()]));
        assert_eq!(tenant_1.external_gateways("border-1"), ["203.0.113.1".parse::<IpAddr>().unwrap()]);
        assert!(borders["tenant-2"].borders.contains("border-1"));
        // No leaf has a default route in the underlay, so all signatures agree.
        assert!(borders["default"].borders.is_empty());

        assert!(graph.device("border-1").unwrap().is_border("tenant-1"));
        assert!(!graph.device("leaf-a").unwrap().is_border("tenant-1"));
    }

    #[test]
    fn test_majority_needs_strictly_more_than_threshold() {
        let half = signatures(&[("l1", "10.0.0.1"), ("l2", "10.0.0.1"), ("l3", "1.1.1.1"), ("l4", "")]);
        assert_eq!(majority_signature(&half, 0.5), None);
        assert_eq!(majority_signature(&half, 0.4), Some(vec!["10.0.0.1".parse().unwrap()]));
    }

    #[test]
    fn test_three_way_tie_has_no_majority() {
        let tie = signatures(&[("l1", "10.0.0.1"), ("l2", "10.0.0.2"), ("l3", "10.0.0.3")]);
        assert_eq!(majority_signature(&tie, 0.5), None);
        assert_eq!(majority_signature(&tie, 0.0), None);
    }

    #[test]
    fn test_empty_signature_can_be_the_majority() {
        let sigs = signatures(&[("l1", ""), ("l2", ""), ("l3", "198.51.100.1")]);
        assert_eq!(majority_signature(&sigs, 0.5), Some(vec![]));
    }

    #[test]
    fn test_tie_yields_warning_and_no_borders() {
        let mut value = fabric_json(
            &[("leaf-1", "spine-1"), ("leaf-2", "spine-1")],
            &[("leaf-1", 2), ("leaf-2", 2)],
        );
        value["devices"]["leaf-1"] = default_via("10.0.0.1");
        value["devices"]["leaf-2"] = default_via("10.0.0.2");
        let bundle = SnapshotBundle::from_value(value).unwrap();
        let (graph, borders, warnings) = run(&bundle);
        assert_eq!(warnings, vec![Warning::BorderSignatureTie { vrf: "tenant-1".to_string() }]);
        assert!(borders["tenant-1"].borders.is_empty());
        assert!(graph.devices().all(|d| d.border_vrfs.is_empty()));
    }

    #[test]
    fn test_spines_do_not_vote() {
        let mut value = fabric_json(
            &[("leaf-1", "spine-1"), ("leaf-2", "spine-1"), ("leaf-3", "spine-1")],
            &[("leaf-1", 2), ("leaf-2", 2), ("leaf-3", 2)],
        );
        value["devices"]["leaf-1"] = default_via("10.0.0.9");
        value["devices"]["leaf-2"] = default_via("10.0.0.9");
        value["devices"]["leaf-3"] = default_via("192.0.2.1");
        value["devices"]["spine-1"] = default_via("192.0.2.1");
        let bundle = SnapshotBundle::from_value(value).unwrap();
        let (_, borders, _) = run(&bundle);
        assert_eq!(borders["tenant-1"].borders, BTreeSet::from(["leaf-3".to_string()]));
        assert!(!borders["tenant-1"].signatures.contains_key("spine-1"));
    }

    #[test]
    fn test_border_without_lldp_uplink_is_detected() {
        // border-1 reaches its external router over an interface with no LLDP peer.
        let mut value = fabric_json(
            &[
                ("leaf-1", "spine-1"),
                ("leaf-2", "spine-1"),
                ("leaf-3", "spine-1"),
                ("border-1", "spine-1"),
            ],
            &[("leaf-1", 2), ("leaf-2", 2), ("leaf-3", 2)],
        );
        for leaf in ["leaf-1", "leaf-2", "leaf-3"] {
            value["devices"][leaf] = default_via("10.0.0.9");
        }
        value["devices"]["border-1"] = default_via("203.0.113.1");
        let bundle = SnapshotBundle::from_value(value).unwrap();
        let (graph, borders, _) = run(&bundle);
        assert_eq!(graph.device("border-1").unwrap().tier, Tier::Leaf);
        assert_eq!(borders["tenant-1"].borders, BTreeSet::from(["border-1".to_string()]));
        assert_eq!(
            borders["tenant-1"].external_gateways("border-1"),
            ["203.0.113.1".parse::<IpAddr>().unwrap()]
        );
    }
}

use std::collections::{BTreeMap, BTreeSet, HashMap};

use petgraph::{
    algo::astar,
    graph::{NodeIndex, UnGraph},
};

use crate::{
    error::Warning,
    network::{
        device::Device,
        hints::EndpointHints,
        link::{Link, LinkState, Port, UndirectedLinkKey},
    },
    parsers::bundle::SnapshotBundle,
};

/// The devices and links of one snapshot generation.
///
/// Every link is kept in `links` for diagnostics, but only confirmed links become
/// edges of `graph`, so traversal never walks a one-sided LLDP report. Node weights
/// are hostnames and edge weights are indices into `links`.
#[derive(Debug, Clone, Default)]
pub struct TopologyGraph {
    pub graph: UnGraph<String, usize>,
    pub hostname_to_index_map: HashMap<String, NodeIndex>,
    devices: BTreeMap<String, Device>,
    links: Vec<Link>,
}

#[derive(Default)]
struct LinkReports {
    reporters: BTreeSet<String>,
    state: Option<LinkState>,
    speed: Option<String>,
}

impl TopologyGraph {
    /// Builds the graph from a bundle's LLDP feed and snapshots.
    ///
    /// A device is part of the fabric when the collector knows it (it reported LLDP or
    /// has a snapshot entry) and no endpoint hint names it. LLDP neighbours outside the
    /// fabric are recorded as endpoint attachments of the reporting device.
    pub fn build(bundle: &SnapshotBundle, hints: &EndpointHints) -> (Self, Vec<Warning>) {
        let mut warnings: Vec<Warning> = bundle
            .skipped_lldp
            .iter()
            .map(|(row, reason)| Warning::MalformedLldpRow {
                row: *row,
                reason: reason.clone(),
            })
            .collect();

        let mut fabric: BTreeSet<&str> = bundle.lldp.iter().map(|n| n.device.as_str()).collect();
        fabric.extend(bundle.collected_devices());
        fabric.retain(|hostname| !hints.matches(hostname));

        let mut devices: BTreeMap<String, Device> = fabric
            .iter()
            .map(|hostname| (hostname.to_string(), Device::new(hostname)))
            .collect();

        let mut reports: BTreeMap<UndirectedLinkKey, LinkReports> = BTreeMap::new();
        for neighbor in &bundle.lldp {
            let local_is_fabric = fabric.contains(neighbor.device.as_str());
            let remote_is_fabric = fabric.contains(neighbor.remote_device.as_str());
            match (local_is_fabric, remote_is_fabric) {
                (true, true) if neighbor.device == neighbor.remote_device => {
                    warnings.push(Warning::TopologyAnomaly {
                        device: neighbor.device.clone(),
                        detail: format!("{} reports itself as its own neighbour", neighbor.local_iface),
                    });
                }
                (true, true) => {
                    let key = UndirectedLinkKey::new(
                        Port::new(&neighbor.device, &neighbor.local_iface),
                        Port::new(&neighbor.remote_device, &neighbor.remote_iface),
                    );
                    let entry = reports.entry(key).or_default();
                    entry.reporters.insert(neighbor.device.clone());
                    // Either side seeing the port down makes the cable down.
                    entry.state = match (entry.state, neighbor.remote_port_state) {
                        (Some(LinkState::Down), _) | (_, LinkState::Down) => Some(LinkState::Down),
                        _ => Some(LinkState::Up),
                    };
                    if entry.speed.is_none() {
                        entry.speed = neighbor.speed.clone();
                    }
                }
                (true, false) => {
                    if let Some(device) = devices.get_mut(&neighbor.device) {
                        device.endpoints.insert(neighbor.remote_device.clone());
                    }
                }
                (false, true) => {
                    // A host running LLDP itself; the attachment belongs to the switch.
                    if let Some(device) = devices.get_mut(&neighbor.remote_device) {
                        device.endpoints.insert(neighbor.device.clone());
                    }
                }
                (false, false) => {}
            }
            if let Some(device) = devices.get_mut(&neighbor.device) {
                device.has_lldp = true;
            }
        }

        for (hostname, device) in devices.iter_mut() {
            match bundle.snapshots.get(hostname) {
                Some(snapshot) => {
                    device.has_snapshot = true;
                    device.loopbacks = snapshot.loopbacks.iter().copied().collect();
                    device.vrfs = snapshot.vrf_names();
                }
                None => {
                    let reason = bundle
                        .missing
                        .get(hostname)
                        .cloned()
                        .unwrap_or_else(|| "no snapshot collected".to_string());
                    tracing::warn!("{} has no usable snapshot: {}", hostname, reason);
                    warnings.push(Warning::MissingSnapshotData {
                        device: hostname.clone(),
                        reason,
                    });
                }
            }
            if !device.has_lldp {
                tracing::warn!("{} reported no LLDP neighbours", hostname);
                warnings.push(Warning::MissingLldpData {
                    device: hostname.clone(),
                });
            }
        }

        let mut graph = UnGraph::default();
        let mut hostname_to_index_map = HashMap::with_capacity(devices.len());
        for hostname in devices.keys() {
            let index = graph.add_node(hostname.clone());
            hostname_to_index_map.insert(hostname.clone(), index);
        }

        let mut links = Vec::with_capacity(reports.len());
        for (key, report) in reports {
            let (a, b) = key.endpoints();
            let confirmed = report.reporters.contains(&a.device) && report.reporters.contains(&b.device);
            let link = Link::from_key(&key, confirmed, report.state.unwrap_or(LinkState::Up), report.speed);

            if confirmed {
                if let (Some(&ia), Some(&ib)) = (hostname_to_index_map.get(&link.a), hostname_to_index_map.get(&link.b)) {
                    graph.add_edge(ia, ib, links.len());
                }
            } else {
                let (reporter, silent) = if report.reporters.contains(&a.device) { (a, b) } else { (b, a) };
                tracing::debug!("Unconfirmed link {} -> {}", reporter, silent);
                warnings.push(Warning::UnconfirmedLink {
                    device: reporter.device.clone(),
                    local_iface: reporter.iface.clone(),
                    remote_device: silent.device.clone(),
                    remote_iface: silent.iface.clone(),
                });
            }
            links.push(link);
        }

        let topology = TopologyGraph {
            graph,
            hostname_to_index_map,
            devices,
            links,
        };
        tracing::info!(
            "Built topology: {} devices, {} confirmed links, {} unconfirmed",
            topology.devices.len(),
            topology.graph.edge_count(),
            topology.links.len() - topology.graph.edge_count()
        );
        (topology, warnings)
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn device(&self, hostname: &str) -> Option<&Device> {
        self.devices.get(hostname)
    }

    pub(crate) fn device_mut(&mut self, hostname: &str) -> Option<&mut Device> {
        self.devices.get_mut(hostname)
    }

    /// Hostnames in sorted order.
    pub fn hostnames(&self) -> impl Iterator<Item = &str> {
        self.devices.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// All links, confirmed or not.
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn confirmed_links(&self) -> impl Iterator<Item = &Link> {
        self.links.iter().filter(|link| link.confirmed)
    }

    /// Confirmed parallel links between two devices.
    pub fn links_between<'a>(&'a self, x: &'a str, y: &'a str) -> impl Iterator<Item = &'a Link> + 'a {
        self.confirmed_links().filter(move |link| link.connects(x, y))
    }

    /// Distinct confirmed neighbours, sorted.
    pub fn neighbors(&self, hostname: &str) -> Vec<&str> {
        let Some(&index) = self.hostname_to_index_map.get(hostname) else {
            return Vec::new();
        };
        let mut neighbors: Vec<&str> = self
            .graph
            .neighbors(index)
            .map(|n| self.graph[n].as_str())
            .collect();
        neighbors.sort();
        neighbors.dedup();
        neighbors
    }

    /// Number of distinct fabric neighbours over confirmed links.
    pub fn degree(&self, hostname: &str) -> usize {
        self.neighbors(hostname).len()
    }

    /// True when `iface` on `device` is cabled to another fabric device, confirmed or not.
    pub fn is_fabric_interface(&self, device: &str, iface: &str) -> bool {
        self.links.iter().any(|link| link.iface_on(device) == Some(iface))
    }

    /// Fewest-hop path over confirmed links, endpoints included.
    pub fn shortest_path(&self, from: &str, to: &str) -> Option<Vec<String>> {
        let start = *self.hostname_to_index_map.get(from)?;
        let goal = *self.hostname_to_index_map.get(to)?;
        let (_, path) = astar(&self.graph, start, |n| n == goal, |_| 1usize, |_| 0)?;
        Some(path.into_iter().map(|n| self.graph[n].clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn bundle(value: serde_json::Value) -> SnapshotBundle {
        SnapshotBundle::from_value(value).unwrap()
    }

    fn row(device: &str, local: &str, remote: &str, remote_iface: &str, state: &str) -> serde_json::Value {
        json!({
            "device": device,
            "local_iface": local,
            "remote_device": remote,
            "remote_iface": remote_iface,
            "remote_port_state": state
        })
    }

    #[test]
    fn test_links_need_both_sides() {
        let bundle = bundle(json!({
            "lldp": [
                row("leaf-a", "swp1", "spine-1", "swp1", "up"),
                row("spine-1", "swp1", "leaf-a", "swp1", "up"),
                row("leaf-a", "swp2", "spine-2", "swp1", "up"),
                row("spine-2", "swp9", "leaf-b", "swp1", "up")
            ],
            "devices": {"leaf-a": {}, "spine-1": {}, "spine-2": {}, "leaf-b": {}}
        }));
        let (topology, warnings) = TopologyGraph::build(&bundle, &EndpointHints::default());

        assert_eq!(topology.links().len(), 3);
        assert_eq!(topology.confirmed_links().count(), 1);
        assert_eq!(topology.graph.edge_count(), 1);
        assert_eq!(topology.neighbors("leaf-a"), vec!["spine-1"]);
        assert_eq!(topology.degree("spine-2"), 0);

        let unconfirmed: Vec<&Warning> = warnings
            .iter()
            .filter(|w| matches!(w, Warning::UnconfirmedLink { .. }))
            .collect();
        assert_eq!(unconfirmed.len(), 2);
        assert!(warnings.contains(&Warning::MissingLldpData {
            device: "leaf-b".to_string()
        }));
        // leaf-b still exists as an isolated node.
        assert!(topology.device("leaf-b").is_some());
    }

    #[test]
    fn test_down_on_either_side_marks_link_down() {
        let bundle = bundle(json!({
            "lldp": [
                row("leaf-a", "swp1", "spine-1", "swp1", "up"),
                row("spine-1", "swp1", "leaf-a", "swp1", "down")
            ],
            "devices": {"leaf-a": {}, "spine-1": {}}
        }));
        let (topology, _) = TopologyGraph::build(&bundle, &EndpointHints::default());
        let link = topology.links_between("leaf-a", "spine-1").next().unwrap();
        assert!(link.confirmed);
        assert!(!link.is_up());
    }

    #[test]
    fn test_non_fabric_neighbours_become_endpoints() {
        let bundle = bundle(json!({
            "lldp": [
                row("leaf-a", "swp10", "host-1", "eth0", "up"),
                row("server-7", "eth0", "leaf-a", "swp11", "up"),
                row("leaf-a", "swp12", "server-8", "eth0", "up")
            ],
            "devices": {"leaf-a": {}},
            "endpoint_hints": ["server-*"]
        }));
        let hints = EndpointHints::new(&bundle.endpoint_hints);
        let (topology, _) = TopologyGraph::build(&bundle, &hints);

        let leaf = topology.device("leaf-a").unwrap();
        assert_eq!(
            leaf.endpoints.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["host-1", "server-7", "server-8"]
        );
        assert!(topology.device("server-7").is_none());
        assert!(topology.links().is_empty());
        assert!(!topology.is_fabric_interface("leaf-a", "swp10"));
    }

    #[test]
    fn test_missing_snapshot_is_reported_once() {
        let bundle = bundle(json!({
            "lldp": [
                row("leaf-a", "swp1", "spine-1", "swp1", "up"),
                row("spine-1", "swp1", "leaf-a", "swp1", "up")
            ],
            "devices": {"leaf-a": {"loopbacks": ["10.0.0.1"]}, "spine-1": {"loopbacks": ["bogus"]}}
        }));
        let (topology, warnings) = TopologyGraph::build(&bundle, &EndpointHints::default());
        let missing: Vec<&Warning> = warnings
            .iter()
            .filter(|w| matches!(w, Warning::MissingSnapshotData { .. }))
            .collect();
        assert_eq!(missing.len(), 1);
        assert!(!topology.device("spine-1").unwrap().has_snapshot);
        assert!(topology.device("leaf-a").unwrap().owns_loopback(&"10.0.0.1".parse().unwrap()));
    }

    #[test]
    fn test_malformed_lldp_rows_are_reported() {
        let bundle = bundle(json!({
            "lldp": [
                row("leaf-a", "swp1", "spine-1", "swp1", "up"),
                {"device": "leaf-a", "local_iface": "swp9"},
                row("spine-1", "swp1", "leaf-a", "swp1", "up")
            ],
            "devices": {"leaf-a": {}, "spine-1": {}}
        }));
        let (topology, warnings) = TopologyGraph::build(&bundle, &EndpointHints::default());
        let malformed: Vec<usize> = warnings
            .iter()
            .filter_map(|w| match w {
                Warning::MalformedLldpRow { row, .. } => Some(*row),
                _ => None,
            })
            .collect();
        assert_eq!(malformed, vec![1]);
        assert_eq!(topology.neighbors("leaf-a"), vec!["spine-1"]);
    }

    #[test]
    fn test_fixture_shortest_path() {
        let bundle = crate::test_support::fixture_bundle();
        let (topology, _) = TopologyGraph::build(&bundle, &EndpointHints::new(&bundle.endpoint_hints));
        let path = topology.shortest_path("leaf-a", "leaf-b").unwrap();
        assert_eq!(path.len(), 3);
        assert_eq!(path.first().map(String::as_str), Some("leaf-a"));
        assert_eq!(path.last().map(String::as_str), Some("leaf-b"));
        assert!(topology.is_fabric_interface("leaf-a", "swp1"));
    }
}

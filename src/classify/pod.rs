use std::collections::{BTreeMap, BTreeSet};

use petgraph::unionfind::UnionFind;
use serde::{Deserialize, Serialize};

use crate::{
    config::EngineConfig,
    error::Warning,
    network::{
        device::{PodId, Tier},
        network_graph::TopologyGraph,
    },
};

/// A group of leaves sharing most of their spines, and the spines serving them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pod {
    pub id: PodId,
    pub leaves: BTreeSet<String>,
    pub spines: BTreeSet<String>,
}

/// True when the two spine sets overlap by more than `threshold` of the smaller one.
/// Empty sets never relate.
pub fn shares_spine_majority(a: &BTreeSet<String>, b: &BTreeSet<String>, threshold: f64) -> bool {
    let smaller = a.len().min(b.len());
    if smaller == 0 {
        return false;
    }
    let overlap = a.intersection(b).count();
    overlap as f64 > threshold * smaller as f64
}

/// The spine-tier devices a leaf has a confirmed link to.
pub fn spine_neighbors(graph: &TopologyGraph, leaf: &str) -> BTreeSet<String> {
    graph
        .neighbors(leaf)
        .into_iter()
        .filter(|n| graph.device(n).is_some_and(|d| d.tier == Tier::Spine))
        .map(str::to_string)
        .collect()
}

/// Partitions leaves into pods and records pod membership on leaves and spines.
///
/// Pods are the connected components of the shares-a-spine-majority relation and are
/// numbered from 1 in hostname order of their first leaf, so the same graph always
/// yields the same ids. Runs after tier assignment.
pub fn detect_pods(graph: &mut TopologyGraph, config: &EngineConfig) -> (Vec<Pod>, Vec<Warning>) {
    let mut warnings = Vec::new();

    let leaves: Vec<String> = graph
        .devices()
        .filter(|d| d.tier == Tier::Leaf)
        .map(|d| d.hostname.clone())
        .collect();
    let spine_sets: Vec<BTreeSet<String>> = leaves.iter().map(|leaf| spine_neighbors(graph, leaf)).collect();

    let mut union_find = UnionFind::<usize>::new(leaves.len());
    for i in 0..leaves.len() {
        for j in (i + 1)..leaves.len() {
            if shares_spine_majority(&spine_sets[i], &spine_sets[j], config.pod_overlap_threshold) {
                union_find.union(i, j);
            }
        }
    }

    let mut pod_of_root: BTreeMap<usize, PodId> = BTreeMap::new();
    let mut pods: Vec<Pod> = Vec::new();
    let mut assignment: Vec<PodId> = Vec::with_capacity(leaves.len());
    for (i, leaf) in leaves.iter().enumerate() {
        let root = union_find.find(i);
        let id = *pod_of_root.entry(root).or_insert_with(|| {
            let id = pods.len() as PodId + 1;
            pods.push(Pod {
                id,
                leaves: BTreeSet::new(),
                spines: BTreeSet::new(),
            });
            id
        });
        let pod = &mut pods[(id - 1) as usize];
        pod.leaves.insert(leaf.clone());
        pod.spines.extend(spine_sets[i].iter().cloned());
        assignment.push(id);
    }

    for device_name in graph.hostnames().map(str::to_string).collect::<Vec<_>>() {
        if let Some(device) = graph.device_mut(&device_name) {
            device.pod = None;
            device.pods.clear();
        }
    }
    for (leaf, id) in leaves.iter().zip(&assignment) {
        if let Some(device) = graph.device_mut(leaf) {
            device.pod = Some(*id);
            device.pods.insert(*id);
        }
    }
    for pod in &pods {
        for spine in &pod.spines {
            if let Some(device) = graph.device_mut(spine) {
                device.pods.insert(pod.id);
                device.pod = if device.pods.len() == 1 { Some(pod.id) } else { None };
            }
        }
        if pod.leaves.len() == 1 {
            if let Some(leaf) = pod.leaves.iter().next() {
                tracing::warn!("{} matches no other leaf's spines, alone in pod {}", leaf, pod.id);
                warnings.push(Warning::SingletonPod {
                    leaf: leaf.clone(),
                    pod: pod.id,
                });
            }
        }
    }

    tracing::info!("Detected {} pods across {} leaves", pods.len(), leaves.len());
    (pods, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        classify::tier::assign_tiers,
        network::hints::EndpointHints,
        parsers::bundle::SnapshotBundle,
        test_support::{fabric_bundle, fixture_bundle},
    };

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn prepared(bundle: &SnapshotBundle) -> TopologyGraph {
        let (mut graph, _) = TopologyGraph::build(bundle, &EndpointHints::new(&bundle.endpoint_hints));
        assign_tiers(&mut graph, &bundle.snapshots, &EngineConfig::default());
        graph
    }

    #[test]
    fn test_majority_boundaries() {
        let threshold = 0.5;
        assert!(shares_spine_majority(&set(&["s1", "s2"]), &set(&["s1", "s2"]), threshold));
        // Exactly half of the smaller set is not a majority.
        assert!(!shares_spine_majority(&set(&["s1", "s2"]), &set(&["s2", "s3"]), threshold));
        assert!(shares_spine_majority(
            &set(&["s1", "s2", "s3", "s4"]),
            &set(&["s1", "s2", "s3"]),
            threshold
        ));
        assert!(!shares_spine_majority(&set(&[]), &set(&["s1"]), threshold));
        // A lower threshold admits the exact-half case.
        assert!(shares_spine_majority(&set(&["s1", "s2"]), &set(&["s2", "s3"]), 0.4));
    }

    #[test]
    fn test_fixture_pods() {
        let mut graph = prepared(&fixture_bundle());
        let (pods, warnings) = detect_pods(&mut graph, &EngineConfig::default());
        assert_eq!(pods.len(), 2);
        assert_eq!(pods[0].leaves, set(&["border-1", "leaf-a", "leaf-b"]));
        assert_eq!(pods[0].spines, set(&["spine-1", "spine-2"]));
        assert_eq!(pods[1].leaves, set(&["leaf-c", "leaf-d"]));
        assert_eq!(pods[1].spines, set(&["spine-3", "spine-4"]));
        assert!(warnings.is_empty());
        assert_eq!(graph.device("leaf-c").unwrap().pod, Some(2));
        assert_eq!(graph.device("spine-1").unwrap().pod, Some(1));
        assert!(graph.device("core-1").unwrap().pods.is_empty());
    }

    #[test]
    fn test_pod_detection_is_idempotent() {
        let mut graph = prepared(&fixture_bundle());
        let (first, _) = detect_pods(&mut graph, &EngineConfig::default());
        let devices_first: Vec<_> = graph.devices().map(|d| (d.hostname.clone(), d.pod, d.pods.clone())).collect();
        let (second, _) = detect_pods(&mut graph, &EngineConfig::default());
        let devices_second: Vec<_> = graph.devices().map(|d| (d.hostname.clone(), d.pod, d.pods.clone())).collect();
        assert_eq!(first, second);
        assert_eq!(devices_first, devices_second);
    }

    #[test]
    fn test_partial_cabling_still_joins_pod() {
        // leaf-3 lost one of its three uplinks; 2 of 2 still overlap.
        let bundle = fabric_bundle(
            &[
                ("leaf-1", "spine-1"),
                ("leaf-1", "spine-2"),
                ("leaf-1", "spine-3"),
                ("leaf-2", "spine-1"),
                ("leaf-2", "spine-2"),
                ("leaf-2", "spine-3"),
                ("leaf-3", "spine-1"),
                ("leaf-3", "spine-2"),
            ],
            &[("leaf-1", 4), ("leaf-2", 4), ("leaf-3", 4)],
        );
        let mut graph = prepared(&bundle);
        let (pods, warnings) = detect_pods(&mut graph, &EngineConfig::default());
        assert_eq!(pods.len(), 1);
        assert_eq!(pods[0].leaves.len(), 3);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_exact_half_overlap_splits_pods() {
        let bundle = fabric_bundle(
            &[
                ("leaf-1", "spine-1"),
                ("leaf-1", "spine-2"),
                ("leaf-2", "spine-2"),
                ("leaf-2", "spine-3"),
            ],
            &[("leaf-1", 3), ("leaf-2", 3)],
        );
        let mut graph = prepared(&bundle);
        let (pods, warnings) = detect_pods(&mut graph, &EngineConfig::default());
        assert_eq!(pods.len(), 2);
        assert_eq!(warnings.len(), 2);
        assert!(warnings.iter().all(|w| matches!(w, Warning::SingletonPod { .. })));
        // spine-2 serves both pods.
        let spine = graph.device("spine-2").unwrap();
        assert_eq!(spine.pods, BTreeSet::from([1, 2]));
        assert_eq!(spine.pod, None);
    }
}

/*!
Tier assignment by breadth-first layering from seed leaves.

Seeds are devices where most LLDP neighbours are non-fabric endpoints. When no
device has any endpoint attachments, seeds fall back to the structural edge of
each connected component (greatest eccentricity, then lowest degree). Every
other device takes its BFS distance from the nearest seed: 0 is a leaf, 1 a
spine, 2 or more a core. Devices no seed reaches stay `Unknown`.

A device that lands at distance 2 with nothing but spines around it is a leaf the
seeding missed: either it has a few hosts but more uplinks, or it is a border leaf
whose external peer does not run LLDP, recognisable by a default route the seeded
leaves do not share. Such devices join the seeds and the layering is redone.
*/

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::{
    classify::border::{Signature, default_route_signature, majority_signature},
    config::EngineConfig,
    error::Warning,
    network::{device::Tier, forwarding::DeviceSnapshot, network_graph::TopologyGraph},
};

pub type Distances = BTreeMap<String, usize>;

/// Assigns `tier` on every device of the graph and returns the anomalies found.
pub fn assign_tiers(
    graph: &mut TopologyGraph,
    snapshots: &BTreeMap<String, DeviceSnapshot>,
    config: &EngineConfig,
) -> Vec<Warning> {
    let mut warnings = Vec::new();

    let mut seeds = endpoint_seeds(graph, config.endpoint_majority_threshold);
    if seeds.is_empty() {
        tracing::info!("No endpoint attachments observed, seeding leaves from graph structure");
        seeds = structural_seeds(graph, &mut warnings);
    }

    let mut distances = layer_distances(graph, &seeds);
    let promoted = promote_stranded_leaves(graph, snapshots, config, &seeds, &distances);
    if !promoted.is_empty() {
        for (hostname, detail) in promoted {
            tracing::info!("Promoting {} to leaf: {}", hostname, detail);
            warnings.push(Warning::ClassificationAmbiguous {
                device: hostname.clone(),
                detail,
            });
            seeds.insert(hostname);
        }
        distances = layer_distances(graph, &seeds);
    }

    warnings.extend(lateral_link_warnings(graph, &distances));

    let hostnames: Vec<String> = graph.hostnames().map(str::to_string).collect();
    for hostname in &hostnames {
        let Some(device) = graph.device_mut(hostname) else {
            continue;
        };
        device.tier = match distances.get(hostname) {
            Some(_) if !device.has_snapshot => Tier::Unknown,
            Some(&distance) => Tier::from_distance(distance),
            None => Tier::Unknown,
        };
    }

    warnings.extend(monotonicity_warnings(graph));

    let mut counts: BTreeMap<Tier, usize> = BTreeMap::new();
    for device in graph.devices() {
        *counts.entry(device.tier).or_default() += 1;
    }
    tracing::info!(
        "Tiers assigned: {} leaves, {} spines, {} cores, {} unknown",
        counts.get(&Tier::Leaf).unwrap_or(&0),
        counts.get(&Tier::Spine).unwrap_or(&0),
        counts.get(&Tier::Core).unwrap_or(&0),
        counts.get(&Tier::Unknown).unwrap_or(&0),
    );
    warnings
}

/// Devices whose endpoint attachments outnumber `threshold` of all their neighbours.
pub fn endpoint_seeds(graph: &TopologyGraph, threshold: f64) -> BTreeSet<String> {
    graph
        .devices()
        .filter(|device| {
            let endpoints = device.endpoints.len();
            let total = endpoints + graph.degree(&device.hostname);
            endpoints > 0 && endpoints as f64 > threshold * total as f64
        })
        .map(|device| device.hostname.clone())
        .collect()
}

/// Seeds for a fabric with no endpoint signal, chosen per connected component.
///
/// The periphery (greatest eccentricity) is taken first. When every node is equally
/// eccentric, as in a two-tier leaf-spine mesh, the lowest-degree nodes are taken.
/// A fully regular component leaves no structural signal; the bipartition side
/// holding the alphabetically first hostname is taken and flagged.
pub fn structural_seeds(graph: &TopologyGraph, warnings: &mut Vec<Warning>) -> BTreeSet<String> {
    let mut seeds = BTreeSet::new();
    for component in components(graph) {
        if component.len() < 2 {
            continue;
        }
        let eccentricity: BTreeMap<&str, usize> = component
            .iter()
            .map(|hostname| {
                let start = BTreeSet::from([hostname.to_string()]);
                let max = layer_distances(graph, &start).into_values().max().unwrap_or(0);
                (hostname.as_str(), max)
            })
            .collect();
        let max_ecc = eccentricity.values().copied().max().unwrap_or(0);
        let min_ecc = eccentricity.values().copied().min().unwrap_or(0);
        if max_ecc != min_ecc {
            seeds.extend(
                eccentricity
                    .iter()
                    .filter(|(_, ecc)| **ecc == max_ecc)
                    .map(|(hostname, _)| hostname.to_string()),
            );
            continue;
        }

        let degrees: BTreeMap<&str, usize> = component
            .iter()
            .map(|hostname| (hostname.as_str(), graph.degree(hostname)))
            .collect();
        let min_degree = degrees.values().copied().min().unwrap_or(0);
        let max_degree = degrees.values().copied().max().unwrap_or(0);
        if min_degree != max_degree {
            seeds.extend(
                degrees
                    .iter()
                    .filter(|(_, degree)| **degree == min_degree)
                    .map(|(hostname, _)| hostname.to_string()),
            );
            continue;
        }

        let Some(first) = component.iter().next() else {
            continue;
        };
        let from_first = layer_distances(graph, &BTreeSet::from([first.clone()]));
        let side: Vec<String> = from_first
            .into_iter()
            .filter(|(_, distance)| distance % 2 == 0)
            .map(|(hostname, _)| hostname)
            .collect();
        tracing::warn!(
            "Component containing {} is regular, seeding leaves from its bipartition",
            first
        );
        warnings.push(Warning::ClassificationAmbiguous {
            device: first.clone(),
            detail: format!(
                "regular component of {} devices, leaves chosen by bipartition: {}",
                component.len(),
                side.join(", ")
            ),
        });
        seeds.extend(side);
    }
    seeds
}

/// Multi-source BFS over confirmed links. Unreached devices are absent from the result.
pub fn layer_distances(graph: &TopologyGraph, seeds: &BTreeSet<String>) -> Distances {
    let mut distances = Distances::new();
    let mut queue = VecDeque::new();
    for seed in seeds {
        if graph.device(seed).is_some() {
            distances.insert(seed.clone(), 0);
            queue.push_back(seed.clone());
        }
    }
    while let Some(current) = queue.pop_front() {
        let distance = distances[&current];
        for neighbor in graph.neighbors(&current) {
            if !distances.contains_key(neighbor) {
                distances.insert(neighbor.to_string(), distance + 1);
                queue.push_back(neighbor.to_string());
            }
        }
    }
    distances
}

/// Connected components over confirmed links, each sorted, in order of their first hostname.
fn components(graph: &TopologyGraph) -> Vec<BTreeSet<String>> {
    let mut seen = BTreeSet::new();
    let mut components = Vec::new();
    for hostname in graph.hostnames() {
        if seen.contains(hostname) {
            continue;
        }
        let component: BTreeSet<String> = layer_distances(graph, &BTreeSet::from([hostname.to_string()]))
            .into_keys()
            .collect();
        seen.extend(component.iter().cloned());
        components.push(component);
    }
    components
}

/// Non-seed devices at distance 2 or more whose neighbours all sit at distance 1,
/// paired with the reason they are leaves after all.
fn promote_stranded_leaves(
    graph: &TopologyGraph,
    snapshots: &BTreeMap<String, DeviceSnapshot>,
    config: &EngineConfig,
    seeds: &BTreeSet<String>,
    distances: &Distances,
) -> Vec<(String, String)> {
    let stranded: Vec<&str> = graph
        .devices()
        .filter(|device| !seeds.contains(&device.hostname))
        .filter(|device| distances.get(&device.hostname).is_some_and(|d| *d >= 2))
        .filter(|device| {
            graph
                .neighbors(&device.hostname)
                .iter()
                .all(|n| distances.get(*n) == Some(&1))
        })
        .map(|device| device.hostname.as_str())
        .collect();
    if stranded.is_empty() {
        return Vec::new();
    }

    let mut promoted = Vec::new();
    let mut majorities: BTreeMap<String, Option<Signature>> = BTreeMap::new();
    for hostname in stranded {
        let has_endpoints = graph.device(hostname).is_some_and(|d| !d.endpoints.is_empty());
        if has_endpoints {
            promoted.push((
                hostname.to_string(),
                "has endpoints and only spine neighbours but fell short of the endpoint majority, classified as leaf"
                    .to_string(),
            ));
            continue;
        }
        let Some(snapshot) = snapshots.get(hostname) else {
            continue;
        };
        for vrf in snapshot.routes.vrf_names() {
            let (signature, _) = default_route_signature(hostname, snapshot, vrf);
            if signature.is_empty() {
                continue;
            }
            let majority = majorities
                .entry(vrf.to_string())
                .or_insert_with(|| seed_majority(snapshots, seeds, vrf, config.border_majority_threshold));
            if majority.as_ref().is_some_and(|m| *m != signature) {
                promoted.push((
                    hostname.to_string(),
                    format!(
                        "has only spine neighbours and a default route in VRF {} the other leaves do not share, classified as border leaf",
                        vrf
                    ),
                ));
                break;
            }
        }
    }
    promoted
}

/// Majority default-route signature of the seeded leaves carrying `vrf`.
fn seed_majority(
    snapshots: &BTreeMap<String, DeviceSnapshot>,
    seeds: &BTreeSet<String>,
    vrf: &str,
    threshold: f64,
) -> Option<Signature> {
    let signatures: BTreeMap<String, Signature> = seeds
        .iter()
        .filter_map(|seed| snapshots.get(seed).map(|snapshot| (seed, snapshot)))
        .filter(|(_, snapshot)| snapshot.routes.has_vrf(vrf))
        .map(|(seed, snapshot)| (seed.clone(), default_route_signature(seed, snapshot, vrf).0))
        .collect();
    majority_signature(&signatures, threshold)
}

/// Links inside a non-leaf layer mean the hierarchy is not a clean Clos.
fn lateral_link_warnings(graph: &TopologyGraph, distances: &Distances) -> Vec<Warning> {
    let mut warnings = Vec::new();
    let mut seen = BTreeSet::new();
    for link in graph.confirmed_links() {
        let (Some(da), Some(db)) = (distances.get(&link.a), distances.get(&link.b)) else {
            continue;
        };
        if da == db && *da >= 1 && seen.insert((link.a.clone(), link.b.clone())) {
            warnings.push(Warning::ClassificationAmbiguous {
                device: link.a.clone(),
                detail: format!(
                    "lateral link to {} at distance {}, smaller distance kept",
                    link.b, da
                ),
            });
        }
    }
    warnings
}

fn monotonicity_warnings(graph: &TopologyGraph) -> Vec<Warning> {
    let mut warnings = Vec::new();
    for link in graph.confirmed_links() {
        let (Some(a), Some(b)) = (graph.device(&link.a), graph.device(&link.b)) else {
            continue;
        };
        if let (Some(la), Some(lb)) = (a.tier.layer(), b.tier.layer()) {
            if la.abs_diff(lb) > 1 {
                tracing::warn!("Tier gap on link {} ({}) - {} ({})", a.hostname, a.tier, b.hostname, b.tier);
                warnings.push(Warning::TopologyAnomaly {
                    device: a.hostname.clone(),
                    detail: format!("{} link to {} skips a tier", a.tier, b.hostname),
                });
            }
        }
    }
    warnings
}

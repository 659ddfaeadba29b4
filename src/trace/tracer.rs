use std::{
    collections::{BTreeMap, BTreeSet},
    net::IpAddr,
};

use crate::{
    classify::{Classification, pod::spine_neighbors},
    error::Warning,
    network::{
        device::{Device, Tier},
        forwarding::DeviceSnapshot,
        link::LinkHealth,
        network_graph::TopologyGraph,
    },
    routing::{Resolution, RouteResolver},
    trace::{
        TraceError, TraceRequest,
        owner::{Owner, resolve_owner},
        path::{Hop, HopKind, LOCAL_PORT, PathTrace, Scenario},
    },
};

/// Read-only view over one generation that answers trace queries.
pub struct Tracer<'a> {
    graph: &'a TopologyGraph,
    snapshots: &'a BTreeMap<String, DeviceSnapshot>,
    classification: &'a Classification,
}

impl<'a> Tracer<'a> {
    pub fn new(
        graph: &'a TopologyGraph,
        snapshots: &'a BTreeMap<String, DeviceSnapshot>,
        classification: &'a Classification,
    ) -> Self {
        Self {
            graph,
            snapshots,
            classification,
        }
    }

    pub fn trace(&self, request: &TraceRequest) -> Result<PathTrace, TraceError> {
        let mut warnings = Vec::new();
        let (src_vrf, mut dst_vrf) = request.vrfs();

        let (src, owner_warnings) = resolve_owner(self.graph, self.snapshots, request.src_ip, &src_vrf);
        warnings.extend(owner_warnings);
        let src = src.ok_or(TraceError::UnknownIpOwner(request.src_ip))?;

        let (dst, owner_warnings) = resolve_owner(self.graph, self.snapshots, request.dst_ip, &dst_vrf);
        warnings.extend(owner_warnings);

        if let Some(dst) = &dst {
            if request.vrf_override.is_none() {
                if let Some(corrected) = self.corrected_vrf(&dst.device, &dst_vrf, request.dst_ip) {
                    tracing::info!("VRF auto-corrected from {} to {} for {}", dst_vrf, corrected, request.dst_ip);
                    warnings.push(Warning::VrfAutoCorrected {
                        ip: request.dst_ip,
                        from: dst_vrf.clone(),
                        to: corrected.clone(),
                    });
                    dst_vrf = corrected;
                }
            }
        }

        let vrf_path = if src_vrf == dst_vrf {
            vec![src_vrf.clone()]
        } else {
            vec![src_vrf.clone(), dst_vrf.clone()]
        };

        let (scenario, hops) = match &dst {
            Some(dst) if dst.device == src.device => (Scenario::LocalSwitching, vec![self.local_hop(&src, dst)]),
            None => (
                Scenario::ExternalDestination,
                self.external_path(&src, &src_vrf, request.dst_ip, &mut warnings),
            ),
            Some(dst) if src_vrf != dst_vrf => (
                Scenario::InterVrf,
                self.inter_vrf_path(&src, dst, &src_vrf, &dst_vrf, request.dst_ip, &mut warnings),
            ),
            Some(dst) => {
                let scenario = self.intra_vrf_scenario(&src.device, &dst.device, &mut warnings);
                let via_core = scenario == Scenario::CrossPod;
                (
                    scenario,
                    self.intra_vrf_path(&src, dst, &src_vrf, request.dst_ip, via_core, &mut warnings),
                )
            }
        };

        tracing::debug!(
            "Traced {} ({}) -> {} ({}): {} in {} hops",
            request.src_ip,
            src_vrf,
            request.dst_ip,
            dst_vrf,
            scenario,
            hops.len()
        );
        Ok(PathTrace::new(
            scenario,
            src.device,
            dst.map(|d| d.device),
            hops,
            vrf_path,
            warnings,
        ))
    }

    /// Another VRF holding `ip` in the destination's ARP table, when `vrf` has no route to it there.
    fn corrected_vrf(&self, device: &str, vrf: &str, ip: IpAddr) -> Option<String> {
        let snapshot = self.snapshots.get(device)?;
        let resolution = RouteResolver::new(device, &snapshot.routes).resolve(vrf, ip);
        if !resolution.is_no_route() {
            return None;
        }
        let candidates: BTreeSet<&str> = snapshot
            .arp_entries_for(&ip)
            .filter(|entry| entry.vrf != vrf)
            .map(|entry| entry.vrf.as_str())
            .collect();
        candidates.into_iter().next().map(str::to_string)
    }

    /// Same-pod when both leaves share a pod id. Without a pod on either side, falls back to
    /// whether they share a spine.
    fn intra_vrf_scenario(&self, src: &str, dst: &str, warnings: &mut Vec<Warning>) -> Scenario {
        let pod_of = |hostname: &str| self.graph.device(hostname).and_then(|d| d.pod);
        match (pod_of(src), pod_of(dst)) {
            (Some(a), Some(b)) if a == b => Scenario::SamePod,
            (Some(_), Some(_)) => Scenario::CrossPod,
            (src_pod, _) => {
                let device = if src_pod.is_none() { src } else { dst };
                let shared = !spine_neighbors(self.graph, src)
                    .is_disjoint(&spine_neighbors(self.graph, dst));
                let scenario = if shared { Scenario::SamePod } else { Scenario::CrossPod };
                warnings.push(Warning::AmbiguousPod {
                    device: device.to_string(),
                    detail: format!("no pod assigned, treated as {}", scenario),
                });
                scenario
            }
        }
    }

    fn local_hop(&self, src: &Owner, dst: &Owner) -> Hop {
        let mut hop = Hop::fabric(vec![src.device.clone()], self.tier_of(&src.device));
        hop.ingress = vec![src.interface.clone()];
        hop.egress = vec![dst.interface.clone()];
        hop
    }

    fn intra_vrf_path(
        &self,
        src: &Owner,
        dst: &Owner,
        vrf: &str,
        dst_ip: IpAddr,
        via_core: bool,
        warnings: &mut Vec<Warning>,
    ) -> Vec<Hop> {
        let mut hops = vec![self.device_hop(&src.device)];
        hops.extend(self.fabric_segment(&src.device, &dst.device, via_core, warnings));
        hops.push(self.device_hop(&dst.device));
        self.finish(&mut hops, src, Some(dst), vrf, dst_ip, warnings);
        hops
    }

    fn external_path(&self, src: &Owner, vrf: &str, dst_ip: IpAddr, warnings: &mut Vec<Warning>) -> Vec<Hop> {
        let mut hops = vec![self.device_hop(&src.device)];
        match self.choose_border(vrf, &src.device) {
            Some(border) => {
                if border != src.device {
                    hops.extend(self.fabric_segment(&src.device, &border, false, warnings));
                    let mut border_hop = self.device_hop(&border);
                    border_hop.egress = self.route_egress(&border, vrf, dst_ip, warnings);
                    hops.push(border_hop);
                }
                let gateways = self.classification.external_gateways(vrf, &border);
                hops.push(Hop::external(HopKind::ExternalNetwork, gateways));
            }
            None => {
                tracing::warn!("No border leaf for VRF {}, external path ends at {}", vrf, src.device);
                warnings.push(Warning::NoBorderLeaf { vrf: vrf.to_string() });
                hops.push(Hop::external(HopKind::ExternalNetwork, Vec::new()));
            }
        }
        self.finish(&mut hops, src, None, vrf, dst_ip, warnings);
        hops
    }

    /// Leaves the fabric through the source VRF's border, crosses the external gateway
    /// and re-enters through the destination VRF's border.
    fn inter_vrf_path(
        &self,
        src: &Owner,
        dst: &Owner,
        src_vrf: &str,
        dst_vrf: &str,
        dst_ip: IpAddr,
        warnings: &mut Vec<Warning>,
    ) -> Vec<Hop> {
        let src_border = self.choose_border(src_vrf, &src.device);
        let dst_border = self.choose_border(dst_vrf, &dst.device);

        let mut hops = vec![self.device_hop(&src.device)];
        match (src_border, dst_border) {
            (Some(src_border), Some(dst_border)) => {
                if src_border != src.device {
                    hops.extend(self.fabric_segment(&src.device, &src_border, false, warnings));
                    hops.push(self.device_hop(&src_border));
                }
                let gateways = self.classification.external_gateways(src_vrf, &src_border);
                hops.push(Hop::external(HopKind::ExternalGateway, gateways));
                if dst_border != dst.device {
                    hops.push(self.device_hop(&dst_border));
                    hops.extend(self.fabric_segment(&dst_border, &dst.device, false, warnings));
                }
            }
            (src_border, dst_border) => {
                for (vrf, border) in [(src_vrf, src_border), (dst_vrf, dst_border)] {
                    if border.is_none() {
                        warnings.push(Warning::NoBorderLeaf { vrf: vrf.to_string() });
                    }
                }
                warnings.push(Warning::DegradedPath {
                    from: src.device.clone(),
                    to: dst.device.clone(),
                    detail: "no border leaf to leak between VRFs, showing the direct fabric path".to_string(),
                });
                hops.extend(self.fabric_segment(&src.device, &dst.device, false, warnings));
            }
        }
        hops.push(self.device_hop(&dst.device));
        self.finish(&mut hops, src, Some(dst), src_vrf, dst_ip, warnings);
        hops
    }

    /// Border leaf of `vrf` for traffic from `near`: one sharing a pod wins, then hostname order.
    fn choose_border(&self, vrf: &str, near: &str) -> Option<String> {
        let borders = self.classification.borders_of(vrf);
        if borders.contains(&near) {
            return Some(near.to_string());
        }
        let near_pods = self.graph.device(near).map(|d| d.pods.clone()).unwrap_or_default();
        borders
            .iter()
            .find(|border| {
                self.graph
                    .device(border)
                    .is_some_and(|d| !d.pods.is_disjoint(&near_pods))
            })
            .or_else(|| borders.first())
            .map(|border| border.to_string())
    }

    /// Intermediate hops between two fabric devices, endpoints excluded.
    ///
    /// Devices sharing spines cross one ECMP spine hop. Otherwise the path climbs to the
    /// cores both sides reach: source spines, cores, destination spines. With `via_core`
    /// (leaves in different pods) the core route is tried first, and a shared spine is
    /// only used as a degraded fallback. Anything else falls back to a shortest path and
    /// is flagged as degraded.
    fn fabric_segment(&self, from: &str, to: &str, via_core: bool, warnings: &mut Vec<Warning>) -> Vec<Hop> {
        if from == to {
            return Vec::new();
        }
        let from_spines = spine_neighbors(self.graph, from);
        let to_spines = spine_neighbors(self.graph, to);

        let common: Vec<String> = from_spines.intersection(&to_spines).cloned().collect();
        if !via_core && !common.is_empty() {
            return vec![Hop::fabric(common, Some(Tier::Spine))];
        }
        if let Some(hops) = self.core_segment(&from_spines, &to_spines) {
            return hops;
        }
        if !common.is_empty() {
            tracing::warn!("{} and {} are in different pods but share no core, crossing shared spines", from, to);
            warnings.push(Warning::DegradedPath {
                from: from.to_string(),
                to: to.to_string(),
                detail: "different pods without a shared core, crossing shared spines".to_string(),
            });
            return vec![Hop::fabric(common, Some(Tier::Spine))];
        }

        match self.graph.shortest_path(from, to) {
            Some(path) => {
                tracing::warn!("No spine/core path from {} to {}, using shortest path", from, to);
                warnings.push(Warning::DegradedPath {
                    from: from.to_string(),
                    to: to.to_string(),
                    detail: format!("no shared spines or cores, shortest path via {} devices", path.len().saturating_sub(2)),
                });
                path[1..path.len() - 1]
                    .iter()
                    .map(|hostname| self.device_hop(hostname))
                    .collect()
            }
            None => {
                tracing::warn!("{} and {} are not connected", from, to);
                warnings.push(Warning::DegradedPath {
                    from: from.to_string(),
                    to: to.to_string(),
                    detail: "devices are not connected by confirmed links".to_string(),
                });
                Vec::new()
            }
        }
    }

    /// Source spines, shared cores, destination spines; `None` when no core is reachable from both sides.
    fn core_segment(&self, from_spines: &BTreeSet<String>, to_spines: &BTreeSet<String>) -> Option<Vec<Hop>> {
        let cores_of = |spines: &BTreeSet<String>| -> BTreeSet<String> {
            spines
                .iter()
                .flat_map(|spine| self.neighbors_in_tier(spine, Tier::Core))
                .collect()
        };
        let cores: BTreeSet<String> = cores_of(from_spines)
            .intersection(&cores_of(to_spines))
            .cloned()
            .collect();
        if cores.is_empty() {
            return None;
        }
        let reaching = |spines: &BTreeSet<String>| -> Vec<String> {
            spines
                .iter()
                .filter(|spine| {
                    self.neighbors_in_tier(spine, Tier::Core)
                        .iter()
                        .any(|core| cores.contains(core))
                })
                .cloned()
                .collect()
        };
        Some(vec![
            Hop::fabric(reaching(from_spines), Some(Tier::Spine)),
            Hop::fabric(cores.iter().cloned().collect(), Some(Tier::Core)),
            Hop::fabric(reaching(to_spines), Some(Tier::Spine)),
        ])
    }

    fn neighbors_in_tier(&self, hostname: &str, tier: Tier) -> Vec<String> {
        self.graph
            .neighbors(hostname)
            .into_iter()
            .filter(|n| self.tier_of(n) == Some(tier))
            .map(str::to_string)
            .collect()
    }

    fn tier_of(&self, hostname: &str) -> Option<Tier> {
        self.graph.device(hostname).map(|d: &Device| d.tier)
    }

    fn device_hop(&self, hostname: &str) -> Hop {
        Hop::fabric(vec![hostname.to_string()], self.tier_of(hostname))
    }

    /// Egress interfaces `device` would use toward `ip`, or nothing with a warning.
    fn route_egress(&self, device: &str, vrf: &str, ip: IpAddr, warnings: &mut Vec<Warning>) -> Vec<String> {
        let Some(snapshot) = self.snapshots.get(device) else {
            return Vec::new();
        };
        match RouteResolver::new(device, &snapshot.routes).resolve(vrf, ip) {
            Resolution::Route(route) => {
                warnings.extend(route.warnings.iter().cloned());
                route.egress_interfaces()
            }
            Resolution::NoRoute { warnings: resolve_warnings } => {
                warnings.extend(resolve_warnings);
                warnings.push(Warning::NoRoute {
                    device: device.to_string(),
                    vrf: vrf.to_string(),
                    ip,
                });
                Vec::new()
            }
        }
    }

    /// Fills interfaces and link health once the hop sequence is known.
    fn finish(
        &self,
        hops: &mut [Hop],
        src: &Owner,
        dst: Option<&Owner>,
        src_vrf: &str,
        dst_ip: IpAddr,
        warnings: &mut Vec<Warning>,
    ) {
        for i in 0..hops.len() {
            if !hops[i].is_fabric() {
                continue;
            }
            let prev = i.checked_sub(1).map(|p| &hops[p]).filter(|h| h.is_fabric());
            let next = hops.get(i + 1).filter(|h| h.is_fabric());

            let ingress = prev.map(|p| self.facing_interfaces(&hops[i], p)).unwrap_or_default();
            let egress = next.map(|n| self.facing_interfaces(&hops[i], n)).unwrap_or_default();
            let health = (hops[i].kind == HopKind::Ecmp).then(|| {
                let mut health = LinkHealth::default();
                for neighbor in prev.into_iter().chain(next) {
                    self.record_health(&hops[i], neighbor, &mut health);
                }
                health
            });
            if let Some(health) = health.filter(LinkHealth::is_degraded) {
                let label = |hop: Option<&Hop>| hop.map(|h| h.devices.join("/")).unwrap_or_default();
                tracing::info!("ECMP hop {} has {} links down", hops[i].devices.join("/"), health.down);
                warnings.push(Warning::DegradedPath {
                    from: label(prev),
                    to: label(next),
                    detail: format!(
                        "{} of {} parallel links across {} are down",
                        health.down,
                        health.up + health.down,
                        hops[i].devices.join("/")
                    ),
                });
            }

            let hop = &mut hops[i];
            if hop.ingress.is_empty() {
                hop.ingress = ingress;
            }
            if hop.egress.is_empty() {
                hop.egress = egress;
            }
            hop.link_health = health;
        }

        if let Some(first) = hops.first_mut() {
            first.ingress = vec![src.interface.clone()];
            let (egress, width) = self.source_egress(&src.device, src_vrf, dst_ip, warnings);
            if !egress.is_empty() {
                first.egress = egress;
            }
            first.ecmp_width = width;
        }
        if let Some(dst) = dst {
            if let Some(last) = hops.last_mut().filter(|h| h.contains(&dst.device)) {
                last.egress = vec![dst.interface.clone()];
            }
        }
    }

    /// Route lookup on the source device: egress interfaces and ECMP width when fanned out.
    fn source_egress(
        &self,
        device: &str,
        vrf: &str,
        ip: IpAddr,
        warnings: &mut Vec<Warning>,
    ) -> (Vec<String>, Option<usize>) {
        let Some(snapshot) = self.snapshots.get(device) else {
            return (Vec::new(), None);
        };
        match RouteResolver::new(device, &snapshot.routes).resolve(vrf, ip) {
            Resolution::Route(route) => {
                warnings.extend(route.warnings.iter().cloned());
                let width = route.is_ecmp().then_some(route.next_hops.len());
                (route.egress_interfaces(), width)
            }
            Resolution::NoRoute { warnings: resolve_warnings } => {
                warnings.extend(resolve_warnings);
                tracing::debug!("{} has no cached route to {} in VRF {}", device, ip, vrf);
                warnings.push(Warning::NoRoute {
                    device: device.to_string(),
                    vrf: vrf.to_string(),
                    ip,
                });
                (Vec::new(), None)
            }
        }
    }

    /// Interfaces of `hop` on confirmed links toward `other`.
    fn facing_interfaces(&self, hop: &Hop, other: &Hop) -> Vec<String> {
        let qualify = hop.devices.len() > 1;
        let mut interfaces = Vec::new();
        for device in &hop.devices {
            for peer in &other.devices {
                for link in self.graph.links_between(device, peer) {
                    if let Some(iface) = link.iface_on(device) {
                        interfaces.push(if qualify {
                            format!("{}:{}", device, iface)
                        } else {
                            iface.to_string()
                        });
                    }
                }
            }
        }
        interfaces.sort();
        interfaces.dedup();
        interfaces
    }

    fn record_health(&self, hop: &Hop, other: &Hop, health: &mut LinkHealth) {
        for device in &hop.devices {
            for peer in &other.devices {
                for link in self.graph.links_between(device, peer) {
                    health.record(link);
                }
            }
        }
    }
}

use std::{
    collections::{BTreeMap, BTreeSet},
    net::IpAddr,
};

use crate::{
    error::Warning,
    network::{forwarding::DeviceSnapshot, network_graph::TopologyGraph},
    trace::path::LOCAL_PORT,
};

/// The device an address belongs to, and where it is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner {
    pub device: String,
    /// Host-facing interface, or `local` for a loopback.
    pub interface: String,
    /// VRF of the ARP entry that placed the address; `None` for loopbacks.
    pub vrf: Option<String>,
}

#[derive(Debug, Clone)]
struct Candidate<'a> {
    device: &'a str,
    interface: &'a str,
    vrf: &'a str,
    local: bool,
    preferred_vrf: bool,
    leaf: bool,
    confirmed: bool,
}

impl Candidate<'_> {
    /// Lower sorts first.
    fn rank(&self) -> (bool, bool, bool, bool, &str) {
        (!self.local, !self.preferred_vrf, !self.leaf, !self.confirmed, self.device)
    }
}

/// Finds the device owning `ip`.
///
/// A loopback match wins outright. Otherwise ARP entries across all devices are
/// ranked: locally attached (not learned over the overlay, not on a fabric uplink or a
/// bond of uplinks) first, then entries in `vrf`, then leaves, then confirmed neighbour
/// state, then hostname. More than one device with a local entry is reported.
pub fn resolve_owner(
    graph: &TopologyGraph,
    snapshots: &BTreeMap<String, DeviceSnapshot>,
    ip: IpAddr,
    vrf: &str,
) -> (Option<Owner>, Vec<Warning>) {
    let mut warnings = Vec::new();

    let loopback_owners: Vec<&str> = graph
        .devices()
        .filter(|device| device.owns_loopback(&ip))
        .map(|device| device.hostname.as_str())
        .collect();
    if let Some((chosen, alternates)) = loopback_owners.split_first() {
        if !alternates.is_empty() {
            warnings.push(Warning::AmbiguousOwner {
                ip,
                chosen: chosen.to_string(),
                alternates: alternates.iter().map(|s| s.to_string()).collect(),
            });
        }
        let owner = Owner {
            device: chosen.to_string(),
            interface: LOCAL_PORT.to_string(),
            vrf: None,
        };
        return (Some(owner), warnings);
    }

    let mut candidates: Vec<Candidate> = Vec::new();
    for (hostname, snapshot) in snapshots {
        let Some(device) = graph.device(hostname) else {
            continue;
        };
        for entry in snapshot.arp_entries_for(&ip) {
            let uplink = snapshot
                .member_interfaces(&entry.interface)
                .iter()
                .any(|member| graph.is_fabric_interface(hostname, member));
            candidates.push(Candidate {
                device: hostname,
                interface: &entry.interface,
                vrf: &entry.vrf,
                local: !uplink && !snapshot.is_overlay_entry(entry),
                preferred_vrf: entry.vrf == vrf,
                leaf: device.is_leaf(),
                confirmed: entry.state.is_confirmed(),
            });
        }
    }
    candidates.sort_by(|x, y| x.rank().cmp(&y.rank()));

    let Some(best) = candidates.first() else {
        return (None, warnings);
    };

    let local_devices: BTreeSet<&str> = candidates.iter().filter(|c| c.local).map(|c| c.device).collect();
    if local_devices.len() > 1 {
        let alternates: Vec<String> = local_devices
            .iter()
            .filter(|d| **d != best.device)
            .map(|d| d.to_string())
            .collect();
        tracing::warn!("{} is attached to several devices, using {}", ip, best.device);
        warnings.push(Warning::AmbiguousOwner {
            ip,
            chosen: best.device.to_string(),
            alternates,
        });
    }

    let owner = Owner {
        device: best.device.to_string(),
        interface: best.interface.to_string(),
        vrf: Some(best.vrf.to_string()),
    };
    (Some(owner), warnings)
}

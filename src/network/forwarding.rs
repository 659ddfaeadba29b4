/*!
Per-device forwarding state as captured by the external collector.

These are the strongly typed counterparts of the loosely typed snapshot JSON;
`parsers::snapshot` produces them and nothing in the engine mutates them afterwards.
*/

use std::{
    collections::{BTreeMap, BTreeSet},
    net::IpAddr,
};

use serde::{Deserialize, Serialize};

use crate::routing::table::RouteTable;

pub const DEFAULT_VRF: &str = "default";

/// Interface name prefixes used for VXLAN tunnel endpoints across common NOSes.
const OVERLAY_IFACE_PREFIXES: [&str; 4] = ["vxlan", "vni", "nve", "vtep"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NeighborState {
    Reachable,
    Stale,
    Delay,
    Probe,
    Permanent,
    Noarp,
    Incomplete,
    Failed,
    Unknown,
}

impl From<&str> for NeighborState {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "reachable" => NeighborState::Reachable,
            "stale" => NeighborState::Stale,
            "delay" => NeighborState::Delay,
            "probe" => NeighborState::Probe,
            "permanent" => NeighborState::Permanent,
            "noarp" => NeighborState::Noarp,
            "incomplete" => NeighborState::Incomplete,
            "failed" => NeighborState::Failed,
            _ => NeighborState::Unknown,
        }
    }
}

impl NeighborState {
    /// Whether the entry still says anything about where the address lives.
    pub fn is_usable(&self) -> bool {
        !matches!(self, NeighborState::Incomplete | NeighborState::Failed)
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, NeighborState::Reachable | NeighborState::Permanent | NeighborState::Noarp)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArpEntry {
    pub ip: IpAddr,
    pub mac: Option<String>,
    pub interface: String,
    pub vrf: String,
    pub state: NeighborState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacEntry {
    pub mac: String,
    pub vlan: Option<u16>,
    pub interface: String,
    /// Set when the MAC was learned over the overlay from a remote VTEP.
    pub remote_vtep: Option<IpAddr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VtepEntry {
    pub vni: u32,
    pub remote_ip: IpAddr,
    pub vrf: Option<String>,
}

/// Everything the collector captured for one device in one generation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub hostname: String,
    pub loopbacks: Vec<IpAddr>,
    pub arp: Vec<ArpEntry>,
    pub mac: Vec<MacEntry>,
    pub vteps: Vec<VtepEntry>,
    pub bonds: BTreeMap<String, Vec<String>>,
    pub routes: RouteTable,
}

impl DeviceSnapshot {
    /// VRFs present on the device: any VRF with a route table or an ARP entry.
    pub fn vrf_names(&self) -> BTreeSet<String> {
        let mut vrfs: BTreeSet<String> = self.routes.vrf_names().map(str::to_string).collect();
        vrfs.extend(self.arp.iter().map(|entry| entry.vrf.clone()));
        vrfs
    }

    pub fn arp_entries_for<'a>(&'a self, ip: &'a IpAddr) -> impl Iterator<Item = &'a ArpEntry> + 'a {
        self.arp
            .iter()
            .filter(move |entry| &entry.ip == ip && entry.state.is_usable())
    }

    /// Members of `iface` when it is a bond, otherwise the interface itself.
    pub fn member_interfaces<'a>(&'a self, iface: &'a str) -> Vec<&'a str> {
        match self.bonds.get(iface) {
            Some(members) if !members.is_empty() => members.iter().map(String::as_str).collect(),
            _ => vec![iface],
        }
    }

    pub fn is_overlay_interface(&self, iface: &str) -> bool {
        let lower = iface.to_ascii_lowercase();
        OVERLAY_IFACE_PREFIXES.iter().any(|prefix| lower.starts_with(prefix))
    }

    /// True when the entry was learned over VXLAN rather than from a locally attached host.
    pub fn is_overlay_entry(&self, entry: &ArpEntry) -> bool {
        if self.is_overlay_interface(&entry.interface) {
            return true;
        }
        match &entry.mac {
            Some(mac) => self
                .mac
                .iter()
                .any(|m| m.mac.eq_ignore_ascii_case(mac) && m.remote_vtep.is_some()),
            None => false,
        }
    }
}

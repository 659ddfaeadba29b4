use std::{
    collections::{BTreeMap, HashMap},
    fmt::Display,
    net::IpAddr,
};

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

/// Route source, ordered by conventional precedence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteProtocol {
    Connected,
    Static,
    Dynamic(String),
}

impl RouteProtocol {
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "kernel" | "connected" | "direct" | "local" | "link" => RouteProtocol::Connected,
            "static" | "boot" => RouteProtocol::Static,
            other => RouteProtocol::Dynamic(other.to_string()),
        }
    }

    /// Lower wins: directly-connected > static > dynamic.
    pub fn precedence(&self) -> u8 {
        match self {
            RouteProtocol::Connected => 0,
            RouteProtocol::Static => 1,
            RouteProtocol::Dynamic(_) => 2,
        }
    }
}

impl Display for RouteProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteProtocol::Connected => write!(f, "connected"),
            RouteProtocol::Static => write!(f, "static"),
            RouteProtocol::Dynamic(name) => write!(f, "{}", name),
        }
    }
}

/// A resolved forwarding target. Connected routes carry only an interface.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NextHop {
    pub gateway: Option<IpAddr>,
    pub interface: Option<String>,
}

impl NextHop {
    pub fn new(gateway: Option<IpAddr>, interface: Option<&str>) -> Self {
        Self {
            gateway,
            interface: interface.map(str::to_string),
        }
    }
}

impl Display for NextHop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.gateway, &self.interface) {
            (Some(gw), Some(dev)) => write!(f, "via {} dev {}", gw, dev),
            (Some(gw), None) => write!(f, "via {}", gw),
            (None, Some(dev)) => write!(f, "dev {}", dev),
            (None, None) => write!(f, "unspecified"),
        }
    }
}

/// How a route names its next hop(s).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NextHopRef {
    Direct(NextHop),
    /// Inline ECMP list (`nexthops` in iproute2 output).
    Multipath(Vec<NextHop>),
    /// Reference into the device's nexthop-object table.
    Group(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    pub vrf: String,
    pub prefix: IpNetwork,
    pub next_hop: NextHopRef,
    pub out_interface: Option<String>,
    pub protocol: RouteProtocol,
    pub metric: u32,
}

impl RouteEntry {
    pub fn is_default(&self) -> bool {
        self.prefix.prefix() == 0
    }
}

/// A nexthop object: either a single via/dev or a group of other object ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NexthopObject {
    Single(NextHop),
    Group(Vec<u32>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NexthopTable {
    entries: HashMap<u32, NexthopObject>,
}

impl NexthopTable {
    pub fn insert(&mut self, id: u32, object: NexthopObject) {
        self.entries.insert(id, object);
    }

    pub fn get(&self, id: u32) -> Option<&NexthopObject> {
        self.entries.get(&id)
    }
}

/// All VRF route tables of one device plus the nexthop objects they share.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTable {
    vrfs: BTreeMap<String, Vec<RouteEntry>>,
    pub nexthops: NexthopTable,
}

impl RouteTable {
    pub fn new(nexthops: NexthopTable) -> Self {
        Self {
            vrfs: BTreeMap::new(),
            nexthops,
        }
    }

    /// Adds an entry under its own VRF, creating the VRF table on first use.
    pub fn push(&mut self, entry: RouteEntry) {
        self.vrfs.entry(entry.vrf.clone()).or_default().push(entry);
    }

    /// Registers a VRF even when it has no entries yet.
    pub fn ensure_vrf(&mut self, vrf: &str) {
        self.vrfs.entry(vrf.to_string()).or_default();
    }

    pub fn entries(&self, vrf: &str) -> &[RouteEntry] {
        self.vrfs.get(vrf).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_vrf(&self, vrf: &str) -> bool {
        self.vrfs.contains_key(vrf)
    }

    pub fn vrf_names(&self) -> impl Iterator<Item = &str> {
        self.vrfs.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_precedence() {
        assert!(RouteProtocol::from_name("kernel").precedence() < RouteProtocol::from_name("static").precedence());
        assert!(RouteProtocol::from_name("static").precedence() < RouteProtocol::from_name("bgp").precedence());
        assert_eq!(RouteProtocol::from_name("BGP"), RouteProtocol::Dynamic("bgp".to_string()));
    }

    #[test]
    fn test_route_table_groups_by_vrf() {
        let mut table = RouteTable::default();
        table.ensure_vrf("tenant-2");
        table.push(RouteEntry {
            vrf: "tenant-1".to_string(),
            prefix: "0.0.0.0/0".parse().unwrap(),
            next_hop: NextHopRef::Group(10),
            out_interface: None,
            protocol: RouteProtocol::Static,
            metric: 0,
        });
        assert_eq!(table.entries("tenant-1").len(), 1);
        assert!(table.entries("tenant-1")[0].is_default());
        assert!(table.has_vrf("tenant-2"));
        assert!(table.entries("missing").is_empty());
        assert_eq!(table.vrf_names().collect::<Vec<_>>(), vec!["tenant-1", "tenant-2"]);
    }
}

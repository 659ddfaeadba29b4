/*!
This module defines structs that can be deserialized from one device's entry in
the collector bundle, and their conversion into `DeviceSnapshot`.

JSON structure (every key optional):
{
    "loopbacks": ["10.0.0.1"],
    "arp": [{"ip", "mac"|"lladdr", "interface"|"dev", "vrf", "state": "REACHABLE" | ["REACHABLE"]}],
    "mac": [{"mac", "vlan", "interface"|"dev", "remote_vtep"|"dst"}],
    "vtep": [{"vni", "remote_ip"|"remote", "vrf"}],
    "bonds": {"bond1": ["swp1", "swp2"]},
    "routes": {
        "<vrf>": [{"dst": "10.0.0.0/24" | "default" | "10.0.0.1", "gateway", "dev",
                   "protocol", "metric", "nhid", "type",
                   "nexthops": [{"gateway", "dev"}]}]
    },
    "nexthops": [{"id", "gateway", "dev", "group": [{"id"}]}]
}

Route and nexthop shapes follow iproute2's `-j` output, which most collectors pass through.
*/

use std::{collections::BTreeMap, net::IpAddr};

use ipnetwork::IpNetwork;
use serde::Deserialize;
use thiserror::Error;

use crate::{
    network::forwarding::{ArpEntry, DEFAULT_VRF, DeviceSnapshot, MacEntry, NeighborState, VtepEntry},
    routing::table::{NextHop, NextHopRef, NexthopObject, NexthopTable, RouteEntry, RouteProtocol, RouteTable},
};

/// Route types that never forward traffic anywhere.
const NON_FORWARDING_ROUTE_TYPES: [&str; 4] = ["blackhole", "unreachable", "prohibit", "throw"];

#[derive(Error, Debug)]
pub enum SnapshotParseError {
    #[error("Invalid IP address: {0}")]
    InvalidAddress(String),
    #[error("Invalid IP prefix: {0}")]
    InvalidPrefix(String),
    #[error("Route {0} in VRF {1} has no next hop")]
    MissingNextHop(String, String),
    #[error("Malformed device snapshot: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Accepts either `"REACHABLE"` or `["REACHABLE", ...]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn first(&self) -> Option<&str> {
        match self {
            OneOrMany::One(s) => Some(s),
            OneOrMany::Many(list) => list.first().map(String::as_str),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct JsonDeviceSnapshot {
    #[serde(default)]
    loopbacks: Vec<String>,
    #[serde(default)]
    arp: Vec<JsonArpEntry>,
    #[serde(default)]
    mac: Vec<JsonMacEntry>,
    #[serde(default, alias = "vteps")]
    vtep: Vec<JsonVtepEntry>,
    #[serde(default)]
    bonds: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    routes: BTreeMap<String, Vec<JsonRoute>>,
    #[serde(default)]
    nexthops: Vec<JsonNexthop>,
}

#[derive(Debug, Deserialize)]
struct JsonArpEntry {
    #[serde(alias = "dst")]
    ip: String,
    #[serde(default, alias = "lladdr")]
    mac: Option<String>,
    #[serde(alias = "dev")]
    interface: String,
    #[serde(default)]
    vrf: Option<String>,
    #[serde(default)]
    state: Option<OneOrMany>,
}

#[derive(Debug, Deserialize)]
struct JsonMacEntry {
    mac: String,
    #[serde(default)]
    vlan: Option<u16>,
    #[serde(alias = "dev", alias = "ifname")]
    interface: String,
    #[serde(default, alias = "dst")]
    remote_vtep: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JsonVtepEntry {
    vni: u32,
    #[serde(alias = "remote")]
    remote_ip: String,
    #[serde(default)]
    vrf: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JsonRoute {
    dst: String,
    #[serde(default)]
    gateway: Option<String>,
    #[serde(default)]
    dev: Option<String>,
    #[serde(default)]
    protocol: Option<String>,
    #[serde(default)]
    metric: Option<u32>,
    #[serde(default)]
    nhid: Option<u32>,
    #[serde(default, rename = "type")]
    route_type: Option<String>,
    #[serde(default)]
    nexthops: Vec<JsonRouteNexthop>,
}

#[derive(Debug, Deserialize)]
struct JsonRouteNexthop {
    #[serde(default)]
    gateway: Option<String>,
    #[serde(default)]
    dev: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JsonNexthop {
    id: u32,
    #[serde(default)]
    gateway: Option<String>,
    #[serde(default)]
    dev: Option<String>,
    #[serde(default)]
    group: Vec<JsonGroupMember>,
}

#[derive(Debug, Deserialize)]
struct JsonGroupMember {
    id: u32,
}

impl JsonDeviceSnapshot {
    pub fn from_value(value: serde_json::Value) -> Result<Self, SnapshotParseError> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn try_into_snapshot(self, hostname: &str) -> Result<DeviceSnapshot, SnapshotParseError> {
        let loopbacks = self
            .loopbacks
            .iter()
            .map(|raw| parse_address(raw))
            .collect::<Result<Vec<_>, _>>()?;

        let mut arp = Vec::with_capacity(self.arp.len());
        for entry in self.arp {
            arp.push(ArpEntry {
                ip: parse_address(&entry.ip)?,
                mac: entry.mac,
                interface: entry.interface,
                vrf: normalize_vrf(entry.vrf.as_deref()),
                state: entry
                    .state
                    .as_ref()
                    .and_then(OneOrMany::first)
                    .map(NeighborState::from)
                    .unwrap_or(NeighborState::Unknown),
            });
        }

        let mut mac = Vec::with_capacity(self.mac.len());
        for entry in self.mac {
            mac.push(MacEntry {
                mac: entry.mac,
                vlan: entry.vlan,
                interface: entry.interface,
                remote_vtep: entry.remote_vtep.as_deref().map(parse_address).transpose()?,
            });
        }

        let mut vteps = Vec::with_capacity(self.vtep.len());
        for entry in self.vtep {
            vteps.push(VtepEntry {
                vni: entry.vni,
                remote_ip: parse_address(&entry.remote_ip)?,
                vrf: entry.vrf,
            });
        }

        let mut nexthops = NexthopTable::default();
        for nh in self.nexthops {
            let object = if nh.group.is_empty() {
                NexthopObject::Single(NextHop {
                    gateway: nh.gateway.as_deref().map(parse_address).transpose()?,
                    interface: nh.dev,
                })
            } else {
                NexthopObject::Group(nh.group.iter().map(|m| m.id).collect())
            };
            nexthops.insert(nh.id, object);
        }

        let mut routes = RouteTable::new(nexthops);
        for (vrf, entries) in self.routes {
            let vrf = normalize_vrf(Some(&vrf));
            routes.ensure_vrf(&vrf);
            for route in entries {
                if let Some(entry) = route.try_into_entry(&vrf)? {
                    routes.push(entry);
                }
            }
        }

        Ok(DeviceSnapshot {
            hostname: hostname.to_string(),
            loopbacks,
            arp,
            mac,
            vteps,
            bonds: self.bonds,
            routes,
        })
    }
}

impl JsonRoute {
    fn try_into_entry(self, vrf: &str) -> Result<Option<RouteEntry>, SnapshotParseError> {
        if let Some(kind) = &self.route_type {
            if NON_FORWARDING_ROUTE_TYPES.contains(&kind.to_ascii_lowercase().as_str()) {
                tracing::debug!("Skipping {} route {} in VRF {}", kind, self.dst, vrf);
                return Ok(None);
            }
        }

        let prefix = parse_prefix(&self.dst)?;
        let gateway = self.gateway.as_deref().map(parse_address).transpose()?;

        let next_hop = if let Some(id) = self.nhid {
            NextHopRef::Group(id)
        } else if !self.nexthops.is_empty() {
            let mut list = Vec::with_capacity(self.nexthops.len());
            for nh in &self.nexthops {
                list.push(NextHop {
                    gateway: nh.gateway.as_deref().map(parse_address).transpose()?,
                    interface: nh.dev.clone(),
                });
            }
            NextHopRef::Multipath(list)
        } else if gateway.is_some() || self.dev.is_some() {
            NextHopRef::Direct(NextHop {
                gateway,
                interface: self.dev.clone(),
            })
        } else {
            return Err(SnapshotParseError::MissingNextHop(self.dst, vrf.to_string()));
        };

        // iproute2 omits `protocol` for boot-time routes; a route with only a device is connected.
        let protocol = match self.protocol.as_deref() {
            Some(name) => RouteProtocol::from_name(name),
            None if gateway.is_none() && self.nhid.is_none() && self.nexthops.is_empty() => {
                RouteProtocol::Connected
            }
            None => RouteProtocol::Static,
        };

        Ok(Some(RouteEntry {
            vrf: vrf.to_string(),
            prefix,
            next_hop,
            out_interface: self.dev,
            protocol,
            metric: self.metric.unwrap_or(0),
        }))
    }
}

fn parse_address(raw: &str) -> Result<IpAddr, SnapshotParseError> {
    raw.trim()
        .parse()
        .map_err(|_| SnapshotParseError::InvalidAddress(raw.to_string()))
}

/// `default`, CIDR notation, or a bare address meaning a host route.
fn parse_prefix(raw: &str) -> Result<IpNetwork, SnapshotParseError> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("default") {
        return Ok(IpNetwork::V4(ipnetwork::Ipv4Network::new(
            std::net::Ipv4Addr::UNSPECIFIED,
            0,
        )
        .map_err(|_| SnapshotParseError::InvalidPrefix(raw.to_string()))?));
    }
    if trimmed.contains('/') {
        return trimmed
            .parse()
            .map_err(|_| SnapshotParseError::InvalidPrefix(raw.to_string()));
    }
    parse_address(trimmed).map(IpNetwork::from)
}

/// The kernel's main table and an absent VRF both mean the default VRF.
fn normalize_vrf(vrf: Option<&str>) -> String {
    match vrf.map(str::trim) {
        None | Some("") | Some("main") | Some("default") => DEFAULT_VRF.to_string(),
        Some(name) => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::routing::RouteResolver;

    fn parse(value: serde_json::Value) -> Result<DeviceSnapshot, SnapshotParseError> {
        JsonDeviceSnapshot::from_value(value)?.try_into_snapshot("leaf-a")
    }

    #[test]
    fn test_full_device_snapshot() {
        let snapshot = parse(json!({
            "loopbacks": ["10.0.0.1"],
            "arp": [
                {"ip": "172.16.1.10", "mac": "aa:aa:aa:00:00:01", "interface": "swp10", "vrf": "tenant-1", "state": "REACHABLE"},
                {"dst": "172.16.1.11", "lladdr": "aa:aa:aa:00:00:02", "dev": "swp11", "vrf": "tenant-1", "state": ["STALE"]}
            ],
            "mac": [{"mac": "aa:aa:aa:00:00:09", "vlan": 101, "dev": "vxlan101", "dst": "10.0.0.2"}],
            "vtep": [{"vni": 101, "remote": "10.0.0.2"}],
            "bonds": {"bond1": ["swp10", "swp11"]},
            "routes": {
                "main": [{"dst": "10.0.0.2", "gateway": "10.10.1.1", "dev": "swp1", "protocol": "bgp"}],
                "tenant-1": [
                    {"dst": "172.16.1.0/24", "dev": "vlan101", "protocol": "kernel"},
                    {"dst": "default", "nhid": 100, "protocol": "bgp", "metric": 20}
                ]
            },
            "nexthops": [
                {"id": 100, "group": [{"id": 101}, {"id": 102}]},
                {"id": 101, "gateway": "10.10.1.1", "dev": "swp1"},
                {"id": 102, "gateway": "10.10.1.5", "dev": "swp2"}
            ]
        }))
        .unwrap();

        assert_eq!(snapshot.loopbacks, vec!["10.0.0.1".parse::<IpAddr>().unwrap()]);
        assert_eq!(snapshot.arp[1].state, NeighborState::Stale);
        assert_eq!(snapshot.arp[0].vrf, "tenant-1");
        assert_eq!(snapshot.mac[0].remote_vtep, Some("10.0.0.2".parse().unwrap()));
        assert_eq!(snapshot.routes.entries("default").len(), 1);
        assert_eq!(snapshot.routes.entries("default")[0].prefix.prefix(), 32);
        assert_eq!(snapshot.routes.entries("tenant-1")[0].protocol, RouteProtocol::Connected);
        assert!(snapshot.vrf_names().contains("tenant-1"));

        let resolver = RouteResolver::new("leaf-a", &snapshot.routes);
        let resolution = resolver.default_route("tenant-1");
        assert_eq!(resolution.route().unwrap().next_hops.len(), 2);
    }

    #[test]
    fn test_bad_address_fails_the_device() {
        let result = parse(json!({ "loopbacks": ["10.0.0.300"] }));
        assert!(matches!(result, Err(SnapshotParseError::InvalidAddress(_))));
    }

    #[test]
    fn test_route_without_next_hop_fails_the_device() {
        let result = parse(json!({ "routes": { "tenant-1": [{"dst": "10.1.0.0/16"}] } }));
        assert!(matches!(result, Err(SnapshotParseError::MissingNextHop(_, _))));
    }

    #[test]
    fn test_blackhole_routes_are_skipped() {
        let snapshot = parse(json!({
            "routes": { "tenant-1": [{"dst": "10.1.0.0/16", "type": "blackhole"}] }
        }))
        .unwrap();
        assert!(snapshot.routes.entries("tenant-1").is_empty());
        assert!(snapshot.routes.has_vrf("tenant-1"));
    }

    #[test]
    fn test_wrong_shape_is_malformed() {
        let result = parse(json!({ "arp": "not-a-list" }));
        assert!(matches!(result, Err(SnapshotParseError::Malformed(_))));
    }
}

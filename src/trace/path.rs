use std::{fmt::Display, net::IpAddr};

use serde::{Deserialize, Serialize};

use crate::{
    error::Warning,
    network::{device::Tier, link::LinkHealth},
};

/// Interface name used for traffic that starts or ends on the device itself.
pub const LOCAL_PORT: &str = "local";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    LocalSwitching,
    SamePod,
    CrossPod,
    InterVrf,
    ExternalDestination,
}

impl Display for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Scenario::LocalSwitching => "local-switching",
            Scenario::SamePod => "same-pod",
            Scenario::CrossPod => "cross-pod",
            Scenario::InterVrf => "inter-vrf",
            Scenario::ExternalDestination => "external-destination",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HopKind {
    /// A single fabric device.
    Device,
    /// Parallel devices the traffic is hashed across.
    Ecmp,
    /// The off-fabric next hop a border leaf leaks routes through.
    ExternalGateway,
    /// Anything beyond the fabric.
    ExternalNetwork,
}

/// One step of a path. ECMP hops list every parallel device and qualify their
/// interfaces as `device:iface`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hop {
    pub devices: Vec<String>,
    pub kind: HopKind,
    pub tier: Option<Tier>,
    pub ingress: Vec<String>,
    pub egress: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_health: Option<LinkHealth>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ecmp_width: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gateways: Vec<IpAddr>,
}

impl Hop {
    /// A fabric hop; more than one device makes it an ECMP fan-out.
    pub fn fabric(devices: Vec<String>, tier: Option<Tier>) -> Self {
        let kind = if devices.len() > 1 { HopKind::Ecmp } else { HopKind::Device };
        let ecmp_width = (devices.len() > 1).then_some(devices.len());
        Self {
            devices,
            kind,
            tier,
            ingress: Vec::new(),
            egress: Vec::new(),
            link_health: None,
            ecmp_width,
            gateways: Vec::new(),
        }
    }

    pub fn external(kind: HopKind, gateways: Vec<IpAddr>) -> Self {
        Self {
            devices: Vec::new(),
            kind,
            tier: None,
            ingress: Vec::new(),
            egress: Vec::new(),
            link_health: None,
            ecmp_width: (gateways.len() > 1).then_some(gateways.len()),
            gateways,
        }
    }

    pub fn is_fabric(&self) -> bool {
        matches!(self.kind, HopKind::Device | HopKind::Ecmp)
    }

    pub fn contains(&self, device: &str) -> bool {
        self.devices.iter().any(|d| d == device)
    }
}

/// The answer to a trace query. Built per request and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathTrace {
    pub scenario: Scenario,
    pub src_device: String,
    pub dst_device: Option<String>,
    pub hops: Vec<Hop>,
    pub vrf_path: Vec<String>,
    pub hop_count: usize,
    pub warnings: Vec<Warning>,
}

impl PathTrace {
    pub fn new(
        scenario: Scenario,
        src_device: String,
        dst_device: Option<String>,
        hops: Vec<Hop>,
        vrf_path: Vec<String>,
        warnings: Vec<Warning>,
    ) -> Self {
        Self {
            scenario,
            src_device,
            dst_device,
            hop_count: hops.len(),
            hops,
            vrf_path,
            warnings,
        }
    }

    /// Every device named by any hop, in path order.
    pub fn devices(&self) -> impl Iterator<Item = &str> {
        self.hops.iter().flat_map(|hop| hop.devices.iter().map(String::as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_names() {
        assert_eq!(serde_json::to_value(Scenario::InterVrf).unwrap(), "inter-vrf");
        assert_eq!(
            serde_json::to_value(Scenario::ExternalDestination).unwrap(),
            Scenario::ExternalDestination.to_string()
        );
    }

    #[test]
    fn test_fabric_hop_kind() {
        let single = Hop::fabric(vec!["leaf-a".to_string()], Some(Tier::Leaf));
        assert_eq!(single.kind, HopKind::Device);
        assert_eq!(single.ecmp_width, None);

        let fan_out = Hop::fabric(vec!["spine-1".to_string(), "spine-2".to_string()], Some(Tier::Spine));
        assert_eq!(fan_out.kind, HopKind::Ecmp);
        assert_eq!(fan_out.ecmp_width, Some(2));

        let json = serde_json::to_value(&single).unwrap();
        assert!(json.get("link_health").is_none());
        assert!(json.get("gateways").is_none());
    }
}

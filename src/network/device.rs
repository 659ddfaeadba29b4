use std::{
    collections::BTreeSet,
    fmt::Display,
    net::IpAddr,
};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type PodId = u32;

/// Position of a device in the Clos hierarchy, inferred from adjacency alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Unknown,
    Leaf,
    Spine,
    Core,
}

impl Tier {
    /// Maps a BFS distance from the nearest seed leaf onto a tier.
    pub fn from_distance(distance: usize) -> Self {
        match distance {
            0 => Tier::Leaf,
            1 => Tier::Spine,
            _ => Tier::Core,
        }
    }

    /// Layer number used for monotonicity checks. `Unknown` has none.
    pub fn layer(&self) -> Option<usize> {
        match self {
            Tier::Unknown => None,
            Tier::Leaf => Some(0),
            Tier::Spine => Some(1),
            Tier::Core => Some(2),
        }
    }
}

impl Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Tier::Unknown => "unknown",
            Tier::Leaf => "leaf",
            Tier::Spine => "spine",
            Tier::Core => "core",
        };
        write!(f, "{}", name)
    }
}

/// A fabric switch, keyed by hostname.
///
/// Built fresh for every snapshot generation; classification fills in `tier`,
/// `pod`, `pods` and `border_vrfs` before the generation is published, after which
/// the device is only ever read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub hostname: String,
    /// Stable across generations, derived from the hostname.
    pub id: Uuid,
    pub loopbacks: BTreeSet<IpAddr>,
    pub vrfs: BTreeSet<String>,
    pub tier: Tier,
    /// Pod of a leaf.
    pub pod: Option<PodId>,
    /// Every pod the device serves. A leaf has exactly its own, a spine has one per pod of the leaves below it.
    pub pods: BTreeSet<PodId>,
    pub border_vrfs: BTreeSet<String>,
    /// Non-fabric LLDP neighbours (hosts, servers, external routers).
    pub endpoints: BTreeSet<String>,
    pub has_snapshot: bool,
    pub has_lldp: bool,
}

impl Device {
    pub fn new(hostname: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            id: device_uuid(hostname),
            loopbacks: BTreeSet::new(),
            vrfs: BTreeSet::new(),
            tier: Tier::Unknown,
            pod: None,
            pods: BTreeSet::new(),
            border_vrfs: BTreeSet::new(),
            endpoints: BTreeSet::new(),
            has_snapshot: false,
            has_lldp: false,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.tier == Tier::Leaf
    }

    pub fn is_border(&self, vrf: &str) -> bool {
        self.border_vrfs.contains(vrf)
    }

    pub fn owns_loopback(&self, ip: &IpAddr) -> bool {
        self.loopbacks.contains(ip)
    }
}

impl Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.hostname, self.tier)?;
        if let Some(pod) = self.pod {
            write!(f, " pod {}", pod)?;
        }
        if !self.border_vrfs.is_empty() {
            write!(
                f,
                " border for {}",
                self.border_vrfs.iter().cloned().collect::<Vec<_>>().join(", ")
            )?;
        }
        Ok(())
    }
}

pub fn device_uuid(hostname: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, hostname.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_from_distance_clamps_to_core() {
        assert_eq!(Tier::from_distance(0), Tier::Leaf);
        assert_eq!(Tier::from_distance(1), Tier::Spine);
        assert_eq!(Tier::from_distance(2), Tier::Core);
        assert_eq!(Tier::from_distance(7), Tier::Core);
    }

    #[test]
    fn test_device_id_is_stable_per_hostname() {
        assert_eq!(Device::new("leaf-a").id, Device::new("leaf-a").id);
        assert_ne!(Device::new("leaf-a").id, Device::new("leaf-b").id);
    }

    #[test]
    fn test_tier_serializes_lowercase() {
        assert_eq!(serde_json::to_value(Tier::Spine).unwrap(), "spine");
    }
}

use std::{cmp::Reverse, net::IpAddr};

use thiserror::Error;

use crate::{
    error::Warning,
    routing::table::{NextHop, NextHopRef, NexthopObject, RouteEntry, RouteTable},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("nexthop cycle through id {0}")]
    NexthopCycle(u32),
    #[error("nexthop group {0} resolved to no usable members")]
    EmptyGroup(u32),
}

/// Outcome of a lookup. `NoRoute` is an expected answer, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<'a> {
    NoRoute { warnings: Vec<Warning> },
    Route(ResolvedRoute<'a>),
}

impl<'a> Resolution<'a> {
    pub fn route(&self) -> Option<&ResolvedRoute<'a>> {
        match self {
            Resolution::Route(route) => Some(route),
            Resolution::NoRoute { .. } => None,
        }
    }

    pub fn is_no_route(&self) -> bool {
        matches!(self, Resolution::NoRoute { .. })
    }

    pub fn warnings(&self) -> &[Warning] {
        match self {
            Resolution::Route(route) => &route.warnings,
            Resolution::NoRoute { warnings } => warnings,
        }
    }

    pub fn into_warnings(self) -> Vec<Warning> {
        match self {
            Resolution::Route(route) => route.warnings,
            Resolution::NoRoute { warnings } => warnings,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoute<'a> {
    pub entry: &'a RouteEntry,
    /// Fully expanded next hops, in table order, without duplicates.
    pub next_hops: Vec<NextHop>,
    pub warnings: Vec<Warning>,
}

impl ResolvedRoute<'_> {
    pub fn is_ecmp(&self) -> bool {
        self.next_hops.len() > 1
    }

    pub fn gateways(&self) -> Vec<IpAddr> {
        let mut gateways: Vec<IpAddr> = self.next_hops.iter().filter_map(|nh| nh.gateway).collect();
        gateways.sort();
        gateways.dedup();
        gateways
    }

    pub fn egress_interfaces(&self) -> Vec<String> {
        let mut ifaces: Vec<String> = self
            .next_hops
            .iter()
            .filter_map(|nh| nh.interface.clone())
            .collect();
        ifaces.sort();
        ifaces.dedup();
        ifaces
    }
}

/// Longest-prefix-match over one device's VRF tables.
///
/// Candidates are ordered by prefix length (longest first), then lowest metric,
/// then protocol precedence, then table position, so a lookup is deterministic
/// for a fixed snapshot. An entry whose nexthop group cycles or resolves to nothing
/// is dropped with a warning and the next candidate is tried.
pub struct RouteResolver<'a> {
    device: &'a str,
    table: &'a RouteTable,
}

impl<'a> RouteResolver<'a> {
    pub fn new(device: &'a str, table: &'a RouteTable) -> Self {
        Self { device, table }
    }

    pub fn resolve(&self, vrf: &str, ip: IpAddr) -> Resolution<'a> {
        self.select(vrf, |entry| entry.prefix.contains(ip))
    }

    /// The IPv4 default route of `vrf`, if any.
    pub fn default_route(&self, vrf: &str) -> Resolution<'a> {
        self.select(vrf, |entry| entry.is_default() && entry.prefix.is_ipv4())
    }

    fn select<F>(&self, vrf: &str, matches: F) -> Resolution<'a>
    where
        F: Fn(&RouteEntry) -> bool,
    {
        let table: &'a RouteTable = self.table;
        let mut candidates: Vec<(usize, &'a RouteEntry)> = table
            .entries(vrf)
            .iter()
            .enumerate()
            .filter(|(_, entry)| matches(*entry))
            .collect();
        candidates.sort_by_key(|(position, entry)| {
            (
                Reverse(entry.prefix.prefix()),
                entry.metric,
                entry.protocol.precedence(),
                *position,
            )
        });

        let mut warnings = Vec::new();
        for (_, entry) in candidates {
            match self.expand(entry, &mut warnings) {
                Ok(next_hops) => {
                    return Resolution::Route(ResolvedRoute {
                        entry,
                        next_hops,
                        warnings,
                    });
                }
                Err(ResolveError::NexthopCycle(id)) => {
                    tracing::warn!(
                        "{}: nexthop cycle through {} for {} in VRF {}, dropping entry",
                        self.device,
                        id,
                        entry.prefix,
                        vrf
                    );
                    warnings.push(Warning::NexthopCycle {
                        device: self.device.to_string(),
                        vrf: vrf.to_string(),
                        prefix: entry.prefix.to_string(),
                        id,
                    });
                }
                Err(ResolveError::EmptyGroup(id)) => {
                    tracing::warn!(
                        "{}: nexthop group {} for {} in VRF {} has no members, dropping entry",
                        self.device,
                        id,
                        entry.prefix,
                        vrf
                    );
                    warnings.push(Warning::EmptyNexthopGroup {
                        device: self.device.to_string(),
                        vrf: vrf.to_string(),
                        prefix: entry.prefix.to_string(),
                        id,
                    });
                }
            }
        }
        Resolution::NoRoute { warnings }
    }

    /// Expands an entry's next hop reference into concrete next hops.
    pub fn expand(&self, entry: &RouteEntry, warnings: &mut Vec<Warning>) -> Result<Vec<NextHop>, ResolveError> {
        let mut out = Vec::new();
        match &entry.next_hop {
            NextHopRef::Direct(nh) => out.push(self.with_fallback_interface(nh, entry)),
            NextHopRef::Multipath(list) => {
                for nh in list {
                    push_unique(&mut out, self.with_fallback_interface(nh, entry));
                }
            }
            NextHopRef::Group(id) => {
                let mut stack = Vec::new();
                self.expand_id(*id, entry, &mut stack, &mut out, warnings)?;
                if out.is_empty() {
                    return Err(ResolveError::EmptyGroup(*id));
                }
            }
        }
        Ok(out)
    }

    fn expand_id(
        &self,
        id: u32,
        entry: &RouteEntry,
        stack: &mut Vec<u32>,
        out: &mut Vec<NextHop>,
        warnings: &mut Vec<Warning>,
    ) -> Result<(), ResolveError> {
        if stack.contains(&id) {
            return Err(ResolveError::NexthopCycle(id));
        }
        match self.table.nexthops.get(id) {
            None => {
                tracing::warn!(
                    "{}: {} in VRF {} references missing nexthop id {}",
                    self.device,
                    entry.prefix,
                    entry.vrf,
                    id
                );
                warnings.push(Warning::DanglingNexthop {
                    device: self.device.to_string(),
                    vrf: entry.vrf.clone(),
                    prefix: entry.prefix.to_string(),
                    id,
                });
            }
            Some(NexthopObject::Single(nh)) => push_unique(out, self.with_fallback_interface(nh, entry)),
            Some(NexthopObject::Group(members)) => {
                stack.push(id);
                for member in members {
                    self.expand_id(*member, entry, stack, out, warnings)?;
                }
                stack.pop();
            }
        }
        Ok(())
    }

    fn with_fallback_interface(&self, nh: &NextHop, entry: &RouteEntry) -> NextHop {
        if nh.interface.is_some() {
            nh.clone()
        } else {
            NextHop {
                gateway: nh.gateway,
                interface: entry.out_interface.clone(),
            }
        }
    }
}

fn push_unique(out: &mut Vec<NextHop>, nh: NextHop) {
    if !out.contains(&nh) {
        out.push(nh);
    }
}

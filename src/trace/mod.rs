/*!
Path tracing over one classified generation.

Structure:
- `owner`: maps an address to the fabric device it lives on (loopback or ARP).
- `path`: the `PathTrace` result and its hops.
- `tracer`: scenario selection and hop assembly.

A trace is a pure function of the generation it runs against. It fails only when the
source address belongs to no device; every other oddity degrades the answer and is
reported in `PathTrace::warnings`.
*/

pub mod owner;
pub mod path;
pub mod tracer;

use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use path::{Hop, HopKind, PathTrace, Scenario};
pub use tracer::Tracer;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TraceError {
    #[error("no device owns {0}: not a loopback and not in any ARP table")]
    UnknownIpOwner(IpAddr),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceRequest {
    pub src_ip: IpAddr,
    pub src_vrf: String,
    pub dst_ip: IpAddr,
    /// Defaults to the source VRF.
    #[serde(default)]
    pub dst_vrf: Option<String>,
    /// Forces both sides into one VRF and disables auto-correction.
    #[serde(default)]
    pub vrf_override: Option<String>,
}

impl TraceRequest {
    pub fn new(src_ip: IpAddr, src_vrf: &str, dst_ip: IpAddr, dst_vrf: Option<&str>) -> Self {
        Self {
            src_ip,
            src_vrf: src_vrf.to_string(),
            dst_ip,
            dst_vrf: dst_vrf.map(str::to_string),
            vrf_override: None,
        }
    }

    pub fn with_vrf_override(mut self, vrf: &str) -> Self {
        self.vrf_override = Some(vrf.to_string());
        self
    }

    /// Effective (source, destination) VRFs before auto-correction.
    pub fn vrfs(&self) -> (String, String) {
        match &self.vrf_override {
            Some(vrf) => (vrf.clone(), vrf.clone()),
            None => (
                self.src_vrf.clone(),
                self.dst_vrf.clone().unwrap_or_else(|| self.src_vrf.clone()),
            ),
        }
    }
}

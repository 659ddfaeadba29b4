/*!
Engine-wide error and warning types.

Structural anomalies never abort a classification pass or a trace; they are
collected as `Warning`s and returned next to the result. Only errors that make
a request meaningless (no generation, unknown source owner) surface as `Err`.
*/

use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{parsers::bundle::SnapshotError, trace::TraceError};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Trace(#[from] TraceError),
    #[error("no snapshot generation has been published yet")]
    NoGeneration,
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("publishing a generation failed: {0}")]
    Publish(String),
}

/// A non-fatal anomaly detected while building a generation or answering a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    #[error("no usable snapshot for {device}: {reason}")]
    MissingSnapshotData { device: String, reason: String },
    #[error("LLDP row {row} skipped: {reason}")]
    MalformedLldpRow { row: usize, reason: String },
    #[error("{device} has no LLDP reports of its own")]
    MissingLldpData { device: String },
    #[error("one-sided LLDP report {device}:{local_iface} -> {remote_device}:{remote_iface}")]
    UnconfirmedLink {
        device: String,
        local_iface: String,
        remote_device: String,
        remote_iface: String,
    },
    #[error("ambiguous classification for {device}: {detail}")]
    ClassificationAmbiguous { device: String, detail: String },
    #[error("topology anomaly at {device}: {detail}")]
    TopologyAnomaly { device: String, detail: String },
    #[error("{leaf} shares a spine majority with no other leaf, placed alone in pod {pod}")]
    SingletonPod { leaf: String, pod: u32 },
    #[error("no majority default-route signature in VRF {vrf}, border leaves left unclassified")]
    BorderSignatureTie { vrf: String },
    #[error("{prefix} in VRF {vrf} on {device} references missing nexthop id {id}")]
    DanglingNexthop {
        device: String,
        vrf: String,
        prefix: String,
        id: u32,
    },
    #[error("nexthop group {id} used by {prefix} in VRF {vrf} on {device} has no members")]
    EmptyNexthopGroup {
        device: String,
        vrf: String,
        prefix: String,
        id: u32,
    },
    #[error("nexthop cycle through id {id} for {prefix} in VRF {vrf} on {device}, entry dropped")]
    NexthopCycle {
        device: String,
        vrf: String,
        prefix: String,
        id: u32,
    },
    #[error("no cached route to {ip} in VRF {vrf} on {device}")]
    NoRoute { device: String, vrf: String, ip: IpAddr },
    #[error("VRF auto-corrected from {from} to {to} for {ip}")]
    VrfAutoCorrected { ip: IpAddr, from: String, to: String },
    #[error("{ip} is attached to several devices, chose {chosen} over {alternates:?}")]
    AmbiguousOwner {
        ip: IpAddr,
        chosen: String,
        alternates: Vec<String>,
    },
    #[error("no border leaf known for VRF {vrf}")]
    NoBorderLeaf { vrf: String },
    #[error("pod of {device} is unknown: {detail}")]
    AmbiguousPod { device: String, detail: String },
    #[error("path {from} -> {to} degraded: {detail}")]
    DegradedPath { from: String, to: String, detail: String },
}

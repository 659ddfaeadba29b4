/*!
Topology inference and path tracing for LLDP-discovered Clos fabrics.

Data flows one way:

--- parsers module ---
Collector bundle (LLDP adjacency + per-device forwarding snapshots)
|
v
--- network module ---
Devices, bidirectionally confirmed links, topology graph
|
v
--- classify module ---
Tiers, pods and per-VRF border leaves
|
v
--- routing / trace modules ---
Longest-prefix-match lookups and hop-by-hop path simulation

The `topology` module ties these together into immutable generations that are
swapped atomically as new bundles arrive.
*/

pub mod classify;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod network;
pub mod parsers;
pub mod routing;
pub mod topology;
pub mod trace;

#[cfg(test)]
mod test_support;

pub use config::EngineConfig;
pub use error::{EngineError, Warning};
pub use topology::store::{Generation, SnapshotStore};
pub use trace::{PathTrace, TraceRequest};

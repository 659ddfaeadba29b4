/*
 * This module defines the fabric model shared by every engine stage:
 * devices, LLDP-derived links, per-device forwarding state and the
 * topology graph the classifiers walk.
 */

pub mod device;
pub mod forwarding;
pub mod hints;
pub mod link;
pub mod network_graph;

/*!
Per-VRF route tables and the longest-prefix-match resolver.

This module defines:
- `table`: strongly typed route entries and the nexthop-object table they may reference.
- `resolver`: LPM lookups with metric/protocol tie-breaking and ECMP group expansion.
*/

pub mod resolver;
pub mod table;

pub use resolver::{Resolution, ResolvedRoute, RouteResolver};
pub use table::{NextHop, NextHopRef, NexthopObject, NexthopTable, RouteEntry, RouteProtocol, RouteTable};

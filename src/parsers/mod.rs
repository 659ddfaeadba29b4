/*!
Collector wire formats.

The collector publishes loosely typed JSON. This module defines serde mirrors of
that JSON (`Json*` structs) and converts them into the strongly typed model in
`network` and `routing`. A device whose body fails to convert is reported as
missing data for that device only; the rest of the bundle is still used.
*/

pub mod bundle;
pub mod lldp;
pub mod snapshot;

pub use bundle::{SnapshotBundle, SnapshotError};
pub use lldp::LldpNeighbor;

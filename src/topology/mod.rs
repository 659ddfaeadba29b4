/*!
Topology module

Turns collector bundles into published, immutable generations.

Structure:
- `source`: the async `SnapshotSource` trait and its file-backed implementation.
- `store`: `Generation` (graph + classification for one bundle) and `SnapshotStore`,
           which swaps the current generation atomically.
- `watcher`: `SnapshotWatcher`, polling a source and publishing into a store.
*/

pub mod source;
pub mod store;
pub mod watcher;

pub use source::{FileSnapshotSource, SnapshotSource};
pub use store::{Generation, SnapshotStore};
pub use watcher::SnapshotWatcher;

//! Per-document projection engine: snapshot cache, address translation,
//! tombstone deletion, change batching, and the filesystem contract.

mod address;
mod engine;
mod events;
mod marker;
mod snapshot;
mod watch;

pub use engine::{DocumentEngine, EngineOptions};
pub use events::DEFAULT_FLUSH_INTERVAL;
pub use snapshot::{DocumentStat, Snapshot};

//! Generic in-memory cache primitives.

mod inflight;
mod read;
mod stats;
mod store;

pub(crate) use inflight::Inflight;
pub use read::{CacheRead, ReadSource};
pub use stats::CacheStats;
pub use store::CacheStore;

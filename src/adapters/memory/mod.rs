//! In-process adapters, used when no Redis URL is configured and in tests.

mod catalog;
mod queue;
mod tracker;

pub use catalog::InMemoryCatalog;
pub use queue::InMemoryJobQueue;
pub use tracker::InMemoryStatusTracker;

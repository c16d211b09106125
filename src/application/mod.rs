//! Application layer - Services that drive the pipeline through ports.

pub mod cleanup;
pub mod delivery;
pub mod ingest;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

//! Ports - trait definitions for every collaborator of the pipeline.

pub mod auth;
pub mod catalog;
pub mod encoder;
pub mod notify;
pub mod queue;
pub mod repository;
pub mod storage;

/// Error type adapters use to carry backend failures through a port.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

//! Crooner - transcodes uploaded videos into an HLS ladder and serves it.
//!
//! Hexagonal Architecture:
//! - domain/: Pure business logic (videos, ladder, addressing, hls, status, jobs, encoder)
//! - ports/: Trait definitions
//! - adapters/: Concrete implementations (in-memory, filesystem, Redis, HTTP)
//! - application/: Ingestion, workers, delivery and cleanup services
//! - config: Environment configuration
//!
//! # Features
//! - `redis` (default): Redis-backed queue, status tracker and catalog

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

pub use config::Config;
pub use domain::{hls, ladder};

//! Adapters for a single-host deployment: filesystem store, token auth,
//! status events, the HTTP API and the optional Redis backend.

pub mod auth;
pub mod events;
pub mod fs;
pub mod http;
#[cfg(feature = "redis")]
pub mod redis;

pub use auth::TokenAuthenticator;
pub use events::hub::EventHub;
pub use fs::FsStore;
pub use http::{router, AppState};
#[cfg(feature = "redis")]
pub use redis::RedisPool;

use async_trait::async_trait;
use axum::http::HeaderMap;

/// Decides whether a request may reach the streaming or operator routes.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn is_authenticated(&self, headers: &HeaderMap) -> bool;
}

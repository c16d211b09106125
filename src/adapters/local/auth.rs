use crate::ports::auth::Authenticator;
use async_trait::async_trait;
use axum::http::{header::AUTHORIZATION, HeaderMap};
use std::collections::HashSet;

/// Accepts `Authorization: Bearer <token>` for any configured token.
/// With no tokens configured every request is denied.
#[derive(Clone, Debug, Default)]
pub struct TokenAuthenticator {
    tokens: HashSet<String>,
}

impl TokenAuthenticator {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens
                .into_iter()
                .map(Into::into)
                .filter(|t: &String| !t.is_empty())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim())
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl Authenticator for TokenAuthenticator {
    async fn is_authenticated(&self, headers: &HeaderMap) -> bool {
        bearer_token(headers).is_some_and(|token| self.tokens.contains(token))
    }
}

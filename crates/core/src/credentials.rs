//! Bearer-token injection for outbound HTTP clients.

use async_trait::async_trait;

use crate::error::VigilError;

/// Supplies bearer tokens for a given audience (resource URL).
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn bearer_token(&self, audience: &str) -> Result<String, VigilError>;
}

/// Hands out one fixed token for every audience.
#[derive(Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

impl std::fmt::Debug for StaticTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenProvider").field("token", &"<redacted>").finish()
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn bearer_token(&self, _audience: &str) -> Result<String, VigilError> {
        if self.token.is_empty() {
            return Err(VigilError::Credential("static token is empty".into()));
        }
        Ok(self.token.clone())
    }
}

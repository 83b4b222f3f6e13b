//! Account collaborator
//!
//! Endpoints with `auth_type: account` authenticate with a session token and
//! address models by an account-specific numeric id resolved from a pricing
//! table, keyed by the caller-selected pricing strategy. Both concerns live
//! behind this trait; the executor consults it once per attempt.

use std::collections::HashMap;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::Error;

/// Credential and model-id source for account-authenticated endpoints.
#[async_trait]
pub trait AccountService: Send + Sync {
    /// Current session token for the `X-Auth-T` header.
    async fn session_token(&self) -> Result<SecretString, Error>;

    /// Resolve a model display name to the account-specific id under the
    /// given pricing strategy.
    async fn resolve_model_id(&self, model: &str, strategy: &str) -> Result<String, Error>;
}

/// In-memory implementation for tests and hosts with static credentials.
#[derive(Default)]
pub struct StaticAccountService {
    token: Option<SecretString>,
    /// model → strategy → account model id
    model_ids: HashMap<String, HashMap<String, String>>,
}

impl StaticAccountService {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(SecretString::from(token.into())),
            model_ids: HashMap::new(),
        }
    }

    pub fn with_model_id(
        mut self,
        model: impl Into<String>,
        strategy: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        self.model_ids
            .entry(model.into())
            .or_default()
            .insert(strategy.into(), id.into());
        self
    }
}

#[async_trait]
impl AccountService for StaticAccountService {
    async fn session_token(&self) -> Result<SecretString, Error> {
        self.token
            .clone()
            .ok_or_else(|| Error::Config("account service has no session token".to_string()))
    }

    async fn resolve_model_id(&self, model: &str, strategy: &str) -> Result<String, Error> {
        self.model_ids
            .get(model)
            .and_then(|by_strategy| by_strategy.get(strategy))
            .cloned()
            .ok_or_else(|| {
                Error::Config(format!(
                    "cannot resolve account model id for '{model}' with strategy '{strategy}'"
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_service_resolves_by_strategy() {
        let svc = StaticAccountService::new("tok-1")
            .with_model_id("sketchwave", "bestPrice", "10041")
            .with_model_id("sketchwave", "fastest", "10042");
        assert_eq!(
            svc.resolve_model_id("sketchwave", "bestPrice").await.unwrap(),
            "10041"
        );
        assert!(svc.resolve_model_id("sketchwave", "cheapest").await.is_err());
    }
}

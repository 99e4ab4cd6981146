//! Named clients built from configuration.

use crate::config::AppConfig;
use crate::factory::new_sms_client;
use crate::rate_limiter::{RateLimitedClient, RateLimiter};
use sms_core::{SendRequest, SendResponse, SmsClient, SmsError};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Clients addressed by the name they were configured under.
#[derive(Clone, Default)]
pub struct SenderRegistry {
    clients: HashMap<String, Arc<dyn SmsClient>>,
}

impl SenderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every client in `config.providers`.
    ///
    /// All clients share one HTTP client configured from `config.http`. When
    /// rate limiting is enabled each client is wrapped in a
    /// [`RateLimitedClient`] keyed `provider:name`.
    pub fn from_config(config: &AppConfig) -> Result<Self, SmsError> {
        let http = config
            .http
            .build_client()
            .map_err(|e| SmsError::Http(e.to_string()))?;
        let limiter = config
            .rate_limit
            .enabled
            .then(|| Arc::new(RateLimiter::new(config.rate_limit.clone())));

        let mut registry = Self::new();
        for (name, provider_config) in &config.providers {
            let client = new_sms_client(provider_config, &http).inspect_err(|e| {
                warn!("Cannot build SMS client {}: {}", name, e);
            })?;
            let client: Arc<dyn SmsClient> = match &limiter {
                Some(limiter) => Arc::new(RateLimitedClient::new(client, limiter.clone(), name)),
                None => client,
            };
            info!("Registered {} as {}", provider_config.provider, name);
            registry.insert(name.clone(), client);
        }
        Ok(registry)
    }

    /// Register `client` under `name`, returning the client it replaced.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        client: Arc<dyn SmsClient>,
    ) -> Option<Arc<dyn SmsClient>> {
        self.clients.insert(name.into(), client)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn SmsClient>> {
        self.clients.get(name).cloned()
    }

    /// Send through the client registered as `name`.
    pub async fn send(&self, name: &str, req: SendRequest<'_>) -> Result<SendResponse, SmsError> {
        let client = self
            .clients
            .get(name)
            .ok_or_else(|| SmsError::Invalid(format!("unknown sender: {}", name)))?;
        client.send(req).await
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.clients.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl std::fmt::Debug for SenderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SenderRegistry")
            .field("clients", &self.names())
            .finish()
    }
}

//! In-memory provider credential registry (§4.6).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::models::{RouteDecision, RouteReason};

/// Credentials for a single provider. Every field is optional since each
/// provider family uses a different subset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderCredentials {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub resource_name: Option<String>,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
}

/// A materialized call configuration: provider, model, plus credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub credentials: ProviderCredentials,
}

/// Read-mostly registry of `provider → credentials`, populated once at
/// startup.
#[derive(Debug, Default)]
pub struct ProviderPool {
    providers: HashMap<String, ProviderCredentials>,
}

impl ProviderPool {
    pub fn new() -> Self {
        Self { providers: HashMap::new() }
    }

    pub fn register(&mut self, provider: impl Into<String>, credentials: ProviderCredentials) {
        self.providers.insert(provider.into(), credentials);
    }

    pub fn is_available(&self, provider: &str) -> bool {
        self.providers.contains_key(provider)
    }

    /// Materializes a full call config, or `None` if the provider isn't
    /// registered.
    pub fn build_llm_config(&self, provider: &str, model: &str) -> Option<LlmConfig> {
        self.providers.get(provider).map(|creds| LlmConfig {
            provider: provider.to_string(),
            model: model.to_string(),
            credentials: creds.clone(),
        })
    }

    pub fn first_available(&self) -> Option<&str> {
        self.providers.keys().next().map(String::as_str)
    }

    /// Adjusts a routing decision for provider availability: if the chosen
    /// provider is absent, falls back to the first available provider
    /// (keeping the chosen model) with reason `fallback`; if none are
    /// available, passes through unchanged with reason `no_available_provider`.
    pub fn check_availability(&self, decision: RouteDecision) -> RouteDecision {
        if self.is_available(&decision.provider) {
            return decision;
        }

        match self.first_available() {
            Some(provider) => RouteDecision {
                provider: provider.to_string(),
                model: decision.model,
                reason: RouteReason::Fallback,
            },
            None => RouteDecision { reason: RouteReason::NoAvailableProvider, ..decision },
        }
    }
}

//! Explicit gateway credential storage.
//!
//! Provider secrets are loaded once at startup and injected into each
//! adapter at construction; nothing in the pipeline reads the environment
//! ambiently. Tests substitute a store built by hand.

use std::collections::HashMap;

use crate::error::{PaymentError, PaymentResult};
use crate::payments::types::Provider;

/// Credentials and connection settings for one gateway
#[derive(Debug, Clone)]
pub struct GatewayCredentials {
    pub secret_key: String,
    /// Pre-shared webhook hash for providers that use header equality
    /// instead of a computed signature (Flutterwave's `verif-hash`).
    pub webhook_secret: Option<String>,
    pub base_url: String,
    pub enabled: bool,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl GatewayCredentials {
    pub fn new(secret_key: String, base_url: String) -> Self {
        Self {
            secret_key,
            webhook_secret: None,
            base_url,
            enabled: true,
            timeout_secs: 30,
            max_retries: 2,
        }
    }
}

/// Read-only map of enabled-provider configuration
#[derive(Debug, Clone, Default)]
pub struct GatewayCredentialStore {
    entries: HashMap<Provider, GatewayCredentials>,
}

impl GatewayCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, provider: Provider, credentials: GatewayCredentials) {
        self.entries.insert(provider, credentials);
    }

    /// Credentials for a provider, failing if it is unconfigured or disabled
    pub fn get(&self, provider: Provider) -> PaymentResult<&GatewayCredentials> {
        match self.entries.get(&provider) {
            Some(creds) if creds.enabled => Ok(creds),
            Some(_) => Err(PaymentError::GatewayConfig {
                provider: provider.to_string(),
                message: "provider is disabled".to_string(),
            }),
            None => Err(PaymentError::GatewayConfig {
                provider: provider.to_string(),
                message: "no credentials configured".to_string(),
            }),
        }
    }

    pub fn enabled_providers(&self) -> Vec<Provider> {
        Provider::ALL
            .into_iter()
            .filter(|p| matches!(self.entries.get(p), Some(c) if c.enabled))
            .collect()
    }
}

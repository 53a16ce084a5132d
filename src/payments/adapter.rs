//! Provider adapter seam.
//!
//! Every gateway implements [`ProviderAdapter`]; the engine resolves one
//! through the [`ProviderRegistry`] lookup table rather than branching on
//! provider names at call sites.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{PaymentError, PaymentResult};
use crate::payments::types::{InitiateOutcome, InitiateRequest, Provider, VerifyOutcome};

/// Normalized interface over one payment gateway
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> Provider;

    /// Start a payment on the provider's hosted page.
    ///
    /// Fails with a non-retryable `ProviderRequest` on rejection; the
    /// caller marks the payment record failed, never completed.
    async fn initiate(&self, request: &InitiateRequest) -> PaymentResult<InitiateOutcome>;

    /// Ask the provider directly for the true status of a transaction.
    ///
    /// This is the authoritative truth source for settlement; webhook
    /// bodies are only a hint to call it. Transport failures are
    /// retryable and must leave the payment pending.
    async fn verify(&self, reference: &str) -> PaymentResult<VerifyOutcome>;

    /// Check a webhook delivery's signature over the raw body bytes
    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> bool;

    /// Pull our payment reference out of a webhook payload
    fn webhook_reference(&self, payload: &serde_json::Value) -> Option<String>;
}

/// Adapter lookup table, one entry per configured provider
#[derive(Default)]
pub struct ProviderRegistry {
    adapters: HashMap<Provider, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.provider(), adapter);
    }

    pub fn get(&self, provider: Provider) -> PaymentResult<Arc<dyn ProviderAdapter>> {
        self.adapters
            .get(&provider)
            .cloned()
            .ok_or_else(|| PaymentError::GatewayConfig {
                provider: provider.to_string(),
                message: "no adapter registered".to_string(),
            })
    }
}

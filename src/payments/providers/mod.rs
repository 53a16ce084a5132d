//! Concrete gateway adapters, one per provider.

pub mod flutterwave;
pub mod korapay;
pub mod paystack;

pub use flutterwave::FlutterwaveAdapter;
pub use korapay::KorapayAdapter;
pub use paystack::PaystackAdapter;

use std::sync::Arc;

use crate::error::PaymentResult;
use crate::payments::adapter::{ProviderAdapter, ProviderRegistry};
use crate::payments::gateway::GatewayCredentialStore;
use crate::payments::types::Provider;

/// Build an adapter registry covering every provider the credential
/// store enables.
pub fn build_registry(store: &GatewayCredentialStore) -> PaymentResult<ProviderRegistry> {
    let mut registry = ProviderRegistry::new();
    for provider in store.enabled_providers() {
        let credentials = store.get(provider)?.clone();
        let adapter: Arc<dyn ProviderAdapter> = match provider {
            Provider::Paystack => Arc::new(PaystackAdapter::new(credentials)?),
            Provider::Flutterwave => Arc::new(FlutterwaveAdapter::new(credentials)?),
            Provider::Korapay => Arc::new(KorapayAdapter::new(credentials)?),
        };
        registry.register(adapter);
    }
    Ok(registry)
}

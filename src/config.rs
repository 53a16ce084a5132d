use anyhow::{anyhow, Context, Result};
use std::env;

use crate::payments::gateway::{GatewayCredentialStore, GatewayCredentials};
use crate::payments::types::Provider;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub payments: PaymentsConfig,
    pub gateways: GatewayCredentialStore,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    /// Externally reachable base URL, used to build provider redirect
    /// targets back into this service.
    pub public_url: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct PaymentsConfig {
    /// Default currency for initiated payments.
    pub currency: String,
    /// Frontend base URL for post-payment status redirects.
    pub frontend_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let server = ServerConfig {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            public_url: env::var("PUBLIC_URL").context("PUBLIC_URL not set")?,
        };

        let database = DatabaseConfig {
            url: env::var("DATABASE_URL").context("DATABASE_URL not set")?,
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .context("DATABASE_MAX_CONNECTIONS must be a valid number")?,
        };

        let payments = PaymentsConfig {
            currency: env::var("PAYMENT_CURRENCY").unwrap_or_else(|_| "NGN".to_string()),
            frontend_url: env::var("FRONTEND_URL").context("FRONTEND_URL not set")?,
        };

        let mut gateways = GatewayCredentialStore::new();
        if let Some(creds) = load_gateway("PAYSTACK", "https://api.paystack.co") {
            gateways.insert(Provider::Paystack, creds);
        }
        if let Some(creds) = load_gateway("FLUTTERWAVE", "https://api.flutterwave.com/v3") {
            gateways.insert(Provider::Flutterwave, creds);
        }
        if let Some(creds) = load_gateway("KORAPAY", "https://api.korapay.com") {
            gateways.insert(Provider::Korapay, creds);
        }

        let config = Config {
            server,
            database,
            payments,
            gateways,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port < 1024 {
            return Err(anyhow!(
                "Port must be at least 1024, got {}",
                self.server.port
            ));
        }

        let valid_environments = ["development", "staging", "production"];
        if !valid_environments.contains(&self.server.environment.as_str()) {
            return Err(anyhow!(
                "Environment must be one of: {:?}, got {}",
                valid_environments,
                self.server.environment
            ));
        }

        if self.database.url.trim().is_empty() {
            return Err(anyhow!("DATABASE_URL cannot be empty"));
        }

        if self.payments.frontend_url.trim().is_empty() {
            return Err(anyhow!("FRONTEND_URL cannot be empty"));
        }

        if self.payments.currency.trim().is_empty() {
            return Err(anyhow!("PAYMENT_CURRENCY cannot be empty"));
        }

        if self.gateways.enabled_providers().is_empty() {
            return Err(anyhow!(
                "At least one payment gateway must be configured (PAYSTACK_SECRET_KEY, \
                 FLUTTERWAVE_SECRET_KEY or KORAPAY_SECRET_KEY)"
            ));
        }

        Ok(())
    }

    /// Redirect target providers send the browser back to after checkout
    pub fn callback_url(&self) -> String {
        format!(
            "{}/api/payments/callback",
            self.server.public_url.trim_end_matches('/')
        )
    }
}

/// Load one gateway's credentials from `{PREFIX}_*` variables. Returns
/// None when no secret key is present, leaving the provider unconfigured.
fn load_gateway(prefix: &str, default_base_url: &str) -> Option<GatewayCredentials> {
    let secret_key = env::var(format!("{}_SECRET_KEY", prefix)).ok()?;

    let base_url = env::var(format!("{}_BASE_URL", prefix))
        .unwrap_or_else(|_| default_base_url.to_string());

    let mut creds = GatewayCredentials::new(secret_key, base_url);
    // Flutterwave's verif-hash; unused by the HMAC providers.
    creds.webhook_secret = env::var(format!("{}_WEBHOOK_SECRET", prefix)).ok();
    creds.enabled = env::var(format!("{}_ENABLED", prefix))
        .map(|v| v != "false" && v != "0")
        .unwrap_or(true);
    creds.timeout_secs = env::var(format!("{}_TIMEOUT_SECS", prefix))
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(30);
    creds.max_retries = env::var(format!("{}_MAX_RETRIES", prefix))
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(2);

    Some(creds)
}

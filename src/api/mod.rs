//! HTTP surface: health, payment initiation/verification and webhooks.

pub mod health;
pub mod payments;
pub mod webhooks;

use axum::routing::{get, post};
use axum::Router;
use sqlx::PgPool;
use std::sync::Arc;

use crate::config::Config;
use crate::database::webhook_repository::WebhookRepository;
use crate::payments::engine::ReconciliationEngine;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ReconciliationEngine>,
    pub webhooks: Arc<WebhookRepository>,
    pub pool: PgPool,
    pub config: Arc<Config>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/payments/initiate", post(payments::initiate_payment))
        .route("/api/payments/verify/:reference", get(payments::verify_payment))
        .route("/api/payments/callback", get(payments::payment_callback))
        .route("/api/webhooks/:provider", post(webhooks::handle_webhook))
        .with_state(state)
}

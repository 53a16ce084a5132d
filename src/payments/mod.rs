//! Multi-provider payment reconciliation pipeline.
//!
//! Gateway adapters (Paystack, Flutterwave, Korapay) normalize each
//! provider's API; the reconciliation engine owns the payment state
//! machine and applies settlement effects exactly once per reference.

pub mod adapter;
pub mod engine;
pub mod gateway;
pub mod http;
pub mod providers;
pub mod settlement;
pub mod signature;
pub mod store;
pub mod types;

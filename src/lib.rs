//! Payment reconciliation backend for the CampusPay community portal.
//!
//! Accepts payments through Paystack, Flutterwave and Korapay, confirms
//! them against the provider's verify API and applies settlement effects
//! (wallet credits, event tickets) exactly once per payment reference.

pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod payments;

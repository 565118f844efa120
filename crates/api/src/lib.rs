//! Keeper API clients for external services.
//!
//! This crate provides HTTP clients for:
//! - Pyth Hermes: signed price updates consumed by on-chain oracle refreshes

mod hermes;

pub use hermes::{extract_vaa, HermesClient, PriceUpdateSource};

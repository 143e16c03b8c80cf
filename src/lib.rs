//! GUNILEV: leveraged liquidity position engine.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod pricing;
pub mod venues;
pub mod engine;

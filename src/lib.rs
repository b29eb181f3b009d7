//! SPREADWATCH: cross-exchange best-quote aggregation and domestic
//! arbitrage margin alerts.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod alerts;
pub mod config;
pub mod dashboard;
pub mod engine;
pub mod exchanges;
pub mod fx;
pub mod storage;
pub mod types;

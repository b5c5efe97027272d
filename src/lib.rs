//! TRENDSCAN — periodic EMA trend monitor.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod exchange;
pub mod strategy;
pub mod alerts;
pub mod engine;

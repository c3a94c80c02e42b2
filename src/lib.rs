//! Binary options: block-driven BULL/BEAR prediction rounds
//!
//! Library crate exposing all modules for use by integration tests
//! and the simulation node binary.

pub mod types;
pub mod math;
pub mod chain;
pub mod token;
pub mod oracle;
pub mod market;
pub mod vault;
pub mod engine;
pub mod feeds;
pub mod config;
pub mod storage;
pub mod dashboard;

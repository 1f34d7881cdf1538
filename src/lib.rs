//! Stockmon Library
//!
//! Watchlist signal engine and position lifecycle manager

pub mod config;
pub mod lifecycle;
pub mod market;
pub mod notify;
pub mod orchestrator;
pub mod schedule;
pub mod signal;
pub mod store;
pub mod types;

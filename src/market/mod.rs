//! Market data source seam
//!
//! The core only depends on the [`MarketData`] contract: one pull-based
//! snapshot per ticker, errors for unknown or delisted symbols instead of
//! panics. [`yahoo::YahooClient`] is the bundled implementation.

pub mod yahoo;

pub use yahoo::YahooClient;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::Snapshot;

#[derive(Debug, Error)]
pub enum MarketError {
    #[error("no data for {0}")]
    NoData(String),
    #[error("malformed market payload: {0}")]
    Malformed(String),
    #[error("market request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Opaque quote source. A call must complete or fail on its own; the
/// orchestrator additionally bounds it with a timeout.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketData: Send + Sync {
    async fn fetch_snapshot(&self, ticker: &str) -> Result<Snapshot, MarketError>;
}

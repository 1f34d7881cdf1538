//! Yahoo Finance chart API client
//!
//! Pulls 5 days of daily candles per ticker and derives the snapshot fields:
//! last close, previous close, daily change percent, last session volume and
//! the 5-day high/low. Unknown or delisted tickers come back as
//! [`MarketError::NoData`].

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{MarketData, MarketError};
use crate::types::{round2, Snapshot};

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";
const USER_AGENT: &str = "Mozilla/5.0 (compatible; stockmon/0.2)";

#[derive(Debug, Clone, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Clone, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChartError {
    description: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChartResult {
    indicators: Indicators,
}

#[derive(Debug, Clone, Deserialize)]
struct Indicators {
    quote: Vec<QuoteBlock>,
}

/// Candle arrays; entries may be null for halted sessions
#[derive(Debug, Clone, Deserialize)]
struct QuoteBlock {
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

pub struct YahooClient {
    client: Client,
    base_url: String,
}

impl YahooClient {
    /// Build a client with a bounded per-request timeout
    pub fn new(timeout: Duration) -> Result<Self, MarketError> {
        Self::with_base_url(DEFAULT_BASE_URL, timeout)
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self, MarketError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn derive_snapshot(ticker: &str, quote: &QuoteBlock) -> Result<Snapshot, MarketError> {
        let closes: Vec<f64> = quote.close.iter().copied().flatten().collect();
        let last = *closes
            .last()
            .ok_or_else(|| MarketError::NoData(ticker.to_string()))?;
        let prev = if closes.len() > 1 {
            closes[closes.len() - 2]
        } else {
            last
        };
        let daily_change = if prev != 0.0 {
            (last - prev) / prev * 100.0
        } else {
            0.0
        };

        let high_5d = quote
            .high
            .iter()
            .copied()
            .flatten()
            .fold(f64::MIN, f64::max);
        let low_5d = quote.low.iter().copied().flatten().fold(f64::MAX, f64::min);
        let volume = quote.volume.iter().copied().flatten().last().unwrap_or(0);

        Ok(Snapshot {
            ticker: ticker.to_uppercase(),
            price: round2(last),
            prev_close: round2(prev),
            daily_change_pct: round2(daily_change),
            volume,
            high_5d: if high_5d == f64::MIN { round2(last) } else { round2(high_5d) },
            low_5d: if low_5d == f64::MAX { round2(last) } else { round2(low_5d) },
        })
    }
}

#[async_trait]
impl MarketData for YahooClient {
    async fn fetch_snapshot(&self, ticker: &str) -> Result<Snapshot, MarketError> {
        let url = format!(
            "{}/v8/finance/chart/{}?range=5d&interval=1d",
            self.base_url,
            ticker.to_uppercase()
        );
        debug!(ticker = %ticker, "Fetching snapshot");

        let response: ChartResponse = self.client.get(&url).send().await?.json().await?;

        if let Some(err) = response.chart.error {
            return Err(MarketError::NoData(format!("{}: {}", ticker, err.description)));
        }
        let result = response
            .chart
            .result
            .and_then(|mut r| if r.is_empty() { None } else { Some(r.remove(0)) })
            .ok_or_else(|| MarketError::NoData(ticker.to_string()))?;
        let quote = result
            .indicators
            .quote
            .first()
            .ok_or_else(|| MarketError::Malformed(format!("{}: missing quote block", ticker)))?;

        Self::derive_snapshot(ticker, quote)
    }
}

//! Configuration management for Stockmon
//!
//! Loads from YAML files + environment variables via .env

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub bot: BotConfig,
    pub store: StoreConfig,
    pub market: MarketConfig,
    pub notify: NotifyConfig,
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// Version tag for logging
    pub tag: String,
    /// Dry run mode (notifications logged, not sent)
    pub dry_run: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Data directory for user records and the trade journal
    pub data_dir: String,
    /// Enable the closed-trade CSV journal
    pub journal_enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
    /// Quote API base URL
    pub base_url: String,
    /// Per-ticker snapshot fetch timeout in milliseconds
    pub fetch_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    /// Disable to run without a Telegram bot even when a token is set
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    /// Seconds between scheduled bulk checks
    pub check_interval_secs: u64,
    /// Market open hour, UTC (US regular session starts 14:30; checks from 14)
    pub open_hour_utc: u32,
    /// Market close hour, UTC (exclusive)
    pub close_hour_utc: u32,
    /// Skip Saturday/Sunday
    pub weekdays_only: bool,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .set_default("bot.tag", env!("CARGO_PKG_VERSION"))?
            .set_default("bot.dry_run", false)?
            // Store defaults
            .set_default("store.data_dir", "./data")?
            .set_default("store.journal_enabled", true)?
            // Market defaults
            .set_default("market.base_url", "https://query1.finance.yahoo.com")?
            .set_default("market.fetch_timeout_ms", 10_000)?
            // Notify defaults
            .set_default("notify.enabled", true)?
            // Schedule defaults (US market hours, UTC)
            .set_default("schedule.check_interval_secs", 300)?
            .set_default("schedule.open_hour_utc", 14)?
            .set_default("schedule.close_hour_utc", 21)?
            .set_default("schedule.weekdays_only", true)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (STOCKMON_*)
            .add_source(Environment::with_prefix("STOCKMON").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(app_config)
    }

    /// Generate a digest of the config (without secrets) for logging
    pub fn digest(&self) -> String {
        format!(
            "tag={} data_dir={} interval={}s window={:02}-{:02}utc dry_run={}",
            self.bot.tag,
            self.store.data_dir,
            self.schedule.check_interval_secs,
            self.schedule.open_hour_utc,
            self.schedule.close_hour_utc,
            self.bot.dry_run
        )
    }

    /// Validate required environment variables for live notification sending
    pub fn validate_env(&self) -> Result<()> {
        if !self.notify.enabled || self.bot.dry_run {
            return Ok(());
        }
        if std::env::var("TELEGRAM_TOKEN").unwrap_or_default().is_empty() {
            bail!("Required environment variable TELEGRAM_TOKEN is not set (or set notify.enabled=false)");
        }
        Ok(())
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}

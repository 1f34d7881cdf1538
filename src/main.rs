//! Stockmon daemon
//!
//! Wires the file store, market client, notifier and orchestrator together
//! and drives scheduled checks until ctrl-c.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use stockmon::config::AppConfig;
use stockmon::market::YahooClient;
use stockmon::notify::{NoopNotifier, Notifier, TelegramNotifier};
use stockmon::orchestrator::CheckOrchestrator;
use stockmon::schedule::{self, MarketHours};
use stockmon::store::{ConfigStore, FileStore, TradeJournal};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load().context("Could not load configuration")?;
    config.validate_env()?;
    info!(config = %config.digest(), "Stockmon starting");

    let data_dir = Path::new(&config.store.data_dir);
    let journal = if config.store.journal_enabled {
        Some(TradeJournal::open(data_dir)?)
    } else {
        None
    };
    let store: Arc<dyn ConfigStore> = Arc::new(FileStore::open(data_dir, journal)?);

    let market = Arc::new(
        YahooClient::with_base_url(
            &config.market.base_url,
            Duration::from_millis(config.market.fetch_timeout_ms),
        )
        .context("Could not build market client")?,
    );

    let notifier: Arc<dyn Notifier> = if config.bot.dry_run || !config.notify.enabled {
        Arc::new(NoopNotifier)
    } else {
        let token = std::env::var("TELEGRAM_TOKEN").unwrap_or_default();
        Arc::new(TelegramNotifier::new(&token)?)
    };

    let orchestrator = Arc::new(CheckOrchestrator::new(
        store.clone(),
        market,
        notifier.clone(),
        Duration::from_millis(config.market.fetch_timeout_ms),
    ));

    announce_startup(&store, notifier.as_ref()).await;

    let hours = MarketHours::from_config(&config.schedule);
    let interval = Duration::from_secs(config.schedule.check_interval_secs);
    let loop_handle = tokio::spawn(schedule::run_loop(orchestrator, hours, interval));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    info!("Shutdown requested");
    loop_handle.abort();
    Ok(())
}

/// Tell every configured user the monitor is back online
async fn announce_startup(store: &Arc<dyn ConfigStore>, notifier: &dyn Notifier) {
    let tokens = match store.user_tokens().await {
        Ok(t) => t,
        Err(e) => {
            warn!(error = %e, "Could not list users at startup");
            return;
        }
    };

    for token in tokens {
        let watchlist = match store.get_watchlist(&token).await {
            Ok(w) if !w.is_empty() => w,
            _ => continue,
        };
        let tickers: Vec<&str> = watchlist.iter().map(|e| e.ticker.as_str()).collect();
        if let Ok(identity) = store.identity_for(&token).await {
            let message = format!("<b>Monitor online</b>\n\n{}", tickers.join(", "));
            if let Err(e) = notifier.notify(&identity, &message).await {
                warn!(error = %e, "Startup notification failed");
            }
        }
    }
}

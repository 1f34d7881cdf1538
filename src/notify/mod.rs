//! Outbound notification seam
//!
//! Best-effort delivery: a failed send is reported to the caller for
//! accounting but never retried here and never rolls back the state
//! transition that produced the message.

pub mod telegram;

pub use telegram::TelegramNotifier;

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

/// Opaque notification sink keyed by the user's transport identity
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Ok(()) means the transport confirmed delivery
    async fn notify(&self, identity: &str, message: &str) -> Result<()>;
}

/// Sink for dry runs and setups without a configured transport. Logs the
/// message and reports success.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, identity: &str, message: &str) -> Result<()> {
        info!(identity = %identity, message = %message, "Notification (noop)");
        Ok(())
    }
}

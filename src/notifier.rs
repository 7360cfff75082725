// =============================================================================
// Sender — the notification transport contract
// =============================================================================
//
// Telegram/webhook/console transports are out of scope for this crate; it
// only defines the interface they'd implement — one method, async,
// returning a domain error on failure — plus a `LoggingSender` so the
// Detector/Supervisor have something concrete to exercise in tests without
// a real transport.
// =============================================================================

use async_trait::async_trait;
use tracing::info;

use crate::error::PriceSentryError;

#[async_trait]
pub trait Sender: Send + Sync {
    /// Deliver `message`. `chart` is an optional rendered chart image
    /// (PNG bytes) — chart rendering itself is out of scope, so every
    /// shipped `Sender` either ignores it or is never handed one.
    async fn send(&self, message: &str, chart: Option<&[u8]>) -> Result<(), PriceSentryError>;
}

/// Always-succeeds sender that logs at `info!` — used in tests and as the
/// default `notificationChannels: [console]` behaviour.
pub struct LoggingSender;

#[async_trait]
impl Sender for LoggingSender {
    async fn send(&self, message: &str, chart: Option<&[u8]>) -> Result<(), PriceSentryError> {
        info!(has_chart = chart.is_some(), message, "alert sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn logging_sender_always_succeeds() {
        let sender = LoggingSender;
        assert!(sender.send("BTCUSDT +5.00%", None).await.is_ok());
    }
}

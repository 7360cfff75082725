// =============================================================================
// Movement Detector — per-tick scan for symbols that moved past threshold
// =============================================================================
//
// Evaluates every tracked symbol independently, collects results into a
// local `Vec` first, then sorts/truncates/formats once everything's in hand
// rather than interleaving evaluation with formatting.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{TimeZone, Utc};
use tracing::debug;

use crate::config::{Config, PriorityThresholds};
use crate::cooldown::CooldownClassifier;
use crate::exchange::Exchange;
use crate::types::{AlertRecord, Mover, Priority, Symbol};

/// Maximum number of movers surfaced in a single alert message.
const TOP_N: usize = 6;

/// Render `now_ms` in the configured IANA timezone for the alert header,
/// falling back to UTC if `tz_name` doesn't parse — a typo in
/// `notificationTimezone` should degrade the timestamp, not the alert.
fn format_local_timestamp(now_ms: i64, tz_name: &str) -> String {
    let utc = Utc
        .timestamp_millis_opt(now_ms)
        .single()
        .unwrap_or_else(Utc::now);
    match tz_name.parse::<chrono_tz::Tz>() {
        Ok(tz) => utc.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S %Z").to_string(),
        Err(_) => utc.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    }
}

fn priority_marker(priority: Priority) -> &'static str {
    match priority {
        Priority::High => "\u{1f534}",   // red circle
        Priority::Medium => "\u{1f7e0}", // orange circle
        Priority::Low => "\u{1f7e2}",    // green circle
    }
}

pub struct MovementDetector {
    next_alert_id: AtomicU64,
}

impl MovementDetector {
    pub fn new() -> Self {
        Self {
            next_alert_id: AtomicU64::new(1),
        }
    }

    /// Run a single detection pass over `symbols`. Returns `None` if no
    /// mover cleared both the threshold and the cooldown gate this tick.
    pub async fn tick(
        &self,
        exchange: &dyn Exchange,
        cooldown: &CooldownClassifier,
        config: &Config,
        symbols: &[Symbol],
        window_minutes: f64,
        now_ms: i64,
    ) -> Option<(String, Vec<AlertRecord>)> {
        let current = exchange.current(symbols).await;
        let reference = exchange.historical(symbols, window_minutes).await;
        let allowed_symbols = config.notification_symbols.allowed();

        let mut candidates: Vec<Mover> = Vec::new();

        for symbol in symbols {
            if let Some(allowed) = allowed_symbols {
                let in_allow_list = allowed
                    .iter()
                    .any(|tok| symbol.as_str().to_uppercase().contains(&tok.to_uppercase()));
                if !in_allow_list {
                    continue;
                }
            }

            let (Some(&cur), Some(&ref_price)) = (current.get(symbol), reference.get(symbol))
            else {
                continue;
            };
            if ref_price == 0.0 || !cur.is_finite() || !ref_price.is_finite() {
                continue;
            }

            let change_percent = (cur - ref_price) / ref_price * 100.0;
            if change_percent.abs() <= config.default_threshold {
                continue;
            }

            let priority =
                CooldownClassifier::classify(change_percent, &config.priority_thresholds);

            let cooldown_ms = crate::config::timeframe::parse_timeframe(&config.notification_cooldown)
                .map(|m| (m * 60_000.0) as i64)
                .unwrap_or(300_000);

            if !cooldown.should_notify(
                symbol,
                priority,
                now_ms,
                cooldown_ms,
                config.high_priority_bypass_cooldown,
            ) {
                debug!(symbol = %symbol, "mover suppressed by cooldown");
                continue;
            }

            candidates.push(Mover {
                symbol: symbol.clone(),
                change_percent,
                priority,
                reference_price: ref_price,
                current_price: cur,
            });
        }

        if candidates.is_empty() {
            return None;
        }

        candidates.sort_by(|a, b| {
            b.change_percent
                .abs()
                .partial_cmp(&a.change_percent.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.symbol.as_str().cmp(b.symbol.as_str()))
        });
        candidates.truncate(TOP_N);

        let mut records = Vec::with_capacity(candidates.len());
        let mut lines = Vec::with_capacity(candidates.len());

        for (rank, mover) in candidates.iter().enumerate() {
            cooldown.record(&mover.symbol, now_ms);

            let arrow = if mover.change_percent >= 0.0 {
                "\u{2191}"
            } else {
                "\u{2193}"
            };
            lines.push(format!(
                "{} {}. {} — {} {:.2}% — diff {:+.4} ({:.4} \u{2192} {:.4})",
                priority_marker(mover.priority),
                rank + 1,
                mover.symbol,
                arrow,
                mover.change_percent.abs(),
                mover.current_price - mover.reference_price,
                mover.reference_price,
                mover.current_price,
            ));

            records.push(AlertRecord {
                id: self.next_alert_id.fetch_add(1, Ordering::Relaxed),
                symbol: mover.symbol.clone(),
                message: lines.last().cloned().unwrap_or_default(),
                severity: mover.priority.into(),
                price: mover.current_price,
                change_percent: mover.change_percent,
                threshold: config.default_threshold,
                minutes: window_minutes,
                ts: now_ms,
            });
        }

        let header = format!(
            "PriceSentry alert — {}",
            format_local_timestamp(now_ms, &config.notification_timezone)
        );
        let mut message = vec![header];
        message.extend(lines);

        Some((message.join("\n"), records))
    }
}

impl Default for MovementDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(dead_code)]
fn classify_priority(change_percent: f64, thresholds: &PriorityThresholds) -> Priority {
    CooldownClassifier::classify(change_percent, thresholds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeExchange {
        current: HashMap<Symbol, f64>,
        historical: HashMap<Symbol, f64>,
        connected: Mutex<bool>,
    }

    #[async_trait]
    impl Exchange for FakeExchange {
        async fn start(&self, _symbols: Vec<Symbol>) -> Result<(), crate::error::PriceSentryError> {
            Ok(())
        }
        async fn current(&self, symbols: &[Symbol]) -> HashMap<Symbol, f64> {
            symbols
                .iter()
                .filter_map(|s| self.current.get(s).map(|p| (s.clone(), *p)))
                .collect()
        }
        async fn historical(&self, symbols: &[Symbol], _minutes: f64) -> HashMap<Symbol, f64> {
            symbols
                .iter()
                .filter_map(|s| self.historical.get(s).map(|p| (s.clone(), *p)))
                .collect()
        }
        fn is_connected(&self) -> bool {
            *self.connected.lock().unwrap()
        }
        async fn check_and_reconnect(&self) -> bool {
            false
        }
        async fn close(&self) {}
    }

    #[tokio::test]
    async fn detects_a_mover_above_threshold() {
        let symbol = Symbol::new("BTCUSDT");
        let exchange = FakeExchange {
            current: HashMap::from([(symbol.clone(), 105.0)]),
            historical: HashMap::from([(symbol.clone(), 100.0)]),
            connected: Mutex::new(true),
        };
        let cooldown = CooldownClassifier::new();
        let config = Config::default();
        let detector = MovementDetector::new();

        let result = detector
            .tick(&exchange, &cooldown, &config, &[symbol.clone()], 1.0, 0)
            .await;

        assert!(result.is_some());
        let (message, records) = result.unwrap();
        assert!(message.contains("BTCUSDT"));
        assert_eq!(records.len(), 1);
        assert!((records[0].change_percent - 5.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn ignores_moves_under_threshold() {
        let symbol = Symbol::new("BTCUSDT");
        let exchange = FakeExchange {
            current: HashMap::from([(symbol.clone(), 100.5)]),
            historical: HashMap::from([(symbol.clone(), 100.0)]),
            connected: Mutex::new(true),
        };
        let cooldown = CooldownClassifier::new();
        let config = Config::default(); // default_threshold = 1.0%
        let detector = MovementDetector::new();

        let result = detector
            .tick(&exchange, &cooldown, &config, &[symbol], 1.0, 0)
            .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn truncates_to_top_n_movers() {
        let mut current = HashMap::new();
        let mut historical = HashMap::new();
        let mut symbols = Vec::new();
        for i in 0..10 {
            let symbol = Symbol::new(format!("SYM{i}USDT"));
            current.insert(symbol.clone(), 100.0 + (i as f64 + 1.0) * 2.0);
            historical.insert(symbol.clone(), 100.0);
            symbols.push(symbol);
        }
        let exchange = FakeExchange {
            current,
            historical,
            connected: Mutex::new(true),
        };
        let cooldown = CooldownClassifier::new();
        let config = Config::default();
        let detector = MovementDetector::new();

        let (_, records) = detector
            .tick(&exchange, &cooldown, &config, &symbols, 1.0, 0)
            .await
            .unwrap();
        assert_eq!(records.len(), TOP_N);
    }

    #[tokio::test]
    async fn restricts_to_notification_symbols_allow_list() {
        let btc = Symbol::new("BTC/USDT:USDT");
        let eth = Symbol::new("ETH/USDT:USDT");
        let exchange = FakeExchange {
            current: HashMap::from([(btc.clone(), 110.0), (eth.clone(), 110.0)]),
            historical: HashMap::from([(btc.clone(), 100.0), (eth.clone(), 100.0)]),
            connected: Mutex::new(true),
        };
        let cooldown = CooldownClassifier::new();
        let mut config = Config::default();
        config.notification_symbols = crate::config::NotificationSymbols::List(vec!["BTC".to_string()]);
        let detector = MovementDetector::new();

        let (_, records) = detector
            .tick(&exchange, &cooldown, &config, &[btc.clone(), eth], 1.0, 0)
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].symbol, btc);
    }

    #[tokio::test]
    async fn ties_break_by_symbol_ascending() {
        let a = Symbol::new("AAA/USDT:USDT");
        let b = Symbol::new("BBB/USDT:USDT");
        let exchange = FakeExchange {
            current: HashMap::from([(b.clone(), 110.0), (a.clone(), 110.0)]),
            historical: HashMap::from([(b.clone(), 100.0), (a.clone(), 100.0)]),
            connected: Mutex::new(true),
        };
        let cooldown = CooldownClassifier::new();
        let config = Config::default();
        let detector = MovementDetector::new();

        let (_, records) = detector
            .tick(&exchange, &cooldown, &config, &[b, a.clone()], 1.0, 0)
            .await
            .unwrap();
        assert_eq!(records[0].symbol, a);
    }
}

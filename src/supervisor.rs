// =============================================================================
// Sentry Supervisor — top-level run loop
// =============================================================================
//
// Wakes on an interval, snapshots whatever's needed under a lock, releases
// the lock, then acts on the snapshot and logs — never holds a lock across
// an `await` that might itself want to re-acquire it.
// =============================================================================

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};
use tracing::{error, info};

use crate::catalog::MarketCatalog;
use crate::config::{Config, ConfigUpdateEvent, ConfigurationStore, ExchangeKind};
use crate::config::timeframe::parse_timeframe;
use crate::cooldown::CooldownClassifier;
use crate::detector::MovementDetector;
use crate::error::PriceSentryError;
use crate::exchange::Exchange;
use crate::notifier::Sender;
use crate::observer::{ObserverRegistry, Snapshot};
use crate::types::Symbol;

/// Builds a fresh adapter for `ExchangeKind`. Boxed so the Supervisor can
/// rebuild an adapter on a config-driven exchange change without knowing
/// about any concrete `ExchangeVariant`.
pub type ExchangeFactory = Arc<dyn Fn(ExchangeKind) -> Arc<dyn Exchange> + Send + Sync>;

/// How often the Supervisor wakes to check whether work is due. Real work
/// (a detector tick) only happens when `checkInterval` has elapsed; this is
/// just the loop's own polling granularity.
const TICK_GRANULARITY: Duration = Duration::from_secs(1);
/// How often a disconnected adapter is given a reconnect attempt.
const RECONNECT_CHECK: Duration = Duration::from_secs(5);

pub struct Supervisor {
    config_store: Arc<ConfigurationStore>,
    exchange: Arc<RwLock<Arc<dyn Exchange>>>,
    exchange_factory: ExchangeFactory,
    catalog: Arc<MarketCatalog>,
    sender: Arc<dyn Sender>,
    cooldown: CooldownClassifier,
    detector: MovementDetector,
    observers: ObserverRegistry,
    config_events: mpsc::UnboundedReceiver<ConfigUpdateEvent>,
    last_tick_ms: AtomicI64,
    last_reconnect_check_ms: AtomicI64,
}

impl Supervisor {
    pub fn new(
        config_store: Arc<ConfigurationStore>,
        exchange: Arc<RwLock<Arc<dyn Exchange>>>,
        exchange_factory: ExchangeFactory,
        catalog: Arc<MarketCatalog>,
        sender: Arc<dyn Sender>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        config_store.subscribe(Arc::new(move |event: &ConfigUpdateEvent| {
            let _ = tx.send(event.clone());
        }));

        Self {
            config_store,
            exchange,
            exchange_factory,
            catalog,
            sender,
            cooldown: CooldownClassifier::new(),
            detector: MovementDetector::new(),
            observers: ObserverRegistry::new(),
            config_events: rx,
            last_tick_ms: AtomicI64::new(0),
            last_reconnect_check_ms: AtomicI64::new(0),
        }
    }

    pub fn observers(&self) -> &ObserverRegistry {
        &self.observers
    }

    fn current_exchange(&self) -> Arc<dyn Exchange> {
        Arc::clone(&self.exchange.read())
    }

    /// Start streaming `symbols` on the configured exchange. Separate from
    /// `run` so callers can wait for the first connection before entering
    /// the steady-state loop.
    pub async fn start_exchange(&self, symbols: Vec<Symbol>) -> Result<(), PriceSentryError> {
        self.current_exchange().start(symbols).await
    }

    /// Run forever. Drains pending config-update events, runs a detector
    /// tick when `checkInterval` has elapsed, checks the exchange's
    /// connection health on its own slower cadence, and publishes an
    /// observer snapshot every iteration.
    pub async fn run(&mut self) -> Result<(), PriceSentryError> {
        let mut ticker = interval(TICK_GRANULARITY);
        info!("supervisor run loop started");

        loop {
            ticker.tick().await;
            let now_ms = now_ms();

            self.drain_config_events().await;

            let config = self.config_store.get();
            self.maybe_reconnect(now_ms).await;
            self.maybe_tick_detector(&config, now_ms).await;
            self.publish_snapshot(&config, now_ms).await;
        }
    }

    /// Drain pending config-update events and, for any that flip the
    /// exchange or symbol-set reload flags, tear down the current adapter
    /// and bring up a replacement against the new config.
    async fn drain_config_events(&mut self) {
        let mut reload: Option<Config> = None;
        while let Ok(event) = self.config_events.try_recv() {
            info!(
                changed = ?event.diff.changed_keys,
                exchange_reload = event.diff.requires_exchange_reload,
                symbol_reload = event.diff.requires_symbol_reload,
                "applying config update"
            );
            if event.diff.requires_exchange_reload || event.diff.requires_symbol_reload {
                reload = Some(event.current);
            }
        }
        if let Some(config) = reload {
            self.reload_exchange(&config).await;
        }
    }

    /// `adapter.close()` -> construct a fresh adapter for `config.exchange`
    /// -> rematch `config.symbols` against the market catalog -> `start()`
    /// the new adapter. The old adapter is only replaced once the new one
    /// has successfully started; a failed reload leaves the previous
    /// (closed) adapter in place and logs the error rather than panicking
    /// the supervisor loop.
    async fn reload_exchange(&self, config: &Config) {
        info!(exchange = %config.exchange, "reloading exchange adapter");
        self.current_exchange().close().await;

        let resolved = self.catalog.resolve(&config.symbols, config.exchange);
        if resolved.is_empty() {
            error!(
                exchange = %config.exchange,
                "exchange reload aborted: market catalog resolved zero symbols"
            );
            return;
        }

        let replacement = (self.exchange_factory)(config.exchange);
        match replacement.start(resolved).await {
            Ok(()) => {
                *self.exchange.write() = replacement;
                info!(exchange = %config.exchange, "exchange adapter reloaded");
            }
            Err(e) => {
                error!(%e, exchange = %config.exchange, "failed to start replacement exchange adapter");
            }
        }
    }

    async fn maybe_reconnect(&self, now_ms: i64) {
        let last = self.last_reconnect_check_ms.load(Ordering::Relaxed);
        if now_ms - last < RECONNECT_CHECK.as_millis() as i64 {
            return;
        }
        self.last_reconnect_check_ms.store(now_ms, Ordering::Relaxed);

        let exchange = self.current_exchange();
        if !exchange.is_connected() {
            let attempted = exchange.check_and_reconnect().await;
            if attempted {
                info!("reconnect attempt dispatched");
            }
        }
    }

    async fn maybe_tick_detector(&self, config: &Config, now_ms: i64) {
        let interval_ms = match parse_timeframe(&config.check_interval) {
            Ok(minutes) => (minutes * 60_000.0) as i64,
            Err(e) => {
                error!(%e, "invalid checkInterval in active config, skipping tick");
                return;
            }
        };

        let last = self.last_tick_ms.load(Ordering::Relaxed);
        if now_ms - last < interval_ms {
            return;
        }
        self.last_tick_ms.store(now_ms, Ordering::Relaxed);

        let window_minutes = parse_timeframe(&config.default_timeframe).unwrap_or(1.0);
        let symbols = &config.symbols;
        if symbols.is_empty() {
            return;
        }
        let symbols: Vec<Symbol> = symbols.iter().map(|s| Symbol::new(s.clone())).collect();

        let exchange = self.current_exchange();
        let result = self
            .detector
            .tick(
                exchange.as_ref(),
                &self.cooldown,
                config,
                &symbols,
                window_minutes,
                now_ms,
            )
            .await;

        if let Some((message, records)) = result {
            info!(movers = records.len(), "alert triggered");
            if let Err(e) = self.sender.send(&message, None).await {
                error!(%e, "failed to deliver alert");
            }
        }
    }

    async fn publish_snapshot(&self, config: &Config, now_ms: i64) {
        let exchange = self.current_exchange();
        let symbols: Vec<Symbol> = config.symbols.iter().map(|s| Symbol::new(s.clone())).collect();
        let current = exchange.current(&symbols).await;
        let prices: Vec<(Symbol, f64)> = symbols
            .into_iter()
            .filter_map(|s| current.get(&s).map(|p| (s.clone(), *p)))
            .collect();

        let snapshot = Snapshot {
            prices,
            recent_alerts: Vec::new(),
            connected: exchange.is_connected(),
            ts: now_ms,
        };
        self.observers.publish(&snapshot);
    }
}

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

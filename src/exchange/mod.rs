// =============================================================================
// Exchange Adapter — live price streaming + REST fallback, per exchange
// =============================================================================
//
// Dynamic dispatch between exchanges is expressed as a sealed set of
// variants sharing one adapter contract. Rather than hand-duplicating
// `BinanceAdapter`/`OkxAdapter`/`BybitAdapter` structs — one concrete client
// type per exchange — the streaming/reconnect/cache machinery lives once in
// `ExchangeAdapter<V>`, generic over a small `ExchangeVariant` trait that
// supplies only what differs: URLs and wire parsing. Connect, loop
// `read.next().await`, and distinguish `Ok`/`Err`/stream-end all carry over
// unchanged across exchanges.
//
// The Supervisor holds `Box<dyn Exchange>` — the contract type, never the
// concrete variant — so swapping exchanges at config-reload time is just
// constructing a new boxed adapter.
// =============================================================================

pub mod backoff;
pub mod binance;
pub mod bybit;
pub mod cache;
pub mod circuit_breaker;
pub mod okx;
pub mod reconnect;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, instrument, warn};

use crate::error::PriceSentryError;
use crate::history::PriceHistoryRing;
use crate::types::{PricePoint, Symbol};
use backoff::{retry_with_backoff, BackoffPolicy};
use cache::PriceCache;
use circuit_breaker::CircuitBreaker;
use reconnect::{ConnectionState, ReconnectState};

/// Delay between immediate reconnect attempts, both during `start()`'s
/// bounded retry loop and the background steady-state reconnect loop.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Hard ceiling on how long `start()` may block waiting for the first
/// successful handshake before it gives up and raises.
const START_TIMEOUT: Duration = Duration::from_secs(10);
/// Connection attempts `start()` makes per invocation before raising.
const START_MAX_RETRIES: u32 = 3;
/// Breaker guarding the initial-connect path: more tolerant, since a fresh
/// process retrying `start()` shouldn't trip on a handful of cold failures.
const START_BREAKER_THRESHOLD: u32 = 5;
const START_BREAKER_RECOVERY: Duration = Duration::from_secs(60);
/// Breaker guarding steady-state reconnection after the stream has dropped:
/// tighter, since a live stream flapping repeatedly is a worse sign than a
/// cold start taking a few tries.
const RECONNECT_BREAKER_THRESHOLD: u32 = 3;
const RECONNECT_BREAKER_RECOVERY: Duration = Duration::from_secs(30);

/// The concrete stream type `tokio_tungstenite::connect_async` hands back
/// with the `native-tls` feature enabled.
type WsStream = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// The contract every exchange adapter implements. The Supervisor and
/// Movement Detector depend only on this trait, never on a concrete
/// exchange type.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Begin streaming `symbols`. Blocks until the first handshake succeeds
    /// or `START_TIMEOUT` elapses, making up to `START_MAX_RETRIES`
    /// connection attempts along the way; raises if every attempt fails or
    /// the timeout is hit before one does. Once connected, a background
    /// task takes over reading the stream and reconnecting on drop —
    /// visible via `is_connected`, not through this call.
    async fn start(&self, symbols: Vec<Symbol>) -> Result<(), PriceSentryError>;

    /// Best-known current price for each requested symbol: live stream
    /// value if fresh, falling back to the REST-backed cache.
    async fn current(&self, symbols: &[Symbol]) -> HashMap<Symbol, f64>;

    /// Best-known price approximately `minutes` ago, from the history ring.
    async fn historical(&self, symbols: &[Symbol], minutes: f64) -> HashMap<Symbol, f64>;

    fn is_connected(&self) -> bool;

    /// If disconnected and the circuit breaker allows it, kick off another
    /// connection attempt. Returns whether an attempt was made.
    async fn check_and_reconnect(&self) -> bool;

    async fn close(&self);
}

/// Per-exchange differences the generic adapter needs: URLs and wire
/// format parsing. Implemented by `binance::BinanceVariant`,
/// `okx::OkxVariant`, `bybit::BybitVariant`.
pub trait ExchangeVariant: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// WebSocket URL subscribing to ticker/trade updates for `symbols`.
    fn stream_url(&self, symbols: &[Symbol]) -> String;

    /// REST URL for a single-symbol price fallback fetch.
    fn rest_ticker_url(&self, symbol: &Symbol) -> String;

    /// Optional text frame to send immediately after connecting (e.g. a
    /// `SUBSCRIBE` payload for exchanges that don't encode the subscription
    /// in the URL itself, like OKX/Bybit). `None` for exchanges where
    /// `stream_url` already carries the subscription, like Binance's
    /// combined-stream URL.
    fn subscribe_payload(&self, _symbols: &[Symbol]) -> Option<String> {
        None
    }

    /// Parse one incoming text frame into `(symbol, price)`, or `None` if
    /// the frame isn't a price update this adapter cares about (e.g. a
    /// subscription ack).
    fn parse_stream_message(&self, text: &str) -> Option<(Symbol, f64)>;

    /// Parse a REST ticker response body into a price.
    fn parse_rest_price(&self, body: &str) -> Result<f64, PriceSentryError>;
}

pub struct ExchangeAdapter<V: ExchangeVariant> {
    variant: Arc<V>,
    http: reqwest::Client,
    reconnect: Arc<ReconnectState>,
    start_breaker: Arc<CircuitBreaker>,
    reconnect_breaker: Arc<CircuitBreaker>,
    cache: Arc<PriceCache>,
    history: Arc<PriceHistoryRing>,
    last_price: Arc<RwLock<HashMap<Symbol, f64>>>,
    symbols: Arc<RwLock<Vec<Symbol>>>,
    task: AsyncMutex<Option<JoinHandle<()>>>,
    shutting_down: Arc<AtomicBool>,
}

impl<V: ExchangeVariant> ExchangeAdapter<V> {
    pub fn new(variant: V) -> Self {
        let name = variant.name().to_string();
        Self {
            variant: Arc::new(variant),
            http: reqwest::Client::new(),
            reconnect: Arc::new(ReconnectState::new(name.clone())),
            start_breaker: Arc::new(CircuitBreaker::new(
                format!("{name}-start"),
                START_BREAKER_THRESHOLD,
                START_BREAKER_RECOVERY,
            )),
            reconnect_breaker: Arc::new(CircuitBreaker::new(
                format!("{name}-reconnect"),
                RECONNECT_BREAKER_THRESHOLD,
                RECONNECT_BREAKER_RECOVERY,
            )),
            cache: Arc::new(PriceCache::new()),
            history: Arc::new(PriceHistoryRing::new()),
            last_price: Arc::new(RwLock::new(HashMap::new())),
            symbols: Arc::new(RwLock::new(Vec::new())),
            task: AsyncMutex::new(None),
            shutting_down: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn history(&self) -> &Arc<PriceHistoryRing> {
        &self.history
    }

    #[instrument(skip(self), name = "exchange.fetch_rest_price")]
    async fn fetch_rest_price(&self, symbol: &Symbol) -> Result<f64, PriceSentryError> {
        let url = self.variant.rest_ticker_url(symbol);
        let variant = Arc::clone(&self.variant);
        let http = self.http.clone();
        let policy = BackoffPolicy::default();

        retry_with_backoff(&policy, || {
            let http = http.clone();
            let url = url.clone();
            let variant = Arc::clone(&variant);
            async move {
                let body = http
                    .get(&url)
                    .send()
                    .await
                    .map_err(PriceSentryError::Transport)?
                    .text()
                    .await
                    .map_err(PriceSentryError::Transport)?;
                variant.parse_rest_price(&body)
            }
        })
        .await
    }

    /// Make up to `START_MAX_RETRIES` connect attempts, gated by
    /// `start_breaker`. Returns the handshaked stream (subscribe payload
    /// already sent) on success, or the last error once retries or the
    /// breaker are exhausted. The caller wraps this in `tokio::time::timeout`
    /// to enforce `START_TIMEOUT`.
    async fn connect_with_retries(
        variant: Arc<V>,
        breaker: Arc<CircuitBreaker>,
        symbols: Vec<Symbol>,
    ) -> Result<WsStream, PriceSentryError> {
        let mut last_err = None;

        for attempt in 1..=START_MAX_RETRIES {
            if !breaker.call_allowed() {
                return Err(PriceSentryError::system(format!(
                    "{} start circuit breaker open",
                    variant.name()
                )));
            }

            let url = variant.stream_url(&symbols);
            match tokio_tungstenite::connect_async(&url).await {
                Ok((mut ws_stream, _response)) => {
                    breaker.record_success();
                    if let Some(payload) = variant.subscribe_payload(&symbols) {
                        if ws_stream.send(Message::Text(payload)).await.is_err() {
                            warn!(exchange = variant.name(), "failed to send subscribe payload");
                        }
                    }
                    return Ok(ws_stream);
                }
                Err(e) => {
                    breaker.record_failure();
                    warn!(exchange = variant.name(), error = %e, attempt, "start connect attempt failed");
                    last_err = Some(PriceSentryError::Network(e));
                    if attempt < START_MAX_RETRIES {
                        tokio::time::sleep(RECONNECT_DELAY).await;
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            PriceSentryError::system(format!("{} start retries exhausted", variant.name()))
        }))
    }

    /// Read frames off an already-connected stream until it closes, errors,
    /// or shutdown is requested. Shared by the post-`start()` background
    /// task and the steady-state reconnect loop.
    async fn drive_stream(
        ws_stream: WsStream,
        variant: &Arc<V>,
        cache: &PriceCache,
        history: &PriceHistoryRing,
        last_price: &RwLock<HashMap<Symbol, f64>>,
        shutting_down: &AtomicBool,
    ) {
        let (mut write, mut read) = ws_stream.split();

        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if let Some((symbol, price)) = variant.parse_stream_message(&text) {
                        let ts = now_ms();
                        last_price.write().insert(symbol.clone(), price);
                        cache.insert(symbol.clone(), price);
                        history.record(&symbol, PricePoint::new(ts, price));
                    } else {
                        debug!(exchange = variant.name(), "ignored non-price frame");
                    }
                }
                Ok(Message::Ping(payload)) => {
                    if write.send(Message::Pong(payload)).await.is_err() {
                        warn!(exchange = variant.name(), "failed to respond to ping");
                        break;
                    }
                }
                Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {
                    // Control frames we neither need to answer nor act on.
                }
                Ok(Message::Close(frame)) => {
                    info!(exchange = variant.name(), ?frame, "stream closed by remote");
                    break;
                }
                Ok(Message::Binary(_)) => {
                    debug!(exchange = variant.name(), "ignored binary frame");
                }
                Err(e) => {
                    warn!(exchange = variant.name(), error = %e, "stream read error");
                    break;
                }
            }

            if shutting_down.load(Ordering::Relaxed) {
                break;
            }
        }
    }

    /// Drives the stream handed back by `start()`'s successful handshake,
    /// then takes over steady-state reconnection (gated by
    /// `reconnect_breaker`, unbounded in attempt count) for as long as the
    /// adapter is running. This is the background task `start()` spawns.
    async fn drive_then_reconnect_loop(
        initial_stream: WsStream,
        variant: Arc<V>,
        reconnect: Arc<ReconnectState>,
        breaker: Arc<CircuitBreaker>,
        cache: Arc<PriceCache>,
        history: Arc<PriceHistoryRing>,
        last_price: Arc<RwLock<HashMap<Symbol, f64>>>,
        symbols: Arc<RwLock<Vec<Symbol>>>,
        shutting_down: Arc<AtomicBool>,
    ) {
        Self::drive_stream(
            initial_stream,
            &variant,
            &cache,
            &history,
            &last_price,
            &shutting_down,
        )
        .await;
        reconnect.transition(ConnectionState::Closing);
        breaker.record_failure();
        reconnect.transition(ConnectionState::Disconnected);

        loop {
            if shutting_down.load(Ordering::Relaxed) {
                return;
            }

            if !breaker.call_allowed() {
                tokio::time::sleep(RECONNECT_DELAY).await;
                continue;
            }

            reconnect.transition(ConnectionState::Connecting);
            let current_symbols = symbols.read().clone();
            let url = variant.stream_url(&current_symbols);

            match tokio_tungstenite::connect_async(&url).await {
                Ok((mut ws_stream, _response)) => {
                    breaker.record_success();
                    reconnect.transition(ConnectionState::Connected);
                    info!(exchange = variant.name(), "stream reconnected");

                    if let Some(payload) = variant.subscribe_payload(&current_symbols) {
                        if ws_stream.send(Message::Text(payload)).await.is_err() {
                            warn!(exchange = variant.name(), "failed to send subscribe payload");
                        }
                    }

                    Self::drive_stream(
                        ws_stream,
                        &variant,
                        &cache,
                        &history,
                        &last_price,
                        &shutting_down,
                    )
                    .await;

                    reconnect.transition(ConnectionState::Closing);
                    breaker.record_failure();
                }
                Err(e) => {
                    warn!(exchange = variant.name(), error = %e, "reconnect attempt failed");
                    breaker.record_failure();
                }
            }

            reconnect.transition(ConnectionState::Disconnected);
            if shutting_down.load(Ordering::Relaxed) {
                return;
            }
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    }
}

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[async_trait]
impl<V: ExchangeVariant> Exchange for ExchangeAdapter<V> {
    async fn start(&self, symbols: Vec<Symbol>) -> Result<(), PriceSentryError> {
        *self.symbols.write() = symbols.clone();
        self.shutting_down.store(false, Ordering::Relaxed);
        self.reconnect.transition(ConnectionState::Connecting);

        let attempt = tokio::time::timeout(
            START_TIMEOUT,
            Self::connect_with_retries(
                Arc::clone(&self.variant),
                Arc::clone(&self.start_breaker),
                symbols,
            ),
        )
        .await;

        let ws_stream = match attempt {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                self.reconnect.transition(ConnectionState::Disconnected);
                warn!(exchange = self.variant.name(), error = %e, "start retries exhausted");
                return Err(e);
            }
            Err(_) => {
                self.reconnect.transition(ConnectionState::Disconnected);
                warn!(exchange = self.variant.name(), timeout = ?START_TIMEOUT, "start timed out");
                return Err(PriceSentryError::system(format!(
                    "{} start timed out after {:?}",
                    self.variant.name(),
                    START_TIMEOUT
                )));
            }
        };

        self.reconnect.transition(ConnectionState::Connected);
        info!(exchange = self.variant.name(), "stream connected");

        let variant = Arc::clone(&self.variant);
        let reconnect = Arc::clone(&self.reconnect);
        let reconnect_breaker = Arc::clone(&self.reconnect_breaker);
        let cache = Arc::clone(&self.cache);
        let history = Arc::clone(&self.history);
        let last_price = Arc::clone(&self.last_price);
        let symbols_handle = Arc::clone(&self.symbols);
        let shutting_down = Arc::clone(&self.shutting_down);

        let handle = tokio::spawn(async move {
            Self::drive_then_reconnect_loop(
                ws_stream,
                variant,
                reconnect,
                reconnect_breaker,
                cache,
                history,
                last_price,
                symbols_handle,
                shutting_down,
            )
            .await;
        });

        *self.task.lock().await = Some(handle);
        Ok(())
    }

    async fn current(&self, symbols: &[Symbol]) -> HashMap<Symbol, f64> {
        let mut out = HashMap::with_capacity(symbols.len());
        let stream_healthy = self.is_connected();
        let live = self.last_price.read();
        for symbol in symbols {
            if let Some(price) = self.cache.get(symbol) {
                out.insert(symbol.clone(), price);
                continue;
            }
            if stream_healthy {
                if let Some(price) = live.get(symbol) {
                    out.insert(symbol.clone(), *price);
                    continue;
                }
            }
            drop_and_fetch(&self.http, &self.variant, &self.cache, symbol, &mut out).await;
        }
        out
    }

    async fn historical(&self, symbols: &[Symbol], minutes: f64) -> HashMap<Symbol, f64> {
        let target_ms = now_ms() - (minutes * 60_000.0) as i64;
        let mut out = HashMap::with_capacity(symbols.len());
        for symbol in symbols {
            if let Some(point) = self.history.closest(symbol, target_ms) {
                out.insert(symbol.clone(), point.price);
            }
        }
        out
    }

    fn is_connected(&self) -> bool {
        self.reconnect.is_connected()
    }

    async fn check_and_reconnect(&self) -> bool {
        if self.is_connected() {
            return false;
        }
        if !self.reconnect_breaker.call_allowed() {
            return false;
        }
        let task_running = {
            let guard = self.task.lock().await;
            guard.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
        };
        if task_running {
            return false;
        }
        let symbols = self.symbols.read().clone();
        let _ = self.start(symbols).await;
        true
    }

    async fn close(&self) {
        self.shutting_down.store(true, Ordering::Relaxed);
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
        }
        self.reconnect.transition(ConnectionState::Disconnected);
    }
}

async fn drop_and_fetch<V: ExchangeVariant>(
    http: &reqwest::Client,
    variant: &Arc<V>,
    cache: &PriceCache,
    symbol: &Symbol,
    out: &mut HashMap<Symbol, f64>,
) {
    let url = variant.rest_ticker_url(symbol);
    match http.get(&url).send().await {
        Ok(resp) => match resp.text().await {
            Ok(body) => match variant.parse_rest_price(&body) {
                Ok(price) => {
                    cache.insert(symbol.clone(), price);
                    out.insert(symbol.clone(), price);
                }
                Err(e) => warn!(exchange = variant.name(), %e, "rest fallback parse failed"),
            },
            Err(e) => warn!(exchange = variant.name(), %e, "rest fallback body read failed"),
        },
        Err(e) => warn!(exchange = variant.name(), %e, "rest fallback request failed"),
    }
}

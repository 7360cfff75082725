// =============================================================================
// Market Catalog — resolves user-entered base symbols to canonical contracts
// =============================================================================
//
// The refresh is a single unsigned GET per exchange, parsed into a typed
// struct; the matching algorithm (shortest-base substring match,
// insertion-order tie-break, dedup) is the interesting part of this module.
// =============================================================================

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::ExchangeKind;
use crate::error::PriceSentryError;
use crate::types::Symbol;

/// Canonical `BASE/QUOTE:SETTLE` form for a USDT-margined contract —
/// every market this catalog tracks settles in the same currency it's
/// quoted in.
fn canonical_usdt_market(base: &str) -> String {
    format!("{base}/USDT:USDT")
}

fn fallback_markets(exchange: ExchangeKind) -> Vec<String> {
    let bases: &[&str] = match exchange {
        ExchangeKind::Binance => &[
            "BTC", "ETH", "SOL", "BNB", "XRP", "ADA", "DOGE", "AVAX", "LINK", "DOT",
        ],
        ExchangeKind::Okx => &["BTC", "ETH", "SOL", "XRP", "DOGE"],
        ExchangeKind::Bybit => &["BTC", "ETH", "SOL", "XRP", "DOGE"],
    };
    bases.iter().map(|b| canonical_usdt_market(b)).collect()
}

pub struct MarketCatalog {
    markets: RwLock<HashMap<ExchangeKind, Vec<String>>>,
}

impl MarketCatalog {
    /// Seed the catalog with hardcoded fallback lists for every exchange —
    /// used until (and unless) `refresh` successfully replaces an
    /// exchange's list with a live fetch.
    pub fn with_fallbacks() -> Self {
        let mut markets = HashMap::new();
        for exchange in [ExchangeKind::Binance, ExchangeKind::Okx, ExchangeKind::Bybit] {
            markets.insert(exchange, fallback_markets(exchange));
        }
        Self {
            markets: RwLock::new(markets),
        }
    }

    /// Replace `exchange`'s market list with `canonical_symbols`, in the
    /// order given — order matters for the matching tie-break rule.
    pub fn set_markets(&self, exchange: ExchangeKind, canonical_symbols: Vec<String>) {
        if canonical_symbols.is_empty() {
            warn!(%exchange, "refusing to replace market list with an empty one");
            return;
        }
        info!(%exchange, count = canonical_symbols.len(), "market catalog updated");
        self.markets.write().insert(exchange, canonical_symbols);
    }

    pub fn markets_for(&self, exchange: ExchangeKind) -> Vec<String> {
        self.markets
            .read()
            .get(&exchange)
            .cloned()
            .unwrap_or_else(|| fallback_markets(exchange))
    }

    /// Resolve `user_symbols` (base tokens like `"BTC"`, or already-canonical
    /// contract symbols) against `exchange`'s market list.
    ///
    /// For each user token, every canonical market containing it as a
    /// substring is a candidate; the shortest candidate wins (so `"BTC"`
    /// prefers `"BTCUSDT"` over `"1000BTCUSDT"`), ties broken by the
    /// candidate's position in the catalog's own list. Results are
    /// deduplicated while preserving first-seen order across
    /// `user_symbols`.
    pub fn resolve(&self, user_symbols: &[String], exchange: ExchangeKind) -> Vec<Symbol> {
        let markets = self.markets_for(exchange);
        let mut resolved = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for token in user_symbols {
            let upper = token.to_uppercase();
            let mut candidates: Vec<(usize, &String)> = markets
                .iter()
                .enumerate()
                .filter(|(_, m)| m.contains(&upper))
                .collect();

            candidates.sort_by_key(|(idx, m)| (m.len(), *idx));

            if let Some((_, best)) = candidates.first() {
                if seen.insert((*best).clone()) {
                    resolved.push(Symbol::new((*best).clone()));
                }
            } else {
                warn!(token = %token, %exchange, "no matching market for symbol token");
            }
        }

        resolved
    }

    /// Fetch the live market list for `exchange` and filter it to
    /// USDT-quoted perpetual/swap contracts. Returns the filtered list
    /// without mutating the catalog — call `set_markets` with the result to
    /// apply it. The trigger for calling this periodically lives elsewhere;
    /// this is just the fetch-and-filter procedure.
    pub async fn refresh(
        http: &reqwest::Client,
        exchange: ExchangeKind,
    ) -> Result<Vec<String>, PriceSentryError> {
        match exchange {
            ExchangeKind::Binance => refresh_binance(http).await,
            ExchangeKind::Okx => refresh_okx(http).await,
            ExchangeKind::Bybit => refresh_bybit(http).await,
        }
    }
}

impl Default for MarketCatalog {
    fn default() -> Self {
        Self::with_fallbacks()
    }
}

#[derive(Deserialize)]
struct BinanceExchangeInfo {
    symbols: Vec<BinanceSymbolInfo>,
}

#[derive(Deserialize)]
struct BinanceSymbolInfo {
    symbol: String,
    status: String,
    #[serde(rename = "quoteAsset")]
    quote_asset: String,
    #[serde(rename = "contractType")]
    contract_type: Option<String>,
}

async fn refresh_binance(http: &reqwest::Client) -> Result<Vec<String>, PriceSentryError> {
    let body: BinanceExchangeInfo = http
        .get("https://fapi.binance.com/fapi/v1/exchangeInfo")
        .send()
        .await
        .map_err(PriceSentryError::Transport)?
        .json()
        .await
        .map_err(PriceSentryError::Transport)?;

    let symbols = body
        .symbols
        .into_iter()
        .filter(|s| {
            s.status == "TRADING"
                && s.quote_asset == "USDT"
                && s.contract_type.as_deref() == Some("PERPETUAL")
        })
        .filter_map(|s| {
            s.symbol
                .strip_suffix(&s.quote_asset)
                .map(|base| format!("{base}/{}:{}", s.quote_asset, s.quote_asset))
        })
        .collect();
    Ok(symbols)
}

#[derive(Deserialize)]
struct OkxInstrumentsEnvelope {
    data: Vec<OkxInstrument>,
}

#[derive(Deserialize)]
struct OkxInstrument {
    #[serde(rename = "instId")]
    inst_id: String,
    #[serde(rename = "settleCcy")]
    settle_ccy: String,
    state: String,
}

async fn refresh_okx(http: &reqwest::Client) -> Result<Vec<String>, PriceSentryError> {
    let body: OkxInstrumentsEnvelope = http
        .get("https://www.okx.com/api/v5/public/instruments?instType=SWAP")
        .send()
        .await
        .map_err(PriceSentryError::Transport)?
        .json()
        .await
        .map_err(PriceSentryError::Transport)?;

    let symbols = body
        .data
        .into_iter()
        .filter(|i| i.state == "live" && i.settle_ccy == "USDT")
        .filter_map(|i| {
            let mut segments = i.inst_id.splitn(3, '-');
            let base = segments.next()?;
            let quote = segments.next()?;
            Some(format!("{base}/{quote}:{}", i.settle_ccy))
        })
        .collect();
    Ok(symbols)
}

#[derive(Deserialize)]
struct BybitInstrumentsEnvelope {
    result: BybitInstrumentsResult,
}

#[derive(Deserialize)]
struct BybitInstrumentsResult {
    list: Vec<BybitInstrument>,
}

#[derive(Deserialize)]
struct BybitInstrument {
    symbol: String,
    #[serde(rename = "quoteCoin")]
    quote_coin: String,
    status: String,
}

async fn refresh_bybit(http: &reqwest::Client) -> Result<Vec<String>, PriceSentryError> {
    let body: BybitInstrumentsEnvelope = http
        .get("https://api.bybit.com/v5/market/instruments-info?category=linear")
        .send()
        .await
        .map_err(PriceSentryError::Transport)?
        .json()
        .await
        .map_err(PriceSentryError::Transport)?;

    let symbols = body
        .result
        .list
        .into_iter()
        .filter(|i| i.status == "Trading" && i.quote_coin == "USDT")
        .filter_map(|i| {
            i.symbol
                .strip_suffix(&i.quote_coin)
                .map(|base| format!("{base}/{}:{}", i.quote_coin, i.quote_coin))
        })
        .collect();
    Ok(symbols)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_prefers_shortest_match() {
        let catalog = MarketCatalog::with_fallbacks();
        catalog.set_markets(
            ExchangeKind::Binance,
            vec!["1000BTC/USDT:USDT".to_string(), "BTC/USDT:USDT".to_string()],
        );
        let resolved = catalog.resolve(&["BTC".to_string()], ExchangeKind::Binance);
        assert_eq!(resolved, vec![Symbol::new("BTC/USDT:USDT")]);
    }

    #[test]
    fn resolve_dedups_preserving_first_seen_order() {
        let catalog = MarketCatalog::with_fallbacks();
        let resolved = catalog.resolve(
            &["BTC".to_string(), "ETH".to_string(), "BTC".to_string()],
            ExchangeKind::Binance,
        );
        assert_eq!(
            resolved,
            vec![Symbol::new("BTC/USDT:USDT"), Symbol::new("ETH/USDT:USDT")]
        );
    }

    #[test]
    fn resolve_skips_unmatched_tokens() {
        let catalog = MarketCatalog::with_fallbacks();
        let resolved = catalog.resolve(&["NOPE".to_string()], ExchangeKind::Binance);
        assert!(resolved.is_empty());
    }
}

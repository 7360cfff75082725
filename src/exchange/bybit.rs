// =============================================================================
// Bybit linear perpetual variant
// =============================================================================

use serde::Deserialize;

use crate::error::PriceSentryError;
use crate::types::Symbol;

use super::ExchangeVariant;

const STREAM_URL: &str = "wss://stream.bybit.com/v5/public/linear";
const REST_BASE: &str = "https://api.bybit.com/v5/market/tickers";

pub struct BybitVariant;

/// Bybit's linear-perpetual wire format concatenates base and quote with no
/// separator (`BTCUSDT`), same as Binance. Falls back to the symbol's raw
/// string if it isn't in canonical `BASE/QUOTE:SETTLE` form.
fn to_wire(symbol: &Symbol) -> String {
    match symbol.parts() {
        Some((base, quote, _settle)) => format!("{base}{quote}"),
        None => symbol.as_str().to_string(),
    }
}

/// Every linear perpetual in this adapter's scope settles in USDT, so
/// stripping the trailing `USDT` recovers the base currency.
fn to_canonical(wire: &str) -> Symbol {
    match wire.strip_suffix("USDT") {
        Some(base) => Symbol::canonical(base, "USDT", "USDT"),
        None => Symbol::new(wire),
    }
}

#[derive(Deserialize)]
struct TickerEnvelope {
    data: TickerData,
}

#[derive(Deserialize)]
struct TickerData {
    symbol: String,
    #[serde(rename = "lastPrice")]
    last_price: Option<String>,
}

#[derive(Deserialize)]
struct RestEnvelope {
    result: RestResult,
}

#[derive(Deserialize)]
struct RestResult {
    list: Vec<RestTicker>,
}

#[derive(Deserialize)]
struct RestTicker {
    #[serde(rename = "lastPrice")]
    last_price: String,
}

impl ExchangeVariant for BybitVariant {
    fn name(&self) -> &'static str {
        "bybit"
    }

    fn stream_url(&self, _symbols: &[Symbol]) -> String {
        STREAM_URL.to_string()
    }

    fn rest_ticker_url(&self, symbol: &Symbol) -> String {
        format!("{REST_BASE}?category=linear&symbol={}", to_wire(symbol))
    }

    fn subscribe_payload(&self, symbols: &[Symbol]) -> Option<String> {
        let args: Vec<String> = symbols
            .iter()
            .map(|s| format!(r#""tickers.{}""#, to_wire(s)))
            .collect();
        Some(format!(r#"{{"op":"subscribe","args":[{}]}}"#, args.join(",")))
    }

    fn parse_stream_message(&self, text: &str) -> Option<(Symbol, f64)> {
        let envelope: TickerEnvelope = serde_json::from_str(text).ok()?;
        let price: f64 = envelope.data.last_price?.parse().ok()?;
        Some((to_canonical(&envelope.data.symbol), price))
    }

    fn parse_rest_price(&self, body: &str) -> Result<f64, PriceSentryError> {
        let envelope: RestEnvelope = serde_json::from_str(body)
            .map_err(|e| PriceSentryError::api("bybit", format!("unparseable ticker: {e}")))?;
        let first = envelope
            .result
            .list
            .into_iter()
            .next()
            .ok_or_else(|| PriceSentryError::api("bybit", "empty ticker list"))?;
        first
            .last_price
            .parse()
            .map_err(|e| PriceSentryError::api("bybit", format!("bad price field: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ticker_topic_frame_into_canonical_symbol() {
        let v = BybitVariant;
        let frame = r#"{"topic":"tickers.BTCUSDT","data":{"symbol":"BTCUSDT","lastPrice":"61234.5"}}"#;
        let (symbol, price) = v.parse_stream_message(frame).unwrap();
        assert_eq!(symbol.as_str(), "BTC/USDT:USDT");
        assert_eq!(price, 61234.5);
    }

    #[test]
    fn parses_rest_ticker_list() {
        let v = BybitVariant;
        let body = r#"{"result":{"list":[{"lastPrice":"61000.0"}]}}"#;
        assert_eq!(v.parse_rest_price(body).unwrap(), 61000.0);
    }

    #[test]
    fn rest_ticker_url_uses_wire_form() {
        let v = BybitVariant;
        let url = v.rest_ticker_url(&Symbol::canonical("BTC", "USDT", "USDT"));
        assert_eq!(url, "https://api.bybit.com/v5/market/tickers?category=linear&symbol=BTCUSDT");
    }

    #[test]
    fn subscribe_payload_uses_wire_form() {
        let v = BybitVariant;
        let payload = v
            .subscribe_payload(&[Symbol::canonical("BTC", "USDT", "USDT")])
            .unwrap();
        assert!(payload.contains("tickers.BTCUSDT"));
    }
}

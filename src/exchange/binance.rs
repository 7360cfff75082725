// =============================================================================
// Binance USDⓈ-M futures variant
// =============================================================================
//
// The combined-stream envelope wraps each update as
// `{"stream": "...", "data": {...}}`, and the price field (`p` for
// aggTrade, `c` for the 24hr mini-ticker) arrives as a JSON string rather
// than a number, same as the REST ticker response.
// =============================================================================

use serde::Deserialize;

use crate::error::PriceSentryError;
use crate::types::Symbol;

use super::ExchangeVariant;

const STREAM_BASE: &str = "wss://fstream.binance.com/stream";
const REST_BASE: &str = "https://fapi.binance.com/fapi/v1/ticker/price";

pub struct BinanceVariant;

/// Binance's wire format concatenates base and quote with no separator
/// (`BTCUSDT`). Falls back to the symbol's raw string if it isn't in
/// canonical `BASE/QUOTE:SETTLE` form.
fn to_wire(symbol: &Symbol) -> String {
    match symbol.parts() {
        Some((base, quote, _settle)) => format!("{base}{quote}"),
        None => symbol.as_str().to_string(),
    }
}

/// All USDⓈ-M perpetuals on this exchange settle in USDT, so stripping the
/// trailing `USDT` recovers the base currency.
fn to_canonical(wire: &str) -> Symbol {
    match wire.strip_suffix("USDT") {
        Some(base) => Symbol::canonical(base, "USDT", "USDT"),
        None => Symbol::new(wire),
    }
}

#[derive(Deserialize)]
struct CombinedEnvelope {
    data: TickerData,
}

#[derive(Deserialize)]
struct TickerData {
    #[serde(rename = "s")]
    symbol: String,
    /// aggTrade price field.
    #[serde(rename = "p")]
    price: Option<String>,
    /// mini-ticker close price field, used interchangeably if present.
    #[serde(rename = "c")]
    close_price: Option<String>,
}

#[derive(Deserialize)]
struct RestTicker {
    price: String,
}

impl ExchangeVariant for BinanceVariant {
    fn name(&self) -> &'static str {
        "binance"
    }

    fn stream_url(&self, symbols: &[Symbol]) -> String {
        let streams = symbols
            .iter()
            .map(|s| format!("{}@aggTrade", to_wire(s).to_lowercase()))
            .collect::<Vec<_>>()
            .join("/");
        format!("{STREAM_BASE}?streams={streams}")
    }

    fn rest_ticker_url(&self, symbol: &Symbol) -> String {
        format!("{REST_BASE}?symbol={}", to_wire(symbol))
    }

    fn parse_stream_message(&self, text: &str) -> Option<(Symbol, f64)> {
        let envelope: CombinedEnvelope = serde_json::from_str(text).ok()?;
        let price_str = envelope.data.price.or(envelope.data.close_price)?;
        let price: f64 = price_str.parse().ok()?;
        Some((to_canonical(&envelope.data.symbol), price))
    }

    fn parse_rest_price(&self, body: &str) -> Result<f64, PriceSentryError> {
        let ticker: RestTicker = serde_json::from_str(body)
            .map_err(|e| PriceSentryError::api("binance", format!("unparseable ticker: {e}")))?;
        ticker
            .price
            .parse()
            .map_err(|e| PriceSentryError::api("binance", format!("bad price field: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_url_joins_lowercased_streams() {
        let v = BinanceVariant;
        let url = v.stream_url(&[
            Symbol::canonical("BTC", "USDT", "USDT"),
            Symbol::canonical("ETH", "USDT", "USDT"),
        ]);
        assert_eq!(
            url,
            "wss://fstream.binance.com/stream?streams=btcusdt@aggTrade/ethusdt@aggTrade"
        );
    }

    #[test]
    fn rest_ticker_url_uses_wire_form() {
        let v = BinanceVariant;
        let url = v.rest_ticker_url(&Symbol::canonical("BTC", "USDT", "USDT"));
        assert_eq!(url, "https://fapi.binance.com/fapi/v1/ticker/price?symbol=BTCUSDT");
    }

    #[test]
    fn parses_agg_trade_frame_into_canonical_symbol() {
        let v = BinanceVariant;
        let frame = r#"{"stream":"btcusdt@aggTrade","data":{"s":"BTCUSDT","p":"61234.50"}}"#;
        let (symbol, price) = v.parse_stream_message(frame).unwrap();
        assert_eq!(symbol.as_str(), "BTC/USDT:USDT");
        assert_eq!(price, 61234.50);
    }

    #[test]
    fn parses_rest_ticker() {
        let v = BinanceVariant;
        let price = v.parse_rest_price(r#"{"symbol":"BTCUSDT","price":"61000.00"}"#).unwrap();
        assert_eq!(price, 61000.0);
    }
}

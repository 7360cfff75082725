// =============================================================================
// OKX public swap variant
// =============================================================================
//
// OKX's public channel doesn't encode subscriptions in the URL — a
// `{"op":"subscribe","args":[...]}` text frame must be sent right after
// connecting, which is why `ExchangeVariant::subscribe_payload` exists
// (Binance doesn't need it; OKX and Bybit both do).
// =============================================================================

use serde::Deserialize;

use crate::error::PriceSentryError;
use crate::types::Symbol;

use super::ExchangeVariant;

const STREAM_URL: &str = "wss://ws.okx.com:8443/ws/v5/public";
const REST_BASE: &str = "https://www.okx.com/api/v5/market/ticker";

pub struct OkxVariant;

/// OKX's wire format is `BASE-QUOTE-SWAP` (`BTC-USDT-SWAP`). Falls back to
/// the symbol's raw string if it isn't in canonical `BASE/QUOTE:SETTLE`
/// form.
fn to_wire(symbol: &Symbol) -> String {
    match symbol.parts() {
        Some((base, quote, _settle)) => format!("{base}-{quote}-SWAP"),
        None => symbol.as_str().to_string(),
    }
}

fn to_canonical(wire: &str) -> Symbol {
    let mut segments = wire.splitn(3, '-');
    match (segments.next(), segments.next(), segments.next()) {
        (Some(base), Some(quote), Some("SWAP")) => Symbol::canonical(base, quote, quote),
        _ => Symbol::new(wire),
    }
}

#[derive(Deserialize)]
struct TickerEnvelope {
    #[serde(default)]
    data: Vec<TickerData>,
}

#[derive(Deserialize)]
struct TickerData {
    #[serde(rename = "instId")]
    inst_id: String,
    last: String,
}

#[derive(Deserialize)]
struct RestEnvelope {
    data: Vec<TickerData>,
}

impl ExchangeVariant for OkxVariant {
    fn name(&self) -> &'static str {
        "okx"
    }

    fn stream_url(&self, _symbols: &[Symbol]) -> String {
        STREAM_URL.to_string()
    }

    fn rest_ticker_url(&self, symbol: &Symbol) -> String {
        format!("{REST_BASE}?instId={}", to_wire(symbol))
    }

    fn subscribe_payload(&self, symbols: &[Symbol]) -> Option<String> {
        let args: Vec<String> = symbols
            .iter()
            .map(|s| format!(r#"{{"channel":"tickers","instId":"{}"}}"#, to_wire(s)))
            .collect();
        Some(format!(r#"{{"op":"subscribe","args":[{}]}}"#, args.join(",")))
    }

    fn parse_stream_message(&self, text: &str) -> Option<(Symbol, f64)> {
        let envelope: TickerEnvelope = serde_json::from_str(text).ok()?;
        let first = envelope.data.into_iter().next()?;
        let price: f64 = first.last.parse().ok()?;
        Some((to_canonical(&first.inst_id), price))
    }

    fn parse_rest_price(&self, body: &str) -> Result<f64, PriceSentryError> {
        let envelope: RestEnvelope = serde_json::from_str(body)
            .map_err(|e| PriceSentryError::api("okx", format!("unparseable ticker: {e}")))?;
        let first = envelope
            .data
            .into_iter()
            .next()
            .ok_or_else(|| PriceSentryError::api("okx", "empty ticker data"))?;
        first
            .last
            .parse()
            .map_err(|e| PriceSentryError::api("okx", format!("bad price field: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ticker_channel_frame_into_canonical_symbol() {
        let v = OkxVariant;
        let frame = r#"{"arg":{"channel":"tickers","instId":"BTC-USDT-SWAP"},"data":[{"instId":"BTC-USDT-SWAP","last":"61234.5"}]}"#;
        let (symbol, price) = v.parse_stream_message(frame).unwrap();
        assert_eq!(symbol.as_str(), "BTC/USDT:USDT");
        assert_eq!(price, 61234.5);
    }

    #[test]
    fn subscribe_payload_lists_every_symbol_in_wire_form() {
        let v = OkxVariant;
        let payload = v
            .subscribe_payload(&[Symbol::canonical("BTC", "USDT", "USDT")])
            .unwrap();
        assert!(payload.contains("BTC-USDT-SWAP"));
        assert!(payload.contains("\"op\":\"subscribe\""));
    }

    #[test]
    fn rest_ticker_url_uses_wire_form() {
        let v = OkxVariant;
        let url = v.rest_ticker_url(&Symbol::canonical("BTC", "USDT", "USDT"));
        assert_eq!(url, "https://www.okx.com/api/v5/market/ticker?instId=BTC-USDT-SWAP");
    }
}

// =============================================================================
// Shared data model — symbols, price points, movers, alerts
// =============================================================================
//
// These types are the nouns every other module passes around. None of them
// own behaviour beyond small, total helper methods; the interesting logic
// lives in the modules that consume them (`detector`, `cooldown`, `history`).
// =============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

/// A wire-format-independent contract identifier in `BASE/QUOTE:SETTLE`
/// form, e.g. `BTC/USDT:USDT`. This is the canonical shape every `Symbol`
/// is expected to carry once it leaves the exchange layer — each
/// `ExchangeVariant` is responsible for translating its own wire format
/// (`BTCUSDT`, `BTC-USDT-SWAP`, ...) to and from this shape at the
/// stream/REST boundary.
///
/// Cheap to clone (wraps a `String`) and compares case-sensitively — the
/// `MarketCatalog` is responsible for producing symbols already in
/// canonical case before they ever reach a `Symbol`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Symbol(pub String);

impl Symbol {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Build the canonical `BASE/QUOTE:SETTLE` form, e.g.
    /// `Symbol::canonical("BTC", "USDT", "USDT")` -> `BTC/USDT:USDT`.
    pub fn canonical(base: &str, quote: &str, settle: &str) -> Self {
        Self(format!("{base}/{quote}:{settle}"))
    }

    /// Split a canonical symbol back into its `(base, quote, settle)` parts.
    /// `None` if the symbol isn't in canonical form (e.g. a raw wire-format
    /// string that was never translated).
    pub fn parts(&self) -> Option<(&str, &str, &str)> {
        let (base, rest) = self.0.split_once('/')?;
        let (quote, settle) = rest.split_once(':')?;
        Some((base, quote, settle))
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::ops::Deref for Symbol {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

/// A single observed price at a point in time.
///
/// `timestamp_ms` is wall-clock time at message receipt, not an
/// exchange-reported timestamp — see `history::PriceHistoryRing`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp_ms: i64,
    pub price: f64,
}

impl PricePoint {
    pub fn new(timestamp_ms: i64, price: f64) -> Self {
        Self {
            timestamp_ms,
            price,
        }
    }
}

/// LOW/MEDIUM/HIGH classification of a mover, derived from configured
/// percentage-change cutoffs. See `cooldown::Classifier`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

/// Operational severity of an `AlertRecord`, distinct from `Priority`: a
/// `Priority` classifies how big a move is, while a severity classifies how
/// loud the log line reporting it should be. The detector maps priority to
/// severity at the boundary (`From<Priority>` below); `Warning`/`Info` are
/// reserved for non-mover operational alerts raised elsewhere (e.g. config
/// validation warnings), matching the mixed vocabulary the data model
/// allows and leaves to implementation discretion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Warning,
    Info,
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

impl From<Priority> for AlertSeverity {
    fn from(p: Priority) -> Self {
        match p {
            Priority::Low => Self::Low,
            Priority::Medium => Self::Medium,
            Priority::High => Self::High,
        }
    }
}

/// A symbol whose `|change_percent|` strictly exceeded the configured
/// threshold over the detector's current window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mover {
    pub symbol: Symbol,
    pub change_percent: f64,
    pub priority: Priority,
    pub reference_price: f64,
    pub current_price: f64,
}

/// An immutable record of a single emitted alert. `id` is a monotonically
/// assigned identifier local to this process — it is not persisted and
/// carries no meaning across restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: u64,
    pub symbol: Symbol,
    pub message: String,
    pub severity: AlertSeverity,
    pub price: f64,
    pub change_percent: f64,
    pub threshold: f64,
    pub minutes: f64,
    pub ts: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_display_round_trips_inner_string() {
        let s = Symbol::new("BTCUSDT");
        assert_eq!(s.to_string(), "BTCUSDT");
        assert_eq!(s.as_str(), "BTCUSDT");
    }

    #[test]
    fn priority_maps_onto_severity() {
        assert_eq!(AlertSeverity::from(Priority::High), AlertSeverity::High);
        assert_eq!(AlertSeverity::from(Priority::Low), AlertSeverity::Low);
    }

    #[test]
    fn canonical_symbol_round_trips_through_parts() {
        let s = Symbol::canonical("BTC", "USDT", "USDT");
        assert_eq!(s.as_str(), "BTC/USDT:USDT");
        assert_eq!(s.parts(), Some(("BTC", "USDT", "USDT")));
    }

    #[test]
    fn non_canonical_symbol_has_no_parts() {
        let s = Symbol::new("BTCUSDT");
        assert_eq!(s.parts(), None);
    }
}

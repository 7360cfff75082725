// =============================================================================
// PriceHistoryRing — bounded, per-symbol price history
// =============================================================================
//
// `RwLock<HashMap<Symbol, VecDeque<PricePoint>>>`, capacity-bounded and
// periodically trimmed. Stores raw price points rather than OHLC candles —
// the Movement Detector needs point-in-time lookups, not bar aggregation.
// =============================================================================

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::RwLock;
use tracing::debug;

use crate::types::{PricePoint, Symbol};

/// Maximum points retained per symbol. At one point per second this covers
/// a little over an hour, matching `MAX_AGE_MS` below.
const CAPACITY: usize = 3600;
/// Points older than this are dropped on `cleanup`.
const MAX_AGE_MS: i64 = 3_600_000;
/// Minimum spacing between `cleanup` passes, so a hot `record` loop doesn't
/// pay the sweep cost on every tick.
const CLEANUP_INTERVAL_MS: i64 = 60_000;

pub struct PriceHistoryRing {
    series: RwLock<HashMap<Symbol, VecDeque<PricePoint>>>,
    last_cleanup_ms: AtomicI64,
}

impl PriceHistoryRing {
    pub fn new() -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
            last_cleanup_ms: AtomicI64::new(0),
        }
    }

    /// Append a point for `symbol`, evicting the oldest entry if the ring is
    /// already at capacity, and opportunistically run `cleanup` if enough
    /// wall-clock time has passed since the last sweep.
    pub fn record(&self, symbol: &Symbol, point: PricePoint) {
        {
            let mut series = self.series.write();
            let deque = series.entry(symbol.clone()).or_default();
            if deque.len() >= CAPACITY {
                deque.pop_front();
            }
            deque.push_back(point);
        }
        self.maybe_cleanup(point.timestamp_ms);
    }

    fn maybe_cleanup(&self, now_ms: i64) {
        let last = self.last_cleanup_ms.load(Ordering::Relaxed);
        if now_ms - last < CLEANUP_INTERVAL_MS {
            return;
        }
        if self
            .last_cleanup_ms
            .compare_exchange(last, now_ms, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            self.cleanup(now_ms);
        }
    }

    /// Drop points older than `MAX_AGE_MS` relative to `now_ms` across every
    /// tracked symbol. Empty series are removed entirely so the map doesn't
    /// grow unbounded with symbols that stopped streaming.
    pub fn cleanup(&self, now_ms: i64) {
        let cutoff = now_ms - MAX_AGE_MS;
        let mut series = self.series.write();
        let mut dropped = 0usize;
        series.retain(|_, deque| {
            let before = deque.len();
            deque.retain(|p| p.timestamp_ms >= cutoff);
            dropped += before - deque.len();
            !deque.is_empty()
        });
        if dropped > 0 {
            debug!(dropped, "price history cleanup evicted stale points");
        }
    }

    /// Find the point with minimum `|timestamp_ms - target_ms|`, scanning
    /// every point in the ring — a point strictly after `target_ms` can be
    /// the true nearest neighbor, so this does not stop at the most recent
    /// point at-or-before the target. Used by the Movement Detector to
    /// fetch an `N`-minutes-ago reference price.
    pub fn closest(&self, symbol: &Symbol, target_ms: i64) -> Option<PricePoint> {
        let series = self.series.read();
        let deque = series.get(symbol)?;
        deque
            .iter()
            .min_by_key(|p| (p.timestamp_ms - target_ms).abs())
            .copied()
    }

    pub fn latest(&self, symbol: &Symbol) -> Option<PricePoint> {
        self.series.read().get(symbol).and_then(|d| d.back().copied())
    }

    pub fn len(&self, symbol: &Symbol) -> usize {
        self.series.read().get(symbol).map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.series.read().is_empty()
    }

    pub fn tracked_symbols(&self) -> Vec<Symbol> {
        self.series.read().keys().cloned().collect()
    }
}

impl Default for PriceHistoryRing {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym() -> Symbol {
        Symbol::new("BTCUSDT")
    }

    #[test]
    fn record_and_latest() {
        let ring = PriceHistoryRing::new();
        ring.record(&sym(), PricePoint::new(1_000, 100.0));
        ring.record(&sym(), PricePoint::new(2_000, 101.0));
        assert_eq!(ring.latest(&sym()).unwrap().price, 101.0);
        assert_eq!(ring.len(&sym()), 2);
    }

    #[test]
    fn ring_evicts_oldest_at_capacity() {
        let ring = PriceHistoryRing::new();
        for i in 0..(CAPACITY + 10) {
            ring.record(&sym(), PricePoint::new(i as i64, i as f64));
        }
        assert_eq!(ring.len(&sym()), CAPACITY);
        assert_eq!(ring.latest(&sym()).unwrap().timestamp_ms, (CAPACITY + 9) as i64);
    }

    #[test]
    fn closest_finds_nearest_point_at_or_before_target() {
        let ring = PriceHistoryRing::new();
        ring.record(&sym(), PricePoint::new(1_000, 10.0));
        ring.record(&sym(), PricePoint::new(5_000, 20.0));
        ring.record(&sym(), PricePoint::new(9_000, 30.0));

        let found = ring.closest(&sym(), 6_000).unwrap();
        assert_eq!(found.price, 20.0);
    }

    #[test]
    fn closest_prefers_a_later_point_when_it_is_nearer() {
        let ring = PriceHistoryRing::new();
        ring.record(&sym(), PricePoint::new(58_000, 10.0));
        ring.record(&sym(), PricePoint::new(61_000, 20.0));

        let found = ring.closest(&sym(), 60_000).unwrap();
        assert_eq!(found.price, 20.0);
    }

    #[test]
    fn cleanup_drops_stale_points_and_empty_series() {
        let ring = PriceHistoryRing::new();
        ring.record(&sym(), PricePoint::new(0, 1.0));
        ring.cleanup(MAX_AGE_MS + 1_000);
        assert!(ring.is_empty());
    }
}

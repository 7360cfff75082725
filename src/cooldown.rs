// =============================================================================
// Cooldown & Priority Classifier
// =============================================================================
//
// Tracks the last time a symbol was notified, and refuses to notify again
// until the cooldown window elapses — except that a HIGH-priority move can
// bypass the cooldown entirely when the operator has opted into that
// behaviour.
// =============================================================================

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::config::PriorityThresholds;
use crate::types::{Priority, Symbol};

pub struct CooldownClassifier {
    last_sent_ms: RwLock<HashMap<Symbol, i64>>,
}

impl CooldownClassifier {
    pub fn new() -> Self {
        Self {
            last_sent_ms: RwLock::new(HashMap::new()),
        }
    }

    /// Classify a percentage change into LOW/MEDIUM/HIGH against the
    /// configured thresholds. `change_percent` may be signed; only its
    /// magnitude is classified.
    pub fn classify(change_percent: f64, thresholds: &PriorityThresholds) -> Priority {
        let magnitude = change_percent.abs();
        if magnitude >= thresholds.high {
            Priority::High
        } else if magnitude >= thresholds.medium {
            Priority::Medium
        } else {
            Priority::Low
        }
    }

    /// Whether `symbol` may be notified right now, given `priority` and the
    /// configured cooldown window. A HIGH-priority mover bypasses the
    /// cooldown when `bypass_high` is set — the operator's lever for
    /// "never let the loudest alerts stay silent".
    pub fn should_notify(
        &self,
        symbol: &Symbol,
        priority: Priority,
        now_ms: i64,
        cooldown_ms: i64,
        bypass_high: bool,
    ) -> bool {
        if bypass_high && priority == Priority::High {
            return true;
        }
        let last_sent = self.last_sent_ms.read();
        match last_sent.get(symbol) {
            Some(&last) => now_ms.saturating_sub(last) >= cooldown_ms,
            None => true,
        }
    }

    /// Record that `symbol` was just notified at `now_ms`.
    pub fn record(&self, symbol: &Symbol, now_ms: i64) {
        self.last_sent_ms.write().insert(symbol.clone(), now_ms);
    }

    pub fn last_sent(&self, symbol: &Symbol) -> Option<i64> {
        self.last_sent_ms.read().get(symbol).copied()
    }
}

impl Default for CooldownClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> PriorityThresholds {
        PriorityThresholds {
            low: 1.0,
            medium: 3.0,
            high: 5.0,
        }
    }

    #[test]
    fn classify_picks_the_right_bucket() {
        assert_eq!(CooldownClassifier::classify(0.5, &thresholds()), Priority::Low);
        assert_eq!(CooldownClassifier::classify(3.2, &thresholds()), Priority::Medium);
        assert_eq!(CooldownClassifier::classify(-6.0, &thresholds()), Priority::High);
    }

    #[test]
    fn first_notification_always_allowed() {
        let gate = CooldownClassifier::new();
        assert!(gate.should_notify(&Symbol::new("BTCUSDT"), Priority::Low, 0, 60_000, false));
    }

    #[test]
    fn cooldown_blocks_until_window_elapses() {
        let gate = CooldownClassifier::new();
        let sym = Symbol::new("BTCUSDT");
        gate.record(&sym, 0);
        assert!(!gate.should_notify(&sym, Priority::Low, 30_000, 60_000, false));
        assert!(gate.should_notify(&sym, Priority::Low, 60_000, 60_000, false));
    }

    #[test]
    fn high_priority_bypasses_cooldown_when_enabled() {
        let gate = CooldownClassifier::new();
        let sym = Symbol::new("BTCUSDT");
        gate.record(&sym, 0);
        assert!(gate.should_notify(&sym, Priority::High, 1_000, 60_000, true));
        assert!(!gate.should_notify(&sym, Priority::High, 1_000, 60_000, false));
    }
}

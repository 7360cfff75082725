// =============================================================================
// Observer — snapshot publish/subscribe
// =============================================================================
//
// A pull-based God-object that assembles its own snapshot DTO on demand
// couples the core tightly to whatever consumes it. This inverts that: the
// core engine *pushes* snapshots to whoever subscribed, with no back-pointer
// from the core to a concrete dashboard. A dashboard HTTP/WebSocket server
// is out of scope — only the publish/subscribe seam is built here.
// =============================================================================

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::types::{AlertRecord, Symbol};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub prices: Vec<(Symbol, f64)>,
    pub recent_alerts: Vec<AlertRecord>,
    pub connected: bool,
    pub ts: i64,
}

pub trait Observer: Send + Sync {
    fn on_snapshot(&self, snapshot: &Snapshot);
}

/// Fan-out registry the Supervisor publishes to every tick. Each observer
/// call is isolated with `catch_unwind`, the same "a bad subscriber must
/// not take down the loop" guarantee `config::store::ConfigurationStore`
/// gives its listeners.
#[derive(Default)]
pub struct ObserverRegistry {
    observers: parking_lot::RwLock<Vec<Arc<dyn Observer>>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: Arc<dyn Observer>) {
        self.observers.write().push(observer);
    }

    pub fn publish(&self, snapshot: &Snapshot) {
        let observers: Vec<Arc<dyn Observer>> = self.observers.read().clone();
        for observer in observers {
            let snapshot_ref = snapshot;
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                observer.on_snapshot(snapshot_ref);
            }));
            if result.is_err() {
                error!("observer panicked on snapshot publish; continuing");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingObserver(Arc<AtomicUsize>);
    impl Observer for CountingObserver {
        fn on_snapshot(&self, _snapshot: &Snapshot) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn publish_reaches_every_subscriber() {
        let registry = ObserverRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        registry.subscribe(Arc::new(CountingObserver(Arc::clone(&count))));
        registry.subscribe(Arc::new(CountingObserver(Arc::clone(&count))));

        registry.publish(&Snapshot::default());
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}

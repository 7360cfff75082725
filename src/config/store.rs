// =============================================================================
// ConfigurationStore — the single source of truth for live configuration
// =============================================================================
//
// Persists config as YAML with a `.tmp`-write-then-`rename` so a crash
// mid-write never corrupts the on-disk file, and layers a subscribe/notify
// mechanism on top since config changes here must reach a running
// Supervisor without restarting the process.
// =============================================================================

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{error, info, warn};

use super::model::{Config, ConfigDiff, ConfigUpdateEvent};
use super::validate::{validate, ValidationReport};
use crate::error::PriceSentryError;

pub type ListenerId = u64;
type Listener = Arc<dyn Fn(&ConfigUpdateEvent) + Send + Sync>;

/// Outcome of a call to `ConfigurationStore::update`.
pub struct UpdateOutcome {
    pub applied: bool,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub diff: ConfigDiff,
}

pub struct ConfigurationStore {
    path: PathBuf,
    current: RwLock<Config>,
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
    next_listener_id: AtomicU64,
}

impl ConfigurationStore {
    /// Load `path`, falling back to defaults (and creating the file) if it
    /// does not exist yet.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, PriceSentryError> {
        let path = path.into();

        let config = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            let candidate: Config = serde_yaml::from_str(&raw)?;
            let report = validate(&candidate)?;
            for w in &report.warnings {
                warn!(path = %path.display(), warning = w, "config warning at load");
            }
            if !report.ok() {
                return Err(PriceSentryError::configuration(format!(
                    "invalid config at {}: {:?}",
                    path.display(),
                    report.errors
                )));
            }
            candidate
        } else {
            info!(path = %path.display(), "config file missing, writing defaults");
            let defaults = Config::default();
            write_atomic(&path, &defaults)?;
            defaults
        };

        Ok(Self {
            path,
            current: RwLock::new(config),
            listeners: RwLock::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
        })
    }

    pub fn get(&self) -> Config {
        self.current.read().clone()
    }

    /// Validate and apply `candidate`. Persists to disk and notifies
    /// subscribers only if the candidate differs from the current config
    /// and passes validation. Listener callbacks run *after* the write lock
    /// is dropped — never call a listener while holding `self.current`.
    pub fn update(&self, candidate: Config) -> Result<UpdateOutcome, PriceSentryError> {
        let report: ValidationReport = validate(&candidate)?;
        for w in &report.warnings {
            warn!(warning = w, "config update warning");
        }
        if !report.ok() {
            return Ok(UpdateOutcome {
                applied: false,
                warnings: report.warnings,
                errors: report.errors,
                diff: ConfigDiff::default(),
            });
        }

        let previous = self.current.read().clone();
        if previous == candidate {
            return Ok(UpdateOutcome {
                applied: true,
                warnings: report.warnings,
                errors: Vec::new(),
                diff: ConfigDiff::default(),
            });
        }

        write_atomic(&self.path, &candidate)?;

        let diff = diff_config(&previous, &candidate);
        *self.current.write() = candidate.clone();

        let event = ConfigUpdateEvent {
            previous,
            current: candidate,
            diff: diff.clone(),
        };
        self.notify(&event);

        Ok(UpdateOutcome {
            applied: true,
            warnings: report.warnings,
            errors: Vec::new(),
            diff,
        })
    }

    /// Re-read the config file from disk, applying the same validation and
    /// notification path as `update`. Used for an external `SIGHUP`-style
    /// reload trigger (not wired to a signal here — out of scope — but
    /// callable by whatever does wire one up).
    pub fn reload_from_disk(&self) -> Result<UpdateOutcome, PriceSentryError> {
        let raw = fs::read_to_string(&self.path)?;
        let candidate: Config = serde_yaml::from_str(&raw)?;
        self.update(candidate)
    }

    /// Register a listener, invoked with every successfully applied
    /// `ConfigUpdateEvent`. Returns an id usable with `unsubscribe`. A
    /// listener that panics is caught and logged, never allowed to take
    /// down the notifying thread or block other listeners.
    pub fn subscribe(&self, listener: Listener) -> ListenerId {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.write().push((id, listener));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) {
        self.listeners.write().retain(|(lid, _)| *lid != id);
    }

    fn notify(&self, event: &ConfigUpdateEvent) {
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();

        for listener in listeners {
            let event_ref = event;
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener(event_ref);
            }));
            if result.is_err() {
                error!("config update listener panicked; continuing with remaining listeners");
            }
        }
    }
}

fn write_atomic(path: &Path, config: &Config) -> Result<(), PriceSentryError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp_path = path.with_extension("yaml.tmp");
    let yaml = serde_yaml::to_string(config)?;
    fs::write(&tmp_path, yaml)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Compute the set of changed top-level keys and derive the two reload
/// flags. Field-by-field rather than a generic diff — the key names need to
/// match `config.yaml`'s vocabulary for downstream logging.
fn diff_config(previous: &Config, current: &Config) -> ConfigDiff {
    let mut changed = Vec::new();

    macro_rules! track {
        ($field:ident, $name:literal) => {
            if previous.$field != current.$field {
                changed.push($name.to_string());
            }
        };
    }

    track!(exchange, "exchange");
    track!(default_timeframe, "defaultTimeframe");
    track!(check_interval, "checkInterval");
    track!(default_threshold, "defaultThreshold");
    track!(symbols_file_path, "symbolsFilePath");
    track!(symbols, "symbols");
    track!(notification_channels, "notificationChannels");
    track!(notification_symbols, "notificationSymbols");
    track!(notification_timezone, "notificationTimezone");
    track!(notification_cooldown, "notificationCooldown");
    track!(priority_thresholds, "priorityThresholds");
    track!(
        high_priority_bypass_cooldown,
        "highPriorityBypassCooldown"
    );
    track!(telegram, "telegram");
    track!(attach_chart, "attachChart");
    track!(chart, "chart");
    track!(log_level, "logLevel");

    ConfigDiff {
        requires_exchange_reload: changed.iter().any(|k| k == "exchange"),
        requires_symbol_reload: changed
            .iter()
            .any(|k| k == "symbols" || k == "symbolsFilePath"),
        changed_keys: changed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("pricesentry-test-{name}-{}.yaml", std::process::id()))
    }

    #[test]
    fn load_missing_file_writes_defaults() {
        let path = temp_path("load-missing");
        let _ = fs::remove_file(&path);
        let store = ConfigurationStore::load(&path).unwrap();
        assert_eq!(store.get(), Config::default());
        assert!(path.exists());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn update_rejects_invalid_candidate_without_writing() {
        let path = temp_path("update-invalid");
        let _ = fs::remove_file(&path);
        let store = ConfigurationStore::load(&path).unwrap();

        let mut bad = Config::default();
        bad.default_threshold = -1.0;
        let outcome = store.update(bad).unwrap();
        assert!(!outcome.applied);
        assert!(!outcome.errors.is_empty());
        assert_eq!(store.get(), Config::default());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn update_notifies_subscribers_with_diff() {
        let path = temp_path("update-notify");
        let _ = fs::remove_file(&path);
        let store = ConfigurationStore::load(&path).unwrap();

        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = Arc::clone(&seen);
        store.subscribe(Arc::new(move |event: &ConfigUpdateEvent| {
            assert!(event.diff.changed_keys.contains(&"defaultThreshold".to_string()));
            seen2.fetch_add(1, Ordering::SeqCst);
        }));

        let mut updated = Config::default();
        updated.default_threshold = 2.0;
        let outcome = store.update(updated).unwrap();
        assert!(outcome.applied);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn diff_flags_exchange_reload() {
        let mut a = Config::default();
        let mut b = Config::default();
        b.exchange = super::super::model::ExchangeKind::Okx;
        let diff = diff_config(&a, &b);
        assert!(diff.requires_exchange_reload);

        a.symbols = vec!["BTCUSDT".to_string()];
        let diff2 = diff_config(&Config::default(), &a);
        assert!(diff2.requires_symbol_reload);
    }
}

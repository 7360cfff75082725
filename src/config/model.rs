// =============================================================================
// Configuration model — `config/config.yaml` schema
// =============================================================================
//
// Every field carries `#[serde(default = "...")]` so that adding a field to
// this struct never breaks an existing config file on disk.
// =============================================================================

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeKind {
    Binance,
    Okx,
    Bybit,
}

impl Default for ExchangeKind {
    fn default() -> Self {
        Self::Binance
    }
}

impl std::fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Binance => write!(f, "binance"),
            Self::Okx => write!(f, "okx"),
            Self::Bybit => write!(f, "bybit"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannel {
    Console,
    Telegram,
    Webhook,
}

/// Which symbols get notified: every canonical symbol the catalog resolves
/// (`Default`), or an explicit allow-list (`List`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NotificationSymbols {
    Default(String),
    List(Vec<String>),
}

impl Default for NotificationSymbols {
    fn default() -> Self {
        Self::Default("default".to_string())
    }
}

impl NotificationSymbols {
    /// `None` means every resolved symbol is eligible for notification;
    /// `Some` is the explicit allow-list from `notificationSymbols`.
    pub fn allowed(&self) -> Option<&[String]> {
        match self {
            Self::Default(_) => None,
            Self::List(list) => Some(list),
        }
    }
}

fn default_exchange() -> ExchangeKind {
    ExchangeKind::Binance
}
fn default_timeframe() -> String {
    "1m".to_string()
}
fn default_check_interval() -> String {
    "1m".to_string()
}
fn default_threshold() -> f64 {
    1.0
}
fn default_symbols_file_path() -> String {
    "symbols.txt".to_string()
}
fn default_notification_channels() -> Vec<NotificationChannel> {
    vec![NotificationChannel::Console]
}
fn default_notification_timezone() -> String {
    "UTC".to_string()
}
fn default_notification_cooldown() -> String {
    "5m".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorityThresholds {
    #[serde(default = "default_low_threshold")]
    pub low: f64,
    #[serde(default = "default_medium_threshold")]
    pub medium: f64,
    #[serde(default = "default_high_threshold")]
    pub high: f64,
}

fn default_low_threshold() -> f64 {
    1.0
}
fn default_medium_threshold() -> f64 {
    3.0
}
fn default_high_threshold() -> f64 {
    5.0
}

impl Default for PriorityThresholds {
    fn default() -> Self {
        Self {
            low: default_low_threshold(),
            medium: default_medium_threshold(),
            high: default_high_threshold(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub webhook_secret: Option<String>,
}

impl std::fmt::Debug for TelegramConfigRedacted<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("enabled", &self.0.enabled)
            .field("bot_token", &self.0.bot_token.as_ref().map(|_| "<redacted>"))
            .field("chat_id", &self.0.chat_id)
            .field(
                "webhook_secret",
                &self.0.webhook_secret.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Wraps a `&TelegramConfig` so its secrets are redacted when logged.
pub struct TelegramConfigRedacted<'a>(pub &'a TelegramConfig);

fn default_chart_timeframe() -> String {
    "1h".to_string()
}
fn default_lookback_minutes() -> f64 {
    60.0
}
fn default_chart_theme() -> String {
    "dark".to_string()
}
fn default_chart_width() -> u32 {
    800
}
fn default_chart_height() -> u32 {
    400
}
fn default_chart_scale() -> String {
    "linear".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartConfig {
    #[serde(default)]
    pub attach: bool,
    #[serde(default = "default_chart_timeframe")]
    pub timeframe: String,
    #[serde(default = "default_lookback_minutes")]
    pub lookback_minutes: f64,
    #[serde(default = "default_chart_theme")]
    pub theme: String,
    #[serde(default = "default_chart_width")]
    pub width: u32,
    #[serde(default = "default_chart_height")]
    pub height: u32,
    #[serde(default = "default_chart_scale")]
    pub scale: String,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            attach: false,
            timeframe: default_chart_timeframe(),
            lookback_minutes: default_lookback_minutes(),
            theme: default_chart_theme(),
            width: default_chart_width(),
            height: default_chart_height(),
            scale: default_chart_scale(),
        }
    }
}

/// The full, resolved configuration used by every module. Produced by
/// `config::store::ConfigurationStore` — never deserialized standalone
/// without going through `validate::coerce_and_validate` first, which is
/// why there's no blanket `impl Default for Config` that skips validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "default_exchange")]
    pub exchange: ExchangeKind,

    #[serde(default = "default_timeframe")]
    pub default_timeframe: String,

    #[serde(default = "default_check_interval")]
    pub check_interval: String,

    #[serde(default = "default_threshold")]
    pub default_threshold: f64,

    #[serde(default = "default_symbols_file_path")]
    pub symbols_file_path: String,

    /// Resolved symbol tokens. Not a literal `config.yaml` key — populated
    /// by the CLI/env layer (`PS_SYMBOLS`) or by an external symbol-file
    /// loader (out of scope here); tracked on `Config` anyway because
    /// `ConfigDiff` needs to know when the effective symbol set changes.
    #[serde(default)]
    pub symbols: Vec<String>,

    #[serde(default = "default_notification_channels")]
    pub notification_channels: Vec<NotificationChannel>,

    #[serde(default)]
    pub notification_symbols: NotificationSymbols,

    #[serde(default = "default_notification_timezone")]
    pub notification_timezone: String,

    #[serde(default = "default_notification_cooldown")]
    pub notification_cooldown: String,

    #[serde(default)]
    pub priority_thresholds: PriorityThresholds,

    #[serde(default = "default_true")]
    pub high_priority_bypass_cooldown: bool,

    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default = "default_false")]
    pub attach_chart: bool,

    #[serde(default)]
    pub chart: ChartConfig,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            exchange: default_exchange(),
            default_timeframe: default_timeframe(),
            check_interval: default_check_interval(),
            default_threshold: default_threshold(),
            symbols_file_path: default_symbols_file_path(),
            symbols: Vec::new(),
            notification_channels: default_notification_channels(),
            notification_symbols: NotificationSymbols::default(),
            notification_timezone: default_notification_timezone(),
            notification_cooldown: default_notification_cooldown(),
            priority_thresholds: PriorityThresholds::default(),
            high_priority_bypass_cooldown: true,
            telegram: TelegramConfig::default(),
            attach_chart: false,
            chart: ChartConfig::default(),
            log_level: default_log_level(),
        }
    }
}

/// The set of changed top-level keys between two `Config` snapshots, plus
/// the two derived reload flags the Supervisor acts on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigDiff {
    pub changed_keys: Vec<String>,
    pub requires_exchange_reload: bool,
    pub requires_symbol_reload: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigUpdateEvent {
    pub previous: Config,
    pub current: Config,
    pub diff: ConfigDiff,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let cfg = Config::default();
        assert_eq!(cfg.exchange, ExchangeKind::Binance);
        assert_eq!(cfg.default_threshold, 1.0);
        assert!(cfg.high_priority_bypass_cooldown);
        assert_eq!(cfg.notification_channels, vec![NotificationChannel::Console]);
    }

    #[test]
    fn empty_yaml_deserializes_to_defaults() {
        let cfg: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn partial_yaml_only_overrides_given_fields() {
        let cfg: Config = serde_yaml::from_str("exchange: okx\ndefaultThreshold: 2.5\n").unwrap();
        assert_eq!(cfg.exchange, ExchangeKind::Okx);
        assert_eq!(cfg.default_threshold, 2.5);
        assert_eq!(cfg.check_interval, "1m");
    }

    #[test]
    fn roundtrips_through_yaml() {
        let cfg = Config::default();
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let back: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(cfg, back);
    }
}

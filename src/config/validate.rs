// =============================================================================
// Config validation — coercion + range/enum checks beyond what serde enforces
// =============================================================================

use once_cell::sync::Lazy;
use regex::Regex;

use super::model::Config;
use super::timeframe::parse_timeframe;
use crate::error::PriceSentryError;

static TELEGRAM_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+:[A-Za-z0-9_-]+$").expect("static telegram token regex"));
static TELEGRAM_CHAT_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?\d+$").expect("static telegram chat id regex"));

/// Result of validating a candidate config: warnings are informational and
/// don't block the update; the presence of any error string does.
pub struct ValidationReport {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }
}

const VALID_CHART_THEMES: &[&str] = &["dark", "light"];
const VALID_CHART_SCALES: &[&str] = &["linear", "log"];

/// Validate cross-field constraints: timeframe grammar, priority threshold
/// ordering, and Telegram requiring both a token and a chat id when enabled.
pub fn validate(candidate: &Config) -> Result<ValidationReport, PriceSentryError> {
    let mut warnings = Vec::new();
    let mut errors = Vec::new();

    if let Err(e) = parse_timeframe(&candidate.default_timeframe) {
        errors.push(format!("defaultTimeframe: {e}"));
    }
    if let Err(e) = parse_timeframe(&candidate.check_interval) {
        errors.push(format!("checkInterval: {e}"));
    } else if parse_timeframe(&candidate.check_interval).unwrap_or(0.0) <= 0.0 {
        errors.push("checkInterval must resolve to a positive number of minutes".to_string());
    }
    if let Err(e) = parse_timeframe(&candidate.notification_cooldown) {
        errors.push(format!("notificationCooldown: {e}"));
    }

    if !(0.001..=100.0).contains(&candidate.default_threshold) {
        errors.push("defaultThreshold must be within [0.001, 100]".to_string());
    }

    let pt = &candidate.priority_thresholds;
    if !(pt.low < pt.medium && pt.medium < pt.high) {
        errors.push(
            "priorityThresholds must satisfy low < medium < high".to_string(),
        );
    }
    if pt.low <= 0.0 {
        errors.push("priorityThresholds.low must be positive".to_string());
    }

    if candidate.telegram.enabled {
        let token = candidate.telegram.bot_token.as_deref().unwrap_or("");
        if !TELEGRAM_TOKEN_RE.is_match(token) {
            errors.push(
                "telegram.botToken must match ^\\d+:[A-Za-z0-9_-]+$ when telegram.enabled is true"
                    .to_string(),
            );
        }
        let chat_id = candidate.telegram.chat_id.as_deref().unwrap_or("");
        if !TELEGRAM_CHAT_ID_RE.is_match(chat_id) {
            errors.push(
                "telegram.chatId must match ^-?\\d+$ when telegram.enabled is true".to_string(),
            );
        }
    }

    if candidate.attach_chart || candidate.chart.attach {
        if !VALID_CHART_THEMES.contains(&candidate.chart.theme.as_str()) {
            errors.push(format!(
                "chart.theme must be one of {VALID_CHART_THEMES:?}, got {:?}",
                candidate.chart.theme
            ));
        }
        if !VALID_CHART_SCALES.contains(&candidate.chart.scale.as_str()) {
            errors.push(format!(
                "chart.scale must be one of {VALID_CHART_SCALES:?}, got {:?}",
                candidate.chart.scale
            ));
        }
        if candidate.chart.width == 0 || candidate.chart.height == 0 {
            errors.push("chart.width and chart.height must be positive".to_string());
        }
        if let Err(e) = parse_timeframe(&candidate.chart.timeframe) {
            errors.push(format!("chart.timeframe: {e}"));
        }
    }

    if candidate.notification_channels.is_empty() {
        warnings.push("notificationChannels is empty — alerts will only be logged".to_string());
    }

    Ok(ValidationReport { warnings, errors })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::{PriorityThresholds, TelegramConfig};

    #[test]
    fn default_config_validates_clean() {
        let report = validate(&Config::default()).unwrap();
        assert!(report.ok());
    }

    #[test]
    fn bad_priority_ordering_is_rejected() {
        let mut cfg = Config::default();
        cfg.priority_thresholds = PriorityThresholds {
            low: 5.0,
            medium: 3.0,
            high: 1.0,
        };
        let report = validate(&cfg).unwrap();
        assert!(!report.ok());
    }

    #[test]
    fn telegram_enabled_without_token_is_rejected() {
        let mut cfg = Config::default();
        cfg.telegram = TelegramConfig {
            enabled: true,
            bot_token: None,
            chat_id: Some("123".to_string()),
            webhook_secret: None,
        };
        let report = validate(&cfg).unwrap();
        assert!(!report.ok());
    }

    #[test]
    fn telegram_enabled_with_malformed_token_or_chat_id_is_rejected() {
        let mut cfg = Config::default();
        cfg.telegram = TelegramConfig {
            enabled: true,
            bot_token: Some("not-a-token".to_string()),
            chat_id: Some("not-an-id".to_string()),
            webhook_secret: None,
        };
        let report = validate(&cfg).unwrap();
        assert!(!report.ok());

        cfg.telegram.bot_token = Some("123456:ABC-def_ghi".to_string());
        cfg.telegram.chat_id = Some("-100123456".to_string());
        let report = validate(&cfg).unwrap();
        assert!(report.ok());
    }

    #[test]
    fn default_threshold_out_of_bounds_is_rejected() {
        let mut cfg = Config::default();
        cfg.default_threshold = 0.0001;
        assert!(!validate(&cfg).unwrap().ok());

        cfg.default_threshold = 100.1;
        assert!(!validate(&cfg).unwrap().ok());

        cfg.default_threshold = 0.001;
        assert!(validate(&cfg).unwrap().ok());

        cfg.default_threshold = 100.0;
        assert!(validate(&cfg).unwrap().ok());
    }
}

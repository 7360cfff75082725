// =============================================================================
// Error taxonomy — NETWORK / API / CONFIGURATION / SYSTEM / UNKNOWN
// =============================================================================
//
// `anyhow` still carries errors at the outermost boundaries (`main.rs`, REST
// helpers). This module adds the structured domain enum the higher layers
// (Supervisor, config store) need in order to decide whether an error is
// recoverable-and-local, surfaced-but-non-fatal, or boot-fatal.
// =============================================================================

use thiserror::Error;

/// Coarse category every `PriceSentryError` falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Api,
    Configuration,
    System,
    Unknown,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network => write!(f, "NETWORK"),
            Self::Api => write!(f, "API"),
            Self::Configuration => write!(f, "CONFIGURATION"),
            Self::System => write!(f, "SYSTEM"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Log-line severity implied by a given error, per the propagation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Error)]
pub enum PriceSentryError {
    #[error("network error: {0}")]
    Network(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("exchange api error ({exchange}): {message}")]
    Api { exchange: String, message: String },

    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("config file io error: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("config yaml error: {0}")]
    ConfigYaml(#[from] serde_yaml::Error),

    #[error("system error: {message}")]
    System { message: String },

    #[error("unknown error: {message}")]
    Unknown { message: String },
}

impl PriceSentryError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn api(exchange: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            exchange: exchange.into(),
            message: message.into(),
        }
    }

    pub fn system(message: impl Into<String>) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Network(_) | Self::Transport(_) => ErrorCategory::Network,
            Self::Api { .. } => ErrorCategory::Api,
            Self::Configuration { .. } | Self::ConfigIo(_) | Self::ConfigYaml(_) => {
                ErrorCategory::Configuration
            }
            Self::System { .. } => ErrorCategory::System,
            Self::Unknown { .. } => ErrorCategory::Unknown,
        }
    }

    /// Severity implied at the moment this error is raised. Callers may
    /// still choose to downgrade this (e.g. a single-symbol REST miss is
    /// logged at `warn!` even though the underlying error is `Api`) — this
    /// is the *default* mapping, not a mandate.
    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Network => ErrorSeverity::Warning,
            ErrorCategory::Api => ErrorSeverity::Warning,
            ErrorCategory::Configuration => ErrorSeverity::Critical,
            ErrorCategory::System => ErrorSeverity::Error,
            ErrorCategory::Unknown => ErrorSeverity::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_are_critical() {
        let e = PriceSentryError::configuration("bad threshold");
        assert_eq!(e.category(), ErrorCategory::Configuration);
        assert_eq!(e.severity(), ErrorSeverity::Critical);
    }

    #[test]
    fn api_errors_are_warnings_by_default() {
        let e = PriceSentryError::api("binance", "symbol not found");
        assert_eq!(e.category(), ErrorCategory::Api);
        assert_eq!(e.severity(), ErrorSeverity::Warning);
    }
}

// =============================================================================
// Timeframe grammar — "1m" / "4h" / "1.5d" -> minutes
// =============================================================================

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::PriceSentryError;

static TIMEFRAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+(?:\.\d+)?)([mhd])$").expect("static timeframe regex"));

/// Parse a timeframe literal (`"5m"`, `"4h"`, `"1d"`) into whole minutes.
///
/// Rejects negative numbers (the grammar has no sign token, so `-5m` simply
/// fails to match), unknown units, and non-finite numbers. Very small
/// positive values (`<= 0.05m`, `<= 0.005h`, `<= 0.001d`) coerce to exactly
/// `0.0` — they're indistinguishable from noise at this grammar's precision,
/// and the caller's range validation is what rejects a zero-minute window
/// where that makes no sense (e.g. `checkInterval`).
pub fn parse_timeframe(raw: &str) -> Result<f64, PriceSentryError> {
    let trimmed = raw.trim();
    let caps = TIMEFRAME_RE.captures(trimmed).ok_or_else(|| {
        PriceSentryError::configuration(format!("invalid timeframe literal: {raw:?}"))
    })?;

    let amount: f64 = caps[1]
        .parse()
        .map_err(|_| PriceSentryError::configuration(format!("invalid timeframe number: {raw:?}")))?;

    if !amount.is_finite() || amount < 0.0 {
        return Err(PriceSentryError::configuration(format!(
            "timeframe must be a non-negative finite number: {raw:?}"
        )));
    }

    let minutes = match &caps[2] {
        "m" if amount <= 0.05 => 0.0,
        "m" => amount,
        "h" if amount <= 0.005 => 0.0,
        "h" => amount * 60.0,
        "d" if amount <= 0.001 => 0.0,
        "d" => amount * 1440.0,
        other => {
            return Err(PriceSentryError::configuration(format!(
                "unsupported timeframe unit: {other:?}"
            )))
        }
    };

    Ok(minutes)
}

/// Render a minute count back into the most readable unit — used for log
/// lines and chart labels, not guaranteed to round-trip to the original
/// literal (`90` minutes formats as `"1.5h"`, not `"90m"`).
pub fn format_timeframe(minutes: f64) -> String {
    if minutes >= 1440.0 && (minutes / 1440.0).fract() == 0.0 {
        format!("{}d", (minutes / 1440.0) as i64)
    } else if minutes >= 60.0 && (minutes / 60.0).fract() == 0.0 {
        format!("{}h", (minutes / 60.0) as i64)
    } else if minutes.fract() == 0.0 {
        format!("{}m", minutes as i64)
    } else {
        format!("{minutes}m")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minutes_hours_days() {
        assert_eq!(parse_timeframe("5m").unwrap(), 5.0);
        assert_eq!(parse_timeframe("4h").unwrap(), 240.0);
        assert_eq!(parse_timeframe("1d").unwrap(), 1440.0);
        assert_eq!(parse_timeframe("1.5h").unwrap(), 90.0);
    }

    #[test]
    fn rejects_negative_and_malformed() {
        assert!(parse_timeframe("-5m").is_err());
        assert!(parse_timeframe("5x").is_err());
        assert!(parse_timeframe("m5").is_err());
        assert!(parse_timeframe("").is_err());
    }

    #[test]
    fn coerces_very_small_values_to_zero() {
        assert_eq!(parse_timeframe("0.05m").unwrap(), 0.0);
        assert_eq!(parse_timeframe("0.005h").unwrap(), 0.0);
        assert_eq!(parse_timeframe("0.001d").unwrap(), 0.0);
        assert!(parse_timeframe("0.06m").unwrap() > 0.0);
    }

    #[test]
    fn format_picks_largest_exact_unit() {
        assert_eq!(format_timeframe(90.0), "1.5h");
        assert_eq!(format_timeframe(120.0), "2h");
        assert_eq!(format_timeframe(1440.0), "1d");
        assert_eq!(format_timeframe(5.0), "5m");
    }
}

//! Typed value conversion.

use bstr::BStr;

use crate::ConfigError;

/// Boolean values per git's rules.
///
/// A key present without a value is true; an empty string is false;
/// otherwise `true|yes|on` / `false|no|off` (any case) or an integer
/// (zero false, nonzero true).
pub fn parse_bool(value: Option<&BStr>) -> Result<bool, ConfigError> {
    let Some(value) = value else { return Ok(true) };
    let text = String::from_utf8_lossy(value);
    let text = text.trim();
    if text.is_empty() {
        return Ok(false);
    }
    match text.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" => Ok(true),
        "false" | "no" | "off" => Ok(false),
        other => match other.parse::<i64>() {
            Ok(n) => Ok(n != 0),
            Err(_) => Err(ConfigError::BadBool(text.to_string())),
        },
    }
}

/// Integers with optional `k`, `m`, `g` suffixes (×1024ⁿ).
pub fn parse_int(value: &BStr) -> Result<i64, ConfigError> {
    let text = String::from_utf8_lossy(value);
    let text = text.trim();
    if text.is_empty() {
        return Err(ConfigError::BadInt("empty".into()));
    }

    let (digits, scale) = match text.as_bytes().last() {
        Some(b'k') | Some(b'K') => (&text[..text.len() - 1], 1024),
        Some(b'm') | Some(b'M') => (&text[..text.len() - 1], 1024 * 1024),
        Some(b'g') | Some(b'G') => (&text[..text.len() - 1], 1024 * 1024 * 1024),
        _ => (text, 1),
    };

    let base: i64 = digits
        .trim()
        .parse()
        .map_err(|_| ConfigError::BadInt(text.to_string()))?;
    base.checked_mul(scale)
        .ok_or_else(|| ConfigError::BadInt(format!("overflow: {text}")))
}

/// Durations in milliseconds: a number (fractions allowed) followed by a
/// unit token — `ms`, `sec`, `min`, `hour`, `day`, with the usual longer
/// spellings accepted.
pub fn parse_duration_ms(value: &BStr) -> Result<i64, ConfigError> {
    let text = String::from_utf8_lossy(value);
    let text = text.trim();
    if text.is_empty() {
        return Err(ConfigError::BadDuration("empty".into()));
    }

    let split = text
        .find(|c: char| c.is_ascii_alphabetic())
        .ok_or_else(|| ConfigError::UnknownUnit(text.to_string()))?;
    let (number, unit) = text.split_at(split);
    let number = number.trim();
    let unit = unit.trim();

    let scale_ms: f64 = match unit.to_ascii_lowercase().as_str() {
        "ms" | "millisecond" | "milliseconds" => 1.0,
        "s" | "sec" | "secs" | "second" | "seconds" => 1000.0,
        "min" | "mins" | "minute" | "minutes" => 60_000.0,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3_600_000.0,
        "d" | "day" | "days" => 86_400_000.0,
        other => return Err(ConfigError::UnknownUnit(other.to_string())),
    };

    let quantity: f64 = number
        .parse()
        .map_err(|_| ConfigError::BadDuration(text.to_string()))?;
    if !quantity.is_finite() || quantity < 0.0 {
        return Err(ConfigError::BadDuration(text.to_string()));
    }

    Ok((quantity * scale_ms).round() as i64)
}

//! Duration parsing for config values like "60s", "1000ms" or a bare millisecond count.

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{de, Deserializer};

const MS_PER_SECOND: u64 = 1000;
const MS_PER_MINUTE: u64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: u64 = 60 * MS_PER_MINUTE;
const MS_PER_DAY: u64 = 24 * MS_PER_HOUR;

/// Parse a duration string like "250ms", "60s", "5m", "1h", "1d".
///
/// A bare integer is read as milliseconds, matching the `*_ms` config keys.
/// The input is case-insensitive and whitespace is trimmed.
///
/// # Examples
///
/// ```
/// use lethex::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("60s").unwrap(), Duration::from_secs(60));
/// assert_eq!(parse_duration("1000ms").unwrap(), Duration::from_secs(1));
/// assert_eq!(parse_duration("1500").unwrap(), Duration::from_millis(1500));
/// ```
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();
    if s.is_empty() {
        anyhow::bail!("Duration is empty");
    }

    // "ms" must be checked before "m" and "s".
    let (num, unit_ms) = if let Some(num) = s.strip_suffix("ms") {
        (num, 1)
    } else if let Some(num) = s.strip_suffix('d') {
        (num, MS_PER_DAY)
    } else if let Some(num) = s.strip_suffix('h') {
        (num, MS_PER_HOUR)
    } else if let Some(num) = s.strip_suffix('m') {
        (num, MS_PER_MINUTE)
    } else if let Some(num) = s.strip_suffix('s') {
        (num, MS_PER_SECOND)
    } else {
        (s.as_str(), 1)
    };

    let num: u64 = num
        .trim()
        .parse()
        .with_context(|| format!("Invalid number in duration {s:?}"))?;
    let millis = num.checked_mul(unit_ms).context("Duration is too large")?;

    Ok(Duration::from_millis(millis))
}

/// Format a duration using the largest unit that divides it evenly.
///
/// ```
/// use lethex::duration::format_duration;
/// use std::time::Duration;
///
/// assert_eq!(format_duration(Duration::from_secs(60)), "1m");
/// assert_eq!(format_duration(Duration::from_millis(1500)), "1500ms");
/// ```
pub fn format_duration(d: Duration) -> String {
    let ms = u64::try_from(d.as_millis()).unwrap_or(u64::MAX);

    if ms == 0 {
        return "0ms".to_string();
    }
    for (unit, suffix) in [
        (MS_PER_DAY, "d"),
        (MS_PER_HOUR, "h"),
        (MS_PER_MINUTE, "m"),
        (MS_PER_SECOND, "s"),
    ] {
        if ms >= unit && ms % unit == 0 {
            return format!("{}{suffix}", ms / unit);
        }
    }
    format!("{ms}ms")
}

/// Serde deserializer accepting either an integer millisecond count or a
/// duration string.
///
/// Use with `#[serde(deserialize_with = "deserialize_millis")]`.
pub fn deserialize_millis<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct MillisVisitor;

    impl de::Visitor<'_> for MillisVisitor {
        type Value = Duration;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a millisecond count or a duration string like \"60s\"")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Duration, E> {
            Ok(Duration::from_millis(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Duration, E> {
            u64::try_from(v)
                .map(Duration::from_millis)
                .map_err(|_| E::custom("duration must not be negative"))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Duration, E> {
            parse_duration(v).map_err(E::custom)
        }
    }

    deserializer.deserialize_any(MillisVisitor)
}

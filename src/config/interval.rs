//! Interval strings such as `"1h"`, `"30m"`, `"1d"` or raw seconds.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

const UNITS: [(char, u64, &str); 4] = [
    ('d', 86_400, "days"),
    ('h', 3_600, "hours"),
    ('m', 60, "minutes"),
    ('s', 1, "seconds"),
];

/// Seconds in an interval such as `"1h"`, `"30m"`, `"1d"`, `"10s"` or `"3600"`.
pub fn parse_interval(s: &str) -> Result<u64, String> {
    let text = s.trim().to_lowercase();

    let unit = UNITS
        .iter()
        .find_map(|&(suffix, scale, name)| Some((text.strip_suffix(suffix)?, scale, name)));
    match unit {
        Some((count, scale, name)) => count
            .parse::<u64>()
            .ok()
            .and_then(|n| n.checked_mul(scale))
            .ok_or_else(|| format!("Invalid {}: {}", name, count)),
        None => text
            .parse::<u64>()
            .map_err(|_| format!("Invalid interval: {}. Use format like '1h', '30m', '1d'", text)),
    }
}

/// Largest whole unit that divides `secs`, e.g. `7200` is `"2h"`.
pub fn format_interval(secs: u64) -> String {
    let (suffix, scale, _) = UNITS
        .iter()
        .copied()
        .find(|&(_, scale, _)| secs >= scale && secs % scale == 0)
        .unwrap_or(('s', 1, "seconds"));
    format!("{}{}", secs / scale, suffix)
}

/// `#[serde(with = "interval")]` for `Duration` fields. Accepts strings or
/// bare integers (seconds).
pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Secs(u64),
        Text(String),
    }

    let secs = match Raw::deserialize(deserializer)? {
        Raw::Secs(secs) => secs,
        Raw::Text(text) => parse_interval(&text).map_err(serde::de::Error::custom)?,
    };
    Ok(Duration::from_secs(secs))
}

pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_interval(value.as_secs()))
}

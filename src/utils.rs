//! Small shared helpers: duration parsing and variable formatting

use crate::error::{ConfigError, ConfigResult};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Parse a duration such as `250ms`, `3s`, `5m` or `2h`.
///
/// A bare integer is read as seconds. Compound values (`1m30s`) are accepted.
pub fn parse_duration(input: &str) -> ConfigResult<Duration> {
    let s = input.trim();
    if s.is_empty() {
        return Err(ConfigError::InvalidDuration("empty duration".to_string()));
    }

    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let (num_part, unit_part, tail) = split_num_unit(rest, input)?;
        let value: u64 = num_part.parse().map_err(|_| {
            ConfigError::InvalidDuration(format!(
                "invalid duration number: {num_part} (from {input:?})"
            ))
        })?;

        let part = match unit_part {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value.saturating_mul(60)),
            "h" => Duration::from_secs(value.saturating_mul(60 * 60)),
            _ => {
                return Err(ConfigError::InvalidDuration(format!(
                    "invalid duration unit {unit_part:?} in {input:?} (expected ms|s|m|h)"
                )));
            }
        };
        total += part;
        rest = tail;
    }

    Ok(total)
}

fn split_num_unit<'a>(s: &'a str, input: &str) -> ConfigResult<(&'a str, &'a str, &'a str)> {
    let digits_end = s
        .char_indices()
        .find(|(_, ch)| !ch.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(s.len());

    if digits_end == 0 {
        return Err(ConfigError::InvalidDuration(format!(
            "invalid duration {input:?} (missing number)"
        )));
    }
    if digits_end >= s.len() {
        return Err(ConfigError::InvalidDuration(format!(
            "invalid duration {input:?} (missing unit; expected ms|s|m|h)"
        )));
    }

    let unit_end = s[digits_end..]
        .char_indices()
        .find(|(_, ch)| ch.is_ascii_digit())
        .map(|(i, _)| digits_end + i)
        .unwrap_or(s.len());

    Ok((&s[..digits_end], &s[digits_end..unit_end], &s[unit_end..]))
}

/// Deserialize an optional duration written as a string (`3s`) or integer seconds
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    use serde_yaml::Value;

    let value = Value::deserialize(deserializer)?;

    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_u64()
            .map(|secs| Some(Duration::from_secs(secs)))
            .ok_or_else(|| D::Error::custom("duration must be a non-negative integer")),
        Value::String(s) => parse_duration(&s).map(Some).map_err(D::Error::custom),
        _ => Err(D::Error::custom("duration must be a string or integer")),
    }
}

/// Render a resolved variable mapping as `name: value` lines
pub fn format_variables(vars: &BTreeMap<String, String>) -> String {
    vars.iter()
        .map(|(k, v)| format!("{}: {}", k, v))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
    }

    #[test]
    fn test_parse_duration_compound_and_bare() {
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("7").unwrap(), Duration::from_secs(7));
    }

    #[test]
    fn test_parse_duration_errors() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("10").is_ok());
        assert!(parse_duration("10d").is_err());
    }

    #[test]
    fn test_format_variables() {
        let mut vars = BTreeMap::new();
        vars.insert("b".to_string(), "2".to_string());
        vars.insert("a".to_string(), "1".to_string());
        assert_eq!(format_variables(&vars), "a: 1\nb: 2");
    }
}

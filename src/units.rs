//! Shared parsing utilities: byte-size and duration grammars.
//!
//! Both grammars share a shape: `[0-9]+<unit>`, leading zeros permitted, unit
//! is a single trailing ASCII letter drawn from a fixed set. Anything that
//! doesn't match — including a trailing letter outside that set — is
//! `InvalidFormat`. This mirrors the original Go implementation, whose
//! format regex is `^[0-9]+(b|k|m|g)$`: a bad unit never matches the regex
//! at all, so it never reaches a unit-specific branch; `ConfigError::InvalidUnit`
//! is kept on the error enum (see `error.rs`) but, as in the source, is
//! unreachable from these parsers — preserved rather than silently dropped.
//! The parser shape itself mirrors how the teacher keeps small
//! format-specific parsers (e.g. UUID hex formatting in
//! `codec::uuid_to_string`) as free functions next to the types that
//! consume them, rather than behind a general-purpose crate.

use std::time::Duration;

use crate::error::ConfigError;

/// Parse a byte-size string: `[0-9]+[bkmg]`, units are powers of 1024.
///
/// Examples: `"128b"` → 128, `"2k"` → 2048, `"00012k"` → 12288.
pub fn parse_size(s: &str) -> Result<u64, ConfigError> {
    let (digits, unit) = split_numeric_prefix(s)?;
    let multiplier: u64 = match unit {
        "b" => 1,
        "k" => 1024,
        "m" => 1024 * 1024,
        "g" => 1024 * 1024 * 1024,
        _ => return Err(ConfigError::InvalidFormat(s.to_string())),
    };
    let count: u64 = digits
        .parse()
        .map_err(|_| ConfigError::InvalidFormat(s.to_string()))?;
    Ok(count * multiplier)
}

/// Parse a duration string: `[0-9]+[smh]`.
///
/// Examples: `"1s"` → 1s, `"15s"` → 15s, `"30s"` → 30s.
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    let (digits, unit) = split_numeric_prefix(s)?;
    let seconds_per_unit: u64 = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => return Err(ConfigError::InvalidFormat(s.to_string())),
    };
    let count: u64 = digits
        .parse()
        .map_err(|_| ConfigError::InvalidFormat(s.to_string()))?;
    Ok(Duration::from_secs(count * seconds_per_unit))
}

/// Split `s` into its leading decimal-digit run and the single trailing
/// unit byte. Fails if `s` is not exactly `[0-9]+<one ascii letter>`.
fn split_numeric_prefix(s: &str) -> Result<(&str, &str), ConfigError> {
    if s.len() < 2 || !s.is_ascii() {
        return Err(ConfigError::InvalidFormat(s.to_string()));
    }
    let split_at = s.len() - 1;
    let (digits, unit) = s.split_at(split_at);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ConfigError::InvalidFormat(s.to_string()));
    }
    Ok((digits, unit))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_parser_scenario() {
        assert_eq!(parse_size("128b").unwrap(), 128);
        assert_eq!(parse_size("2k").unwrap(), 2048);
        assert_eq!(parse_size("00012k").unwrap(), 12288);
        assert!(matches!(
            parse_size("dfdsfb"),
            Err(ConfigError::InvalidFormat(_))
        ));
        assert!(matches!(
            parse_size("123t"),
            Err(ConfigError::InvalidFormat(_))
        ));
    }

    #[test]
    fn duration_parser_basic() {
        assert_eq!(parse_duration("1s").unwrap(), Duration::from_secs(1));
        assert_eq!(parse_duration("15s").unwrap(), Duration::from_secs(15));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert!(parse_duration("abc").is_err());
    }

    proptest::proptest! {
        #[test]
        fn size_parser_never_panics(s in "\\PC*") {
            let _ = parse_size(&s);
        }

        #[test]
        fn size_parser_roundtrips_generated(n in 0u64..1_000_000u64) {
            let s = format!("{n}b");
            proptest::prop_assert_eq!(parse_size(&s).unwrap(), n);
        }
    }
}

//! Human-readable cadence strings (`"30m"`, `"1h"`, `"1d12h"`).

use std::time::Duration;

use crate::error::VigilError;

/// Parse a cadence string into a [`Duration`].
///
/// Supports components `Xd`, `Xh`, `Xm`, `Xs`, combinable ("2h30m", "1d12h").
/// A bare number is read as seconds. Zero and unparseable input are errors.
pub fn parse_cadence(s: &str) -> Result<Duration, VigilError> {
    let invalid = || VigilError::InvalidCadence(s.to_string());
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(invalid());
    }

    let mut total_secs: u64 = 0;
    let mut num_buf = String::new();
    let mut found_unit = false;

    for ch in trimmed.chars() {
        if ch.is_ascii_digit() {
            num_buf.push(ch);
            continue;
        }
        let n: u64 = num_buf.parse().map_err(|_| invalid())?;
        num_buf.clear();
        let unit = match ch {
            'd' => 86_400,
            'h' => 3_600,
            'm' => 60,
            's' => 1,
            _ => return Err(invalid()),
        };
        total_secs = n
            .checked_mul(unit)
            .and_then(|v| total_secs.checked_add(v))
            .ok_or_else(invalid)?;
        found_unit = true;
    }

    if !num_buf.is_empty() {
        // "30m15" is ambiguous.
        if found_unit {
            return Err(invalid());
        }
        total_secs = num_buf.parse().map_err(|_| invalid())?;
    }

    if total_secs == 0 {
        return Err(invalid());
    }
    Ok(Duration::from_secs(total_secs))
}

/// Render a duration in the same compact form `parse_cadence` reads.
pub fn format_cadence(d: Duration) -> String {
    let mut secs = d.as_secs();
    if secs == 0 {
        return "0s".to_string();
    }
    let mut out = String::new();
    for (unit, suffix) in [(86_400, 'd'), (3_600, 'h'), (60, 'm'), (1, 's')] {
        if secs >= unit {
            out.push_str(&(secs / unit).to_string());
            out.push(suffix);
            secs %= unit;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_units() {
        assert_eq!(parse_cadence("30m").unwrap(), Duration::from_secs(1_800));
        assert_eq!(parse_cadence("1h").unwrap(), Duration::from_secs(3_600));
        assert_eq!(parse_cadence("1d").unwrap(), Duration::from_secs(86_400));
        assert_eq!(parse_cadence("90s").unwrap(), Duration::from_secs(90));
    }

    #[test]
    fn parses_combined_units() {
        assert_eq!(
            parse_cadence("1d2h30m15s").unwrap(),
            Duration::from_secs(86_400 + 7_200 + 1_800 + 15)
        );
    }

    #[test]
    fn bare_number_is_seconds() {
        assert_eq!(parse_cadence("120").unwrap(), Duration::from_secs(120));
    }

    #[test]
    fn rejects_bad_input() {
        for bad in ["", "  ", "abc", "30m15", "0m", "0", "5w"] {
            assert!(parse_cadence(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn format_reads_back() {
        for s in ["1h", "1d12h", "2h30m", "45s", "1d1s"] {
            let d = parse_cadence(s).unwrap();
            assert_eq!(format_cadence(d), s);
        }
    }
}

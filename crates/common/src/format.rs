//! Compact human-readable rendering of volumes ("1.5k", "2.3M") and its lossy inverse.

const SUFFIXES: [&str; 5] = ["", "k", "M", "B", "T"];

fn trim_decimals(s: &str) -> String {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s.to_string()
    }
}

/// Format a magnitude with a unit suffix.
///
/// Below 1000 the value keeps at most two decimals. From 1000 upward it is scaled
/// by 1000 per step up to "T"; scaled values of 100 or more are rounded to an
/// integer, smaller ones keep one decimal.
pub fn format_compact(n: f64) -> String {
    if n == 0.0 || !n.is_finite() {
        return "0".to_string();
    }

    if n.abs() < 1000.0 {
        let rounded = (n * 100.0).round() / 100.0;
        if rounded == 0.0 {
            return "0".to_string();
        }
        return trim_decimals(&format!("{rounded:.2}"));
    }

    let mut scaled = n;
    let mut idx = 0;
    while scaled.abs() >= 1000.0 && idx < SUFFIXES.len() - 1 {
        scaled /= 1000.0;
        idx += 1;
    }

    let suffix = SUFFIXES[idx];
    if scaled.abs() >= 100.0 {
        format!("{:.0}{suffix}", scaled.round())
    } else {
        format!("{scaled:.1}{suffix}")
    }
}

/// Recover an approximate number from a [`format_compact`] string.
///
/// Every character other than an ASCII digit or `.` is dropped before parsing, and a
/// trailing magnitude suffix scales the result back up. Anything unparsable is 0.
pub fn parse_compact(s: &str) -> f64 {
    let trimmed = s.trim();
    let numeric: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    let Ok(value) = numeric.parse::<f64>() else {
        return 0.0;
    };
    if !value.is_finite() {
        return 0.0;
    }

    let multiplier = SUFFIXES
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, suffix)| trimmed.ends_with(*suffix))
        .map_or(1.0, |(idx, _)| 1000_f64.powi(idx as i32));

    value * multiplier
}

/// Position of the magnitude suffix of a formatted string ("" = 0 .. "T" = 4).
pub fn suffix_rank(formatted: &str) -> usize {
    SUFFIXES
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, suffix)| formatted.ends_with(*suffix))
        .map_or(0, |(idx, _)| idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_and_non_finite() {
        assert_eq!(format_compact(0.0), "0");
        assert_eq!(format_compact(f64::NAN), "0");
        assert_eq!(format_compact(f64::INFINITY), "0");
        assert_eq!(format_compact(0.001), "0");
    }

    #[test]
    fn test_small_values_keep_two_decimals() {
        assert_eq!(format_compact(42.5), "42.5");
        assert_eq!(format_compact(3.0), "3");
        assert_eq!(format_compact(1.234), "1.23");
        assert_eq!(format_compact(999.0), "999");
    }

    #[test]
    fn test_threshold_between_999_and_1000() {
        // Rounds up to 1000 but is still below the scaling threshold.
        assert_eq!(format_compact(999.999), "1000");
        assert_eq!(format_compact(1000.0), "1.0k");
    }

    #[test]
    fn test_scaled_values() {
        assert_eq!(format_compact(1500.0), "1.5k");
        assert_eq!(format_compact(2_300_000.0), "2.3M");
        assert_eq!(format_compact(123_456.0), "123k");
        assert_eq!(format_compact(4_200_000_000.0), "4.2B");
        assert_eq!(format_compact(-1500.0), "-1.5k");
    }

    #[test]
    fn test_capped_at_trillions() {
        assert_eq!(format_compact(7.5e12), "7.5T");
        assert_eq!(format_compact(1e15), "1000T");
        assert_eq!(format_compact(2.5e18), "2500000T");
    }

    #[test]
    fn test_suffix_never_shrinks_for_larger_values() {
        let values = [1_000.0, 45_000.0, 999_000.0, 1.2e6, 3.3e9, 8.0e12, 5.0e16];
        for pair in values.windows(2) {
            let a = suffix_rank(&format_compact(pair[0]));
            let b = suffix_rank(&format_compact(pair[1]));
            assert!(b >= a, "{} -> {} shrank suffix", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_parse_compact_inverts_suffix() {
        assert!((parse_compact("1.5k") - 1500.0).abs() < 1e-9);
        assert!((parse_compact("2.3M") - 2_300_000.0).abs() < 1e-6);
        assert!((parse_compact("42.5") - 42.5).abs() < 1e-12);
        assert!((parse_compact(" 7T ") - 7e12).abs() < 1.0);
    }

    #[test]
    fn test_parse_compact_non_numeric_is_zero() {
        assert_eq!(parse_compact(""), 0.0);
        assert_eq!(parse_compact("n/a"), 0.0);
        assert_eq!(parse_compact("1.2.3k"), 0.0);
    }
}

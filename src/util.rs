// Parsing and formatting helpers.
//
// Everything that has to cope with messy spreadsheet cells lives here so
// the normalizer and the aggregation code can work with plain typed values.
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use num_format::{Locale, ToFormattedString};

/// Permissive float parse: skips leading whitespace and reads the longest
/// numeric prefix (`"12.5 kg"` -> `12.5`, `"1,234"` -> `1`).
///
/// Returns `None` when no digits lead the string or the result is not
/// finite, so callers can decide on their own default.
pub fn parse_number(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let len = bytes.len();
    let mut end = 0;

    if end < len && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    let int_start = end;
    while end < len && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;

    if end < len && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut j = frac_start;
        while j < len && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if digits > 0 || j > frac_start {
            digits += j - frac_start;
            end = j;
        }
    }
    if digits == 0 {
        return None;
    }

    if end < len && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut j = end + 1;
        if j < len && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        let exp_start = j;
        while j < len && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_start {
            end = j;
        }
    }

    s[..end].parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a ledger date.
///
/// Three `-`/`/` separated parts are read as `YYYY-MM-DD` when the first
/// part has four characters and as `DD-MM-YYYY` otherwise. Anything else
/// goes through [`parse_date_generic`]. Two-digit years land in the 1900s.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let parts: Vec<&str> = s.split(['-', '/']).collect();
    if parts.len() == 3 {
        let (y, m, d) = if parts[0].len() == 4 {
            (parts[0], parts[1], parts[2])
        } else {
            (parts[2], parts[1], parts[0])
        };
        if let Some(date) = date_from_parts(y, m, d) {
            return Some(date);
        }
    }
    parse_date_generic(s)
}

fn date_from_parts(y: &str, m: &str, d: &str) -> Option<NaiveDate> {
    let mut year: i32 = y.trim().parse().ok()?;
    let month: u32 = m.trim().parse().ok()?;
    let day: u32 = d.trim().parse().ok()?;
    if (0..100).contains(&year) {
        year += 1900;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

const GENERIC_FORMATS: &[&str] = &[
    "%Y.%m.%d",
    "%d.%m.%Y",
    "%Y%m%d",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
];

/// Fallback for dates that are not plain three-part dates: the gviz
/// `Date(y,m,d)` literal (zero-based month), RFC 3339 timestamps, a
/// `YYYY-MM-DD HH:MM:SS` timestamp and a few dotted/long-month forms.
pub fn parse_date_generic(s: &str) -> Option<NaiveDate> {
    if let Some(inner) = s.strip_prefix("Date(").and_then(|r| r.strip_suffix(')')) {
        let mut it = inner.split(',').map(|p| p.trim().parse::<i32>().ok());
        let (year, month0, day) = (it.next()??, it.next()??, it.next()??);
        let month = u32::try_from(month0 + 1).ok()?;
        return NaiveDate::from_ymd_opt(year, month, u32::try_from(day).ok()?);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.date());
    }
    GENERIC_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// Round halves toward positive infinity, i.e. `Math.round` semantics
/// (`2.5` -> `3`, `-2.5` -> `-2`). Non-finite input rounds to 0.
pub fn round_half_up(v: f64) -> i64 {
    if !v.is_finite() {
        return 0;
    }
    (v + 0.5).floor() as i64
}

/// `part / whole * 100`, or 0 when `whole` is not positive.
pub fn percent_of(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part / whole * 100.0
    } else {
        0.0
    }
}

pub fn average(v: &[f64]) -> f64 {
    if v.is_empty() {
        return 0.0;
    }
    v.iter().sum::<f64>() / v.len() as f64
}

/// Fixed decimals with `,` thousands separators (`1,234,567.89`).
pub fn format_number(n: f64, decimals: usize) -> String {
    let s = format!("{:.*}", decimals, n.abs());
    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (s.as_str(), None),
    };
    let int_val: i64 = int_part.parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::en);
    if let Some(frac) = frac_part {
        res.push('.');
        res.push_str(frac);
    }
    if n < 0.0 && res.chars().any(|c| c.is_ascii_digit() && c != '0') {
        format!("-{}", res)
    } else {
        res
    }
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    n.to_formatted_string(&Locale::en)
}

/// Sum in so'm. The short form is meant for axis labels: `1.2M`, `35K`.
pub fn format_currency(value: f64, short: bool) -> String {
    if short {
        if value >= 1_000_000.0 {
            return format!("{:.1}M", value / 1_000_000.0);
        } else if value >= 1_000.0 {
            return format!("{:.0}K", value / 1_000.0);
        }
    }
    format!("{} UZS", format_number(value, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_number_reads_numeric_prefix() {
        assert_eq!(parse_number("42"), Some(42.0));
        assert_eq!(parse_number("  -3.5"), Some(-3.5));
        assert_eq!(parse_number("12.5 kg"), Some(12.5));
        assert_eq!(parse_number("1,234"), Some(1.0));
        assert_eq!(parse_number(".5"), Some(0.5));
        assert_eq!(parse_number("2e3"), Some(2000.0));
        assert_eq!(parse_number("7e"), Some(7.0));
    }

    #[test]
    fn parse_number_rejects_non_numeric() {
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number("-"), None);
        assert_eq!(parse_number("."), None);
        assert_eq!(parse_number("Infinity"), None);
        assert_eq!(parse_number("1e400"), None);
    }

    #[test]
    fn parse_date_year_first() {
        assert_eq!(parse_date("2024-03-05"), NaiveDate::from_ymd_opt(2024, 3, 5));
        assert_eq!(parse_date("2024/12/31"), NaiveDate::from_ymd_opt(2024, 12, 31));
    }

    #[test]
    fn parse_date_day_first() {
        assert_eq!(parse_date("05-03-2024"), NaiveDate::from_ymd_opt(2024, 3, 5));
        assert_eq!(parse_date("5/3/2024"), NaiveDate::from_ymd_opt(2024, 3, 5));
        assert_eq!(parse_date("05-03-24"), NaiveDate::from_ymd_opt(1924, 3, 5));
    }

    #[test]
    fn parse_date_generic_forms() {
        assert_eq!(parse_date("Date(2024,2,5)"), NaiveDate::from_ymd_opt(2024, 3, 5));
        assert_eq!(parse_date("05.03.2024"), NaiveDate::from_ymd_opt(2024, 3, 5));
        assert_eq!(
            parse_date("2024-03-05T10:15:00Z"),
            NaiveDate::from_ymd_opt(2024, 3, 5)
        );
        assert_eq!(parse_date("March 5, 2024"), NaiveDate::from_ymd_opt(2024, 3, 5));
    }

    #[test]
    fn parse_date_invalid_is_none() {
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("   "), None);
        assert_eq!(parse_date("not a date"), None);
        assert_eq!(parse_date("2024-02-30"), None);
        assert_eq!(parse_date("2024-03"), None);
    }

    #[test]
    fn rounding_matches_math_round() {
        assert_eq!(round_half_up(2.5), 3);
        assert_eq!(round_half_up(2.49), 2);
        assert_eq!(round_half_up(-2.5), -2);
        assert_eq!(round_half_up(-2.51), -3);
        assert_eq!(round_half_up(f64::NAN), 0);
    }

    #[test]
    fn percent_guards_zero() {
        assert_eq!(percent_of(50.0, 0.0), 0.0);
        assert_eq!(percent_of(50.0, 200.0), 25.0);
    }

    #[test]
    fn formats_numbers_and_currency() {
        assert_eq!(format_number(1234567.891, 2), "1,234,567.89");
        assert_eq!(format_number(-1500.0, 0), "-1,500");
        assert_eq!(format_number(-0.001, 0), "0");
        assert_eq!(format_int(9855), "9,855");
        assert_eq!(format_currency(1_240_000.0, true), "1.2M");
        assert_eq!(format_currency(35_400.0, true), "35K");
        assert_eq!(format_currency(950.0, true), "950 UZS");
        assert_eq!(format_currency(1_250_000.0, false), "1,250,000 UZS");
    }
}

// Utility helpers for parsing and basic statistics.
//
// This module centralizes all the "dirty" cell/number handling so the rest
// of the code can assume clean, typed values.
use num_format::{Locale, ToFormattedString};

/// Placeholder rendered wherever a value is absent.
pub const MISSING: &str = "N/A";

/// Parse a cell into `f64` while being forgiving about formatting issues
/// common in spreadsheet exports.
///
/// - Trims whitespace, including non-breaking spaces used as group separators.
/// - Rejects values that contain alphabetic characters.
/// - When both `,` and `.` appear, the last one is the decimal separator and
///   the other must group digits in threes (`1.234,50` and `1,234.50`).
/// - A lone `,` is a decimal comma, except before exactly three digits
///   (`1,234`), which could be either convention and is rejected.
/// - Returns `None` for anything that cannot be safely parsed.
pub fn parse_f64_safe(s: Option<&str>) -> Option<f64> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    if s.chars().any(|c| c.is_alphabetic()) {
        return None;
    }
    let s: String = s
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}')
        .collect();
    let s = normalize_separators(&s)?;
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Rewrite a number to use `.` as the only decimal separator and no grouping.
fn normalize_separators(s: &str) -> Option<String> {
    match (s.rfind(','), s.rfind('.')) {
        (Some(comma), Some(dot)) => {
            let (decimal, group) = if comma > dot { (',', '.') } else { ('.', ',') };
            let (int_part, frac) = s.rsplit_once(decimal)?;
            if !is_grouped(int_part, group) {
                return None;
            }
            Some(format!("{}.{frac}", int_part.replace(group, "")))
        }
        (Some(_), None) if s.matches(',').count() > 1 => {
            is_grouped(s, ',').then(|| s.replace(',', ""))
        }
        (Some(_), None) => {
            let (int_part, frac) = s.split_once(',')?;
            let digits = int_part.trim_start_matches(['-', '+']);
            if frac.len() == 3 && !digits.is_empty() && digits != "0" {
                return None;
            }
            Some(format!("{int_part}.{frac}"))
        }
        (None, Some(_)) if s.matches('.').count() > 1 => {
            is_grouped(s, '.').then(|| s.replace('.', ""))
        }
        _ => Some(s.to_string()),
    }
}

/// `12`, `1,234` and `12,345,678` are grouped; `12,34` and `,123` are not.
fn is_grouped(s: &str, sep: char) -> bool {
    let mut groups = s.trim_start_matches(['-', '+']).split(sep);
    let lead = groups.next().unwrap_or_default();
    (1..=3).contains(&lead.len()) && groups.all(|g| g.len() == 3)
}

/// Integers arrive as `"12"` from csv and as `"12"` or `"12.0"` from
/// workbook float cells; both are accepted, fractional values are not.
pub fn parse_i64_safe(s: Option<&str>) -> Option<i64> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(v) = s.parse::<i64>() {
        return Some(v);
    }
    let f = parse_f64_safe(Some(s))?;
    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

/// Split a `"<total><sep><delivered>"` cell into its two numeric halves.
///
/// Each half is parsed on its own; anything malformed becomes `None`.
pub fn split_pair(s: Option<&str>, sep: char) -> (Option<i64>, Option<i64>) {
    let Some(s) = s else { return (None, None) };
    let mut parts = s.splitn(2, sep);
    let total = parse_i64_safe(parts.next());
    let delivered = parse_i64_safe(parts.next());
    (total, delivered)
}

/// `part / whole * 100`, or `None` when either side is missing or `whole` is 0.
pub fn percent(part: Option<i64>, whole: Option<i64>) -> Option<f64> {
    match (part, whole) {
        (Some(p), Some(w)) if w != 0 => Some(p as f64 / w as f64 * 100.0),
        _ => None,
    }
}

pub fn average(v: &[f64]) -> Option<f64> {
    // Arithmetic mean; an empty slice has no mean.
    if v.is_empty() {
        return None;
    }
    let sum: f64 = v.iter().copied().sum();
    Some(sum / v.len() as f64)
}

pub fn format_number(n: f64, decimals: usize) -> String {
    // Format a floating-point value with:
    // - a fixed number of decimal places, and
    // - locale-aware thousands separators (e.g., `1,234,567.89`).
    let s = format!("{:.*}", decimals, n.abs());
    // `-0.00` reads as noise in a report.
    let neg = n.is_sign_negative() && s.chars().any(|c| c.is_ascii_digit() && c != '0');
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    let int_val: i64 = int_part.parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::en);
    if let Some(frac) = frac_part {
        if decimals > 0 {
            res.push('.');
            res.push_str(frac);
        }
    } else if decimals > 0 {
        res.push('.');
        res.push_str(&"0".repeat(decimals));
    }
    if neg {
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

pub fn format_opt_number(n: Option<f64>) -> String {
    n.map(|v| format_number(v, 2)).unwrap_or_else(|| MISSING.to_string())
}

pub fn format_opt_int(n: Option<i64>) -> String {
    n.map(format_int).unwrap_or_else(|| MISSING.to_string())
}

/// First `n` characters of `s` (not bytes: route codes may be Cyrillic).
pub fn char_prefix(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

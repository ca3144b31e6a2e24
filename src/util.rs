// Utility helpers for parsing and basic statistics.
//
// This module centralizes the "dirty" cell handling (numbers written the
// French way, accented headers, placeholder tokens) so the rest of the code
// can assume clean, typed values.
use num_format::{Locale, ToFormattedString};
use once_cell::sync::Lazy;
use std::collections::HashSet;

/// Sentinel stored in every categorical field that had no usable value.
pub const NOT_PROVIDED: &str = "Non renseigné";

// Compared after trimming and lowercasing.
static PLACEHOLDER_TOKENS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "nan", "n/a", "na", "n.a.", "nd", "n.d.", "null", "none", "-", "--", "?",
        "non renseigné", "non renseigne",
    ]
    .into_iter()
    .collect()
});

/// Outcome of coercing one numeric cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Coerced {
    Value(f64),
    /// Missing or blank cell.
    Blank,
    /// Text that could not be read as a number.
    Unparseable,
    /// Parsed, but negative or not finite.
    OutOfRange,
}

impl Coerced {
    /// The stored value: anything other than a clean parse becomes 0.
    pub fn value_or_zero(self) -> f64 {
        match self {
            Coerced::Value(v) => v,
            _ => 0.0,
        }
    }
}

/// Parse a number the way French open-data exports write them.
///
/// - Strips every kind of whitespace, including non-breaking and narrow
///   non-breaking spaces used as thousands separators (`"1 234"`).
/// - A single comma is a decimal comma (`"1234,5"`); several commas are
///   thousands separators (`"1,234,567"`).
/// - Placeholder tokens (`"N/A"`, `"nd"`...) and blanks are reported as such.
pub fn coerce_number(s: Option<&str>) -> Coerced {
    let Some(raw) = s else {
        return Coerced::Blank;
    };
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Coerced::Blank;
    }
    if PLACEHOLDER_TOKENS.contains(compact.to_lowercase().as_str()) {
        return Coerced::Unparseable;
    }
    let normalized = if compact.matches(',').count() > 1 {
        compact.replace(',', "")
    } else {
        compact.replace(',', ".")
    };
    match normalized.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Coerced::Value(v),
        Ok(_) => Coerced::OutOfRange,
        Err(_) => Coerced::Unparseable,
    }
}

/// Shorthand for callers that only want the stored value.
pub fn number_or_zero(s: Option<&str>) -> f64 {
    coerce_number(s).value_or_zero()
}

/// Clean a categorical cell: blanks and placeholder tokens become `None`.
pub fn clean_label(s: Option<&str>) -> Option<String> {
    let s = s?.trim_matches(|c: char| c.is_whitespace());
    if s.is_empty() || PLACEHOLDER_TOKENS.contains(s.to_lowercase().as_str()) {
        return None;
    }
    Some(s.to_string())
}

/// Fold a header or label for loose comparison: trim, lowercase, and map
/// accented Latin letters to their base letter.
pub fn fold(s: &str) -> String {
    s.trim()
        .chars()
        .flat_map(|c| c.to_lowercase())
        .map(|c| match c {
            'à' | 'â' | 'ä' | 'á' | 'ã' | 'å' => 'a',
            'ç' => 'c',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'î' | 'ï' | 'í' | 'ì' => 'i',
            'ô' | 'ö' | 'ó' | 'ò' | 'õ' => 'o',
            'ù' | 'û' | 'ü' | 'ú' => 'u',
            'ÿ' | 'ý' => 'y',
            'ñ' => 'n',
            '\u{a0}' | '\u{202f}' => ' ',
            '’' => '\'',
            other => other,
        })
        .collect()
}

pub fn average(v: &[f64]) -> f64 {
    // Standard arithmetic mean; returns 0 for an empty slice to avoid NaNs.
    if v.is_empty() {
        return 0.0;
    }
    let sum: f64 = v.iter().copied().sum();
    sum / v.len() as f64
}

pub fn median(mut v: Vec<f64>) -> f64 {
    if v.is_empty() {
        return 0.0;
    }
    v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = v.len() / 2;
    if v.len() % 2 == 1 {
        v[mid]
    } else {
        (v[mid - 1] + v[mid]) / 2.0
    }
}

/// Format with fixed decimals and a space as thousands separator
/// (`1 234 567.89`), the way the dashboard displays figures.
pub fn format_number(n: f64, decimals: usize) -> String {
    let neg = n.is_sign_negative() && n != 0.0;
    let s = format!("{:.*}", decimals, n.abs());
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let int_val: i64 = int_part.parse().unwrap_or(0);
    let mut res = group_thousands(&int_val.to_formatted_string(&Locale::en));
    if let Some(frac) = parts.next() {
        res.push('.');
        res.push_str(frac);
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
    group_thousands(&n.to_formatted_string(&Locale::en))
}

pub fn format_percent(n: f64) -> String {
    format!("{:.1}%", n)
}

fn group_thousands(en: &str) -> String {
    en.replace(',', " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerces_french_numbers() {
        assert_eq!(number_or_zero(Some("1 234")), 1234.0);
        assert_eq!(number_or_zero(Some("1234,5")), 1234.5);
        assert_eq!(number_or_zero(Some("")), 0.0);
        assert_eq!(number_or_zero(None), 0.0);
        assert_eq!(number_or_zero(Some("N/A")), 0.0);
        assert_eq!(number_or_zero(Some("12\u{a0}345")), 12345.0);
        assert_eq!(number_or_zero(Some("1\u{202f}000,25")), 1000.25);
        assert_eq!(number_or_zero(Some("1,234,567")), 1_234_567.0);
    }

    #[test]
    fn coercion_reports_why_it_defaulted() {
        assert_eq!(coerce_number(Some("   ")), Coerced::Blank);
        assert_eq!(coerce_number(Some("abc")), Coerced::Unparseable);
        assert_eq!(coerce_number(Some("-4")), Coerced::OutOfRange);
        assert_eq!(coerce_number(Some("inf")), Coerced::OutOfRange);
        assert_eq!(coerce_number(Some("42")), Coerced::Value(42.0));
    }

    #[test]
    fn clean_label_maps_placeholders_to_none() {
        assert_eq!(clean_label(Some("  Bretagne ")), Some("Bretagne".to_string()));
        assert_eq!(clean_label(Some("   ")), None);
        assert_eq!(clean_label(Some("NaN")), None);
        assert_eq!(clean_label(Some("n/a")), None);
        assert_eq!(clean_label(None), None);
    }

    #[test]
    fn fold_strips_accents_and_case() {
        assert_eq!(fold("Région"), "region");
        assert_eq!(fold("REGION "), "region");
        assert_eq!(fold("Opérations diverses"), "operations diverses");
        assert_eq!(fold("Feux d’habitations"), "feux d'habitations");
    }

    #[test]
    fn stats_handle_empty_input() {
        assert_eq!(average(&[]), 0.0);
        assert_eq!(median(vec![]), 0.0);
        assert_eq!(median(vec![3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(vec![4.0, 1.0, 2.0, 3.0]), 2.5);
    }

    #[test]
    fn formats_with_space_separators() {
        assert_eq!(format_number(1234567.891, 2), "1 234 567.89");
        assert_eq!(format_number(-1500.0, 0), "-1 500");
        assert_eq!(format_int(4_500_000u64), "4 500 000");
        assert_eq!(format_percent(12.345), "12.3%");
    }
}

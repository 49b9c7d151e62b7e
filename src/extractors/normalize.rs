// src/extractors/normalize.rs
//! Date and currency normalizers. Both take the matched text and return the
//! canonical value, or a `NormalizationError` the caller turns into a
//! review flag.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::utils::error::NormalizationError;

const LAKH: u128 = 100_000;
const CRORE: u128 = 10_000_000;
/// Fractional digits beyond this are dropped before scaling.
const MAX_FRACTION_DIGITS: usize = 9;

static NUMERIC_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,2})[/-](\d{1,2})[/-](\d{4})$").expect("Failed to compile NUMERIC_DATE_RE")
});

// "5th June, 2020", "05 JUNE 2020", "5th day of June, 2020"
static WORD_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(\d{1,2})(?:st|nd|rd|th)?(?:\s+day\s+of)?\s+([a-z]+)\.?,?\s+(\d{4})$")
        .expect("Failed to compile WORD_DATE_RE")
});

static CURRENCY_PREFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:rs\.?|inr|₹|rupees)\s*").expect("Failed to compile CURRENCY_PREFIX_RE")
});

static CURRENCY_SUFFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s*(?:/-|only|rupees|\.)$").expect("Failed to compile CURRENCY_SUFFIX_RE")
});

static UNIT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s*(lakhs?|lacs?|crores?)$").expect("Failed to compile UNIT_RE")
});

static DECIMAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+)(?:\.(\d+))?$").expect("Failed to compile DECIMAL_RE")
});

const SPELLED_NUMERALS: &[(&str, u128)] = &[
    ("one", 1),
    ("two", 2),
    ("three", 3),
    ("four", 4),
    ("five", 5),
    ("six", 6),
    ("seven", 7),
    ("eight", 8),
    ("nine", 9),
    ("ten", 10),
];

/// Normalizes `DD/MM/YYYY`, `DD-MM-YYYY` or `DD Month(,) YYYY` to ISO-8601.
/// Dates after `today` are rejected with `FutureDate`.
pub fn normalize_date(text: &str, today: NaiveDate) -> Result<String, NormalizationError> {
    let trimmed = text.trim();
    let invalid = || NormalizationError::InvalidDate(trimmed.to_string());

    let (day, month, year) = if let Some(caps) = NUMERIC_DATE_RE.captures(trimmed) {
        (caps[1].to_string(), caps[2].parse::<u32>().ok(), caps[3].to_string())
    } else if let Some(caps) = WORD_DATE_RE.captures(trimmed) {
        (caps[1].to_string(), month_number(&caps[2]), caps[3].to_string())
    } else {
        return Err(invalid());
    };

    let day: u32 = day.parse().map_err(|_| invalid())?;
    let month = month.ok_or_else(invalid)?;
    let year: i32 = year.parse().map_err(|_| invalid())?;

    let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)?;
    let iso = date.format("%Y-%m-%d").to_string();
    if date > today {
        return Err(NormalizationError::FutureDate { raw: trimmed.to_string(), iso });
    }
    Ok(iso)
}

fn month_number(name: &str) -> Option<u32> {
    let name = name.to_lowercase();
    const MONTHS: [&str; 12] = [
        "january", "february", "march", "april", "may", "june",
        "july", "august", "september", "october", "november", "december",
    ];
    MONTHS
        .iter()
        .position(|m| *m == name || (name.len() >= 3 && m.starts_with(name.as_str())))
        .map(|idx| idx as u32 + 1)
}

/// Parses an INR amount such as `Rs. 5,00,000`, `two lakhs` or `1.5 crore`
/// into whole rupees.
pub fn normalize_currency(text: &str) -> Result<u64, NormalizationError> {
    let invalid = || NormalizationError::InvalidAmount(text.trim().to_string());

    let mut s = text.trim().to_lowercase();
    s = CURRENCY_PREFIX_RE.replace(&s, "").trim().to_string();
    // "/-" and "only" can stack: "Rs. 5,00,000/- only"
    while CURRENCY_SUFFIX_RE.is_match(&s) {
        s = CURRENCY_SUFFIX_RE.replace(&s, "").trim().to_string();
    }

    let (number_part, multiplier) = match UNIT_RE.captures(&s) {
        Some(caps) => {
            let unit = &caps[1];
            let multiplier = if unit.starts_with("crore") { CRORE } else { LAKH };
            let start = caps.get(0).map(|m| m.start()).unwrap_or(s.len());
            (s[..start].trim().to_string(), multiplier)
        }
        None => (s.clone(), 1),
    };

    let amount = if multiplier > 1 {
        match SPELLED_NUMERALS.iter().find(|(word, _)| *word == number_part) {
            Some((_, n)) => n * multiplier,
            None => parse_decimal(&number_part, multiplier).ok_or_else(invalid)?,
        }
    } else {
        parse_decimal(&number_part, multiplier).ok_or_else(invalid)?
    };

    u64::try_from(amount).map_err(|_| invalid())
}

/// Scales a plain decimal by `multiplier` using integer arithmetic.
/// Paise left over after scaling are truncated.
fn parse_decimal(number: &str, multiplier: u128) -> Option<u128> {
    let compact: String = number.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();
    let caps = DECIMAL_RE.captures(&compact)?;

    let whole: u128 = caps[1].parse().ok()?;
    let mut amount = whole.checked_mul(multiplier)?;

    if let Some(frac) = caps.get(2) {
        let digits: String = frac.as_str().chars().take(MAX_FRACTION_DIGITS).collect();
        let frac_value: u128 = digits.parse().ok()?;
        let scale = 10u128.pow(digits.len() as u32);
        amount = amount.checked_add(frac_value * multiplier / scale)?;
    }

    Some(amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    #[test]
    fn date_forms_normalize_to_iso() {
        for input in ["05/06/2020", "05-06-2020", "5/6/2020", "5th June, 2020", "5 june 2020", "5th day of June, 2020", "05 Jun 2020"] {
            assert_eq!(normalize_date(input, today()).unwrap(), "2020-06-05", "input: {input}");
        }
    }

    #[test]
    fn ordinal_suffixes() {
        assert_eq!(normalize_date("1st January, 2019", today()).unwrap(), "2019-01-01");
        assert_eq!(normalize_date("22nd March 2019", today()).unwrap(), "2019-03-22");
        assert_eq!(normalize_date("23rd April 2019", today()).unwrap(), "2019-04-23");
    }

    #[test]
    fn impossible_dates_rejected() {
        assert!(matches!(normalize_date("31/02/2020", today()), Err(NormalizationError::InvalidDate(_))));
        assert!(matches!(normalize_date("5th Smarch 2020", today()), Err(NormalizationError::InvalidDate(_))));
        assert!(matches!(normalize_date("sometime in 2020", today()), Err(NormalizationError::InvalidDate(_))));
    }

    #[test]
    fn future_date_rejected_with_iso() {
        match normalize_date("01/01/2030", today()) {
            Err(NormalizationError::FutureDate { iso, .. }) => assert_eq!(iso, "2030-01-01"),
            other => panic!("expected FutureDate, got {:?}", other),
        }
        // The processing date itself is not in the future.
        assert_eq!(normalize_date("01/01/2024", today()).unwrap(), "2024-01-01");
    }

    #[test]
    fn currency_examples() {
        assert_eq!(normalize_currency("Rs. 5,00,000").unwrap(), 500_000);
        assert_eq!(normalize_currency("two lakhs").unwrap(), 200_000);
        assert_eq!(normalize_currency("1.5 crore").unwrap(), 15_000_000);
    }

    #[test]
    fn currency_variants() {
        assert_eq!(normalize_currency("Rs. 10,00,000/-").unwrap(), 1_000_000);
        assert_eq!(normalize_currency("INR 15 lakhs only").unwrap(), 1_500_000);
        assert_eq!(normalize_currency("₹ 5 crores").unwrap(), 50_000_000);
        assert_eq!(normalize_currency("Ten Crore").unwrap(), 100_000_000);
        assert_eq!(normalize_currency("1,00,000.75").unwrap(), 100_000);
    }

    #[test]
    fn currency_rejects_non_numeric() {
        assert!(matches!(normalize_currency("many rupees"), Err(NormalizationError::InvalidAmount(_))));
        assert!(matches!(normalize_currency("eleven lakhs"), Err(NormalizationError::InvalidAmount(_))));
        assert!(matches!(normalize_currency(""), Err(NormalizationError::InvalidAmount(_))));
    }
}

// src/dossier/phone.rs
use once_cell::sync::Lazy;
use regex::Regex;

/// Characters people put between digit groups. `/` is left out: it separates
/// two numbers in one cell.
static SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s\-\.\(\)]").unwrap());

/// Digits in a local mobile number without its trunk prefix (`50 123 4567`).
const LOCAL_MOBILE_LEN: usize = 9;
/// Subscriber digits after a trunk or country prefix: landlines have 8, mobiles 9.
const SUBSCRIBER_LEN: std::ops::RangeInclusive<usize> = 8..=LOCAL_MOBILE_LEN;
/// Longest international number, without the `+`.
const MAX_INTERNATIONAL_LEN: usize = 15;

/// Rewrite a phone number into `+<country><subscriber>`.
///
/// `0501234567`, `00971501234567`, `971501234567` and `501234567` all become
/// `+971501234567` for country code `971`. Numbers already in `+` form only
/// lose their separators; anything unrecognised comes back trimmed.
pub fn normalize(raw: &str, country_code: &str) -> String {
    let trimmed = raw.trim();
    let compact = SEPARATORS.replace_all(trimmed, "");

    if let Some(rest) = compact.strip_prefix('+') {
        if !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()) {
            return compact.into_owned();
        }
        return trimmed.to_string();
    }
    if compact.is_empty() || !compact.chars().all(|c| c.is_ascii_digit()) {
        return trimmed.to_string();
    }

    if let Some(rest) = compact.strip_prefix("00") {
        let min = country_code.len() + SUBSCRIBER_LEN.start();
        if (min..=MAX_INTERNATIONAL_LEN).contains(&rest.len()) {
            return format!("+{}", rest);
        }
        return trimmed.to_string();
    }
    if !country_code.is_empty() {
        if let Some(rest) = compact.strip_prefix(country_code) {
            if SUBSCRIBER_LEN.contains(&rest.len()) {
                return format!("+{}", compact);
            }
        }
    }
    if let Some(rest) = compact.strip_prefix('0') {
        if SUBSCRIBER_LEN.contains(&rest.len()) {
            return format!("+{}{}", country_code, rest);
        }
        return trimmed.to_string();
    }
    if compact.len() == LOCAL_MOBILE_LEN && compact.starts_with('5') {
        return format!("+{}{}", country_code, compact);
    }
    trimmed.to_string()
}

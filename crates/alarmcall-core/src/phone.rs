//! Phone number normalization to E.164.

use crate::errors::ConfigError;
use std::fmt;
use std::str::FromStr;

/// Length of a national significant number for the markets we dial.
pub const NATIONAL_DIGITS: usize = 10;
/// E.164 caps the full number (country code included) at 15 digits.
pub const E164_MAX_DIGITS: usize = 15;

/// Default country calling code, digits only (no `+`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountryCode(String);

impl CountryCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CountryCode {
    fn default() -> Self {
        Self("52".to_string())
    }
}

impl FromStr for CountryCode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().trim_start_matches('+');
        if digits.is_empty() || digits.len() > 3 || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConfigError(format!(
                "invalid country code {s:?}: expected 1-3 digits"
            )));
        }
        Ok(Self(digits.to_string()))
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalizes a raw phone string to `+<digits>`.
///
/// Returns `None` when the input cannot be turned into a dialable number;
/// callers treat that record as uncallable rather than failing.
pub fn normalize(raw: &str, country: &CountryCode) -> Option<String> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return None;
    }

    // Already international: keep the digits as given.
    if let Some(rest) = compact.strip_prefix('+') {
        let digits: String = rest.chars().filter(char::is_ascii_digit).collect();
        return (!digits.is_empty()).then(|| format!("+{digits}"));
    }

    let all: String = compact.chars().filter(char::is_ascii_digit).collect();
    let digits = all.trim_start_matches('0');
    let had_zero_prefix = digits.len() < all.len();
    if digits.is_empty() {
        return None;
    }

    let cc = country.as_str();
    if digits.len() == NATIONAL_DIGITS {
        return Some(format!("+{cc}{digits}"));
    }
    if digits.starts_with(cc) && digits.len() == cc.len() + NATIONAL_DIGITS {
        return Some(format!("+{digits}"));
    }
    // Trunk or international prefix stripped from a number longer than a
    // national one: dial it under the default code.
    if had_zero_prefix
        && digits.len() > NATIONAL_DIGITS
        && cc.len() + digits.len() <= E164_MAX_DIGITS
    {
        return Some(format!("+{cc}{digits}"));
    }
    None
}

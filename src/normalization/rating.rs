use std::sync::LazyLock;

use regex::Regex;

/// Star value such as `4.6`: digits with at most one decimal place.
static RATING_VALUE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]+(?:\.[0-9])?").unwrap());

/// Review count such as `1,234 reviews`.
static RATING_COUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)([0-9,]+)\s+reviews").unwrap());

/// Both values carried by a free-text rating field like `"4.6 stars, 200 reviews"`.
///
/// The two halves are extracted independently, so either may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RatingSummary {
    pub value: Option<f64>,
    pub count: Option<i32>,
}

impl RatingSummary {
    pub fn parse(raw: Option<&str>) -> Self {
        Self {
            value: parse_rating_value(raw),
            count: parse_rating_count(raw),
        }
    }
}

/// First numeric token of the field, read as a star value.
pub fn parse_rating_value(raw: Option<&str>) -> Option<f64> {
    let token = RATING_VALUE_RE.find(raw.unwrap_or_default().trim())?;
    token.as_str().parse::<f64>().ok()
}

/// Number immediately preceding the word "reviews" (any case), commas removed.
///
/// A captured run of bare commas, or a count too large for the `INTEGER`
/// column, is reported as absent.
pub fn parse_rating_count(raw: Option<&str>) -> Option<i32> {
    let caps = RATING_COUNT_RE.captures(raw.unwrap_or_default().trim())?;
    let digits = caps.get(1)?.as_str().replace(',', "");
    digits.parse::<i32>().ok()
}

use std::str::FromStr;
use std::sync::LazyLock;

use bigdecimal::BigDecimal;
use regex::Regex;

/// First integer or decimal token with at most two fractional digits.
static PRICE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]+(?:\.[0-9]{1,2})?").unwrap());

/// Parse a loosely formatted price such as `"$ 1,299.99"` into a decimal.
///
/// Thousands separators are removed before matching, and only the first
/// numeric token counts. Sign and range are not checked. Returns `None`
/// when nothing numeric is present.
pub fn parse_price(raw: Option<&str>) -> Option<BigDecimal> {
    let cleaned = raw.unwrap_or_default().replace(',', "");
    let token = PRICE_RE.find(cleaned.trim())?;
    BigDecimal::from_str(token.as_str()).ok()
}

/// The `0.00` stored when a row's price cannot be parsed.
pub fn zero_price() -> BigDecimal {
    BigDecimal::new(0.into(), 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn extracts_first_numeral() {
        assert_eq!(parse_price(Some("$ 12.50")), Some(dec("12.50")));
        assert_eq!(parse_price(Some("  $7 ")), Some(dec("7")));
        assert_eq!(parse_price(Some("2 for $5.00")), Some(dec("2")));
    }

    #[test]
    fn strips_thousands_separators() {
        assert_eq!(parse_price(Some("$1,299.99")), Some(dec("1299.99")));
    }

    #[test]
    fn keeps_at_most_two_fraction_digits() {
        assert_eq!(parse_price(Some("12.505")), Some(dec("12.50")));
        assert_eq!(parse_price(Some("3.9")), Some(dec("3.9")));
        // a bare trailing dot is not part of the token
        assert_eq!(parse_price(Some("4.")), Some(dec("4")));
    }

    #[test]
    fn absent_without_numeral() {
        assert_eq!(parse_price(Some("")), None);
        assert_eq!(parse_price(Some("free")), None);
        assert_eq!(parse_price(Some("   ")), None);
        assert_eq!(parse_price(None), None);
    }

    #[test]
    fn zero_price_has_two_decimal_places() {
        let zero = zero_price();
        assert_eq!(zero, dec("0.00"));
        let (digits, scale) = zero.as_bigint_and_exponent();
        assert_eq!(digits.to_string(), "0");
        assert_eq!(scale, 2);
    }
}

//! Fixed-point monetary amounts.
//!
//! Amounts cross the ledger wire as unsigned integers scaled by 10^6.
//! Conversion to and from display-scale decimal strings happens here and
//! nowhere else; all arithmetic elsewhere stays in the raw scale.

use crate::error::{Error, Result};

/// Decimal places carried by wire amounts.
pub const AMOUNT_DECIMALS: u32 = 6;

/// Scale factor between wire and display amounts.
pub const AMOUNT_SCALE: u64 = 1_000_000;

/// Format a wire amount as a display-scale decimal string.
///
/// Trailing fractional zeros are dropped: `1_500_000` renders as `"1.5"`,
/// `2_000_000` as `"2"`.
pub fn format_amount(raw: u64) -> String {
    let whole = raw / AMOUNT_SCALE;
    let frac = raw % AMOUNT_SCALE;
    if frac == 0 {
        return whole.to_string();
    }
    let s = format!("{whole}.{frac:06}");
    s.trim_end_matches('0').to_string()
}

/// Parse a display-scale decimal string into a wire amount.
///
/// Accepts at most [`AMOUNT_DECIMALS`] fractional digits.
pub fn parse_amount(s: &str) -> Result<u64> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::InvalidAmount("empty amount".into()));
    }
    let (whole_str, frac_str) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if frac_str.len() > AMOUNT_DECIMALS as usize {
        return Err(Error::InvalidAmount(format!(
            "more than {AMOUNT_DECIMALS} decimal places: {s}"
        )));
    }
    let whole: u64 = if whole_str.is_empty() {
        0
    } else {
        whole_str
            .parse()
            .map_err(|_| Error::InvalidAmount(format!("not a decimal number: {s}")))?
    };
    let frac: u64 = if frac_str.is_empty() {
        0
    } else {
        let padded = format!("{frac_str:0<6}");
        padded
            .parse()
            .map_err(|_| Error::InvalidAmount(format!("not a decimal number: {s}")))?
    };
    whole
        .checked_mul(AMOUNT_SCALE)
        .and_then(|w| w.checked_add(frac))
        .ok_or_else(|| Error::InvalidAmount(format!("amount out of range: {s}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_drops_trailing_zeros() {
        assert_eq!(format_amount(2_000_000), "2");
        assert_eq!(format_amount(1_500_000), "1.5");
        assert_eq!(format_amount(1_000_001), "1.000001");
        assert_eq!(format_amount(0), "0");
    }

    #[test]
    fn parse_round_trips_format() {
        for raw in [0u64, 1, 999_999, 1_000_000, 1_500_000, 123_456_789] {
            assert_eq!(parse_amount(&format_amount(raw)).unwrap(), raw);
        }
    }

    #[test]
    fn parse_accepts_fraction_only() {
        assert_eq!(parse_amount(".5").unwrap(), 500_000);
        assert_eq!(parse_amount("0.000001").unwrap(), 1);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_amount("").is_err());
        assert!(parse_amount("abc").is_err());
        assert!(parse_amount("1.2345678").is_err());
        assert!(parse_amount("-1").is_err());
    }

    #[test]
    fn parse_rejects_overflow() {
        assert!(parse_amount("99999999999999999999").is_err());
    }
}

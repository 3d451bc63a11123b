//! Fixed-point money.
//!
//! Ledger arithmetic never touches floating point or display strings: amounts
//! typed by users ("1.500,75", "R$ 150,00", "500.25") are normalised into an
//! [`Amount`] at the boundary and everything downstream works on `Decimal`.

use core::iter::Sum;
use core::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use core::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// Number of decimal places every amount is normalised to (centavos).
pub const SCALE: u32 = 2;

/// Monetary amount with exactly two decimal places.
///
/// Construction always rounds to [`SCALE`] places, midpoint away from zero, so
/// two amounts that print the same compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub const ZERO: Amount = Amount(Decimal::ZERO);

    pub fn new(value: Decimal) -> Self {
        Self(value.round_dp_with_strategy(SCALE, RoundingStrategy::MidpointAwayFromZero))
    }

    /// Build an amount from an integer number of cents.
    pub fn from_cents(cents: i64) -> Self {
        Self(Decimal::new(cents, SCALE))
    }

    pub fn value(self) -> Decimal {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn is_negative(self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// Returns `self` if positive, zero otherwise.
    pub fn clamp_non_negative(self) -> Self {
        if self.is_negative() { Self::ZERO } else { self }
    }

    /// Parse a user-entered amount.
    ///
    /// Accepts an optional `R$` prefix, Brazilian grouping (`1.500,75`), plain
    /// decimal notation (`1500.75`) and integers (`2000`). With a comma present
    /// the comma is the decimal separator and dots are thousands separators.
    /// Without one, dots are thousands separators too when they group digits
    /// in threes (`1.500`, `1.500.000`); a lone dot followed by one or two
    /// digits is a decimal point.
    ///
    /// Never rounds: more than two decimal places, or grouping that is not in
    /// threes, is a validation error.
    pub fn parse_localized(input: &str) -> DomainResult<Self> {
        let mut s = input.trim();
        if let Some(rest) = s.strip_prefix("R$") {
            s = rest.trim_start();
        }

        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest.trim_start()),
            None => (false, s),
        };

        if digits.is_empty() {
            return Err(DomainError::validation(format!("amount is empty: {input:?}")));
        }
        let not_a_number = || DomainError::validation(format!("amount is not a number: {input:?}"));
        if !digits.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ',') {
            return Err(not_a_number());
        }

        let (int_part, frac_part) = match (digits.matches(',').count(), digits.matches('.').count()) {
            (0, 1) => {
                let (int, frac) = digits.split_once('.').unwrap_or((digits, ""));
                if frac.len() == 3 { (digits, None) } else { (int, Some(frac)) }
            }
            (0, _) => (digits, None),
            (1, _) => {
                let (int, frac) = digits.split_once(',').unwrap_or((digits, ""));
                (int, Some(frac))
            }
            _ => {
                return Err(DomainError::validation(format!(
                    "amount has more than one decimal separator: {input:?}"
                )));
            }
        };

        if !is_grouped_integer(int_part) {
            return Err(not_a_number());
        }
        let mut canonical = int_part.replace('.', "");
        if let Some(frac) = frac_part {
            if frac.is_empty() || !frac.chars().all(|c| c.is_ascii_digit()) {
                return Err(not_a_number());
            }
            if frac.len() > SCALE as usize {
                return Err(DomainError::validation(format!(
                    "amount has more than {SCALE} decimal places: {input:?}"
                )));
            }
            canonical.push('.');
            canonical.push_str(frac);
        }

        let value = Decimal::from_str(&canonical)
            .map_err(|e| DomainError::validation(format!("amount {input:?}: {e}")))?;

        Ok(Self::new(if negative { -value } else { value }))
    }

    /// Render as Brazilian currency, e.g. `R$ 1.500,75`.
    pub fn format_brl(self) -> String {
        let fixed = format!("{:.2}", self.0.abs());
        let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

        let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
        for (idx, ch) in int_part.chars().enumerate() {
            if idx > 0 && (int_part.len() - idx) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(ch);
        }

        let sign = if self.is_negative() { "-" } else { "" };
        format!("{sign}R$ {grouped},{frac_part}")
    }
}

/// Digits, optionally grouped in threes by dots (`1.234.567`).
fn is_grouped_integer(part: &str) -> bool {
    let mut groups = part.split('.');
    let Some(first) = groups.next() else {
        return false;
    };
    let all_digits = |g: &str| g.chars().all(|c| c.is_ascii_digit());
    if first.is_empty() || !all_digits(first) {
        return false;
    }
    if !part.contains('.') {
        return true;
    }
    first.len() <= 3 && groups.all(|g| g.len() == 3 && all_digits(g))
}

impl ValueObject for Amount {}

impl From<Decimal> for Amount {
    fn from(value: Decimal) -> Self {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(value: Amount) -> Self {
        value.0
    }
}

impl FromStr for Amount {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_localized(s)
    }
}

impl core::fmt::Display for Amount {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0 + rhs.0)
    }
}

impl Sub for Amount {
    type Output = Amount;

    fn sub(self, rhs: Amount) -> Amount {
        Amount(self.0 - rhs.0)
    }
}

impl Neg for Amount {
    type Output = Amount;

    fn neg(self) -> Amount {
        Amount(-self.0)
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, rhs: Amount) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Amount {
    fn sub_assign(&mut self, rhs: Amount) {
        self.0 -= rhs.0;
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Amount {
        iter.fold(Amount::ZERO, Add::add)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_plain_decimal_notation() {
        assert_eq!(Amount::parse_localized("1500.75").unwrap().value(), dec!(1500.75));
        assert_eq!(Amount::parse_localized("500.25").unwrap().value(), dec!(500.25));
        assert_eq!(Amount::parse_localized("2000").unwrap().value(), dec!(2000));
    }

    #[test]
    fn parses_brazilian_notation() {
        assert_eq!(Amount::parse_localized("150,00").unwrap().value(), dec!(150));
        assert_eq!(Amount::parse_localized("1.500,75").unwrap().value(), dec!(1500.75));
        assert_eq!(Amount::parse_localized("R$ 1.000,50").unwrap().value(), dec!(1000.50));
        assert_eq!(Amount::parse_localized("1.234.567").unwrap().value(), dec!(1234567));
    }

    #[test]
    fn a_dot_before_three_digits_groups_thousands() {
        assert_eq!(Amount::parse_localized("1.500").unwrap().value(), dec!(1500));
        assert_eq!(Amount::parse_localized("R$ 1.500").unwrap().value(), dec!(1500));
        assert_eq!(Amount::parse_localized("12.345").unwrap().value(), dec!(12345));
        assert_eq!(Amount::parse_localized("1.500.000").unwrap().value(), dec!(1500000));
        assert_eq!(Amount::parse_localized("R$ -2.000").unwrap().value(), dec!(-2000));
        // One or two digits after a lone dot is still a decimal point.
        assert_eq!(Amount::parse_localized("1.5").unwrap().value(), dec!(1.50));
        assert_eq!(Amount::parse_localized("0.05").unwrap().value(), dec!(0.05));
    }

    #[test]
    fn never_rounds_extra_decimal_places() {
        for bad in ["12.3456", "1,505", "1.500,755", "R$ 0,001"] {
            let err = Amount::parse_localized(bad).unwrap_err();
            assert!(
                matches!(&err, DomainError::Validation(msg) if msg.contains("decimal places")),
                "{bad:?} should be rejected, got {err:?}"
            );
        }
    }

    #[test]
    fn rejects_malformed_grouping() {
        for bad in ["1.50.0", "1500.750", "1.5000.000", "12.34.567,00", ".500", "1.500,"] {
            assert!(Amount::parse_localized(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn rejects_garbage() {
        for bad in ["", "   ", "R$", "abc", "1,2,3", "12.", ",5", "1e5"] {
            let err = Amount::parse_localized(bad).unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn rounds_to_cents() {
        assert_eq!(Amount::new(dec!(10.005)).value(), dec!(10.01));
        assert_eq!(Amount::new(dec!(10.004)).value(), dec!(10.00));
        assert_eq!(Amount::new(dec!(-10.005)).value(), dec!(-10.01));
    }

    #[test]
    fn equal_after_normalisation() {
        assert_eq!(Amount::new(dec!(1.5)), Amount::from_cents(150));
    }

    #[test]
    fn formats_as_reais() {
        assert_eq!(Amount::new(dec!(1500.75)).format_brl(), "R$ 1.500,75");
        assert_eq!(Amount::new(dec!(1000.5)).format_brl(), "R$ 1.000,50");
        assert_eq!(Amount::new(dec!(490)).format_brl(), "R$ 490,00");
        assert_eq!(Amount::new(dec!(1234567.8)).format_brl(), "R$ 1.234.567,80");
        assert_eq!(Amount::new(dec!(-50.25)).format_brl(), "-R$ 50,25");
        assert_eq!(Amount::ZERO.format_brl(), "R$ 0,00");
    }

    #[test]
    fn arithmetic_stays_exact() {
        let total: Amount = [dec!(0.1), dec!(0.2), dec!(0.3)].into_iter().map(Amount::new).sum();
        assert_eq!(total.value(), dec!(0.6));
        assert_eq!((Amount::from_cents(100) - Amount::from_cents(250)).value(), dec!(-1.50));
        assert_eq!(Amount::from_cents(-5).clamp_non_negative(), Amount::ZERO);
    }

    #[test]
    fn serde_round_trips_as_string() {
        let amount = Amount::new(dec!(1050.25));
        let json = serde_json::to_string(&amount).unwrap();
        assert_eq!(json, "\"1050.25\"");
        let back: Amount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, amount);
    }

    proptest::proptest! {
        /// Property: whatever the ledger displays, typing it back yields the same amount.
        #[test]
        fn displayed_amounts_parse_back_exactly(cents in 0i64..100_000_000_000i64) {
            let amount = Amount::from_cents(cents);
            proptest::prop_assert_eq!(Amount::parse_localized(&amount.format_brl()).unwrap(), amount);
        }
    }
}

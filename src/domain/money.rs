use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Money - Philippine peso amounts held as integer centavos
// ============================================================================
//
// Gateway amounts are centavos too, so no conversion happens at the edge.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub const fn cents(&self) -> i64 {
        self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    pub fn checked_sub(self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money)
    }

    /// Line subtotal: unit price times quantity.
    pub fn checked_times(self, quantity: i32) -> Option<Money> {
        self.0.checked_mul(i64::from(quantity)).map(Money)
    }

    /// Share of this amount at `rate` (0.0..=1.0), rounded to the nearest centavo.
    pub fn share(self, rate: f64) -> Money {
        Money((self.0 as f64 * rate).round() as i64)
    }

    pub fn checked_sum<I>(amounts: I) -> Option<Money>
    where
        I: IntoIterator<Item = Money>,
    {
        amounts
            .into_iter()
            .try_fold(Money::ZERO, |acc, m| acc.checked_add(m))
    }
}

impl From<i64> for Money {
    fn from(cents: i64) -> Self {
        Money(cents)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}\u{20b1}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_subtotal_and_sum() {
        let lines = [
            Money::from_cents(29_900).checked_times(2).unwrap(),
            Money::from_cents(15_050).checked_times(1).unwrap(),
        ];
        assert_eq!(Money::checked_sum(lines), Some(Money::from_cents(74_850)));
    }

    #[test]
    fn test_overflow_is_none() {
        assert_eq!(Money::from_cents(i64::MAX).checked_add(Money::from_cents(1)), None);
        assert_eq!(Money::from_cents(i64::MAX).checked_times(2), None);
    }

    #[test]
    fn test_share_rounds_to_centavo() {
        assert_eq!(Money::from_cents(999).share(0.7), Money::from_cents(699));
        assert_eq!(Money::from_cents(1_000).share(0.7), Money::from_cents(700));
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(123_456).to_string(), "\u{20b1}1234.56");
        assert_eq!(Money::from_cents(-5).to_string(), "-\u{20b1}0.05");
    }

    #[test]
    fn test_serializes_as_plain_integer() {
        let json = serde_json::to_string(&Money::from_cents(4_999)).unwrap();
        assert_eq!(json, "4999");
    }
}

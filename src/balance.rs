//! Balance values and the aggregation step.

use crate::error::{Error, Result};
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

/// A dollar amount read from an alert snippet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Balance(Decimal);

impl Balance {
    /// Wraps a decimal amount.
    #[must_use]
    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Parses matched amount text such as `$1,234.56` or `1,234.56`.
    ///
    /// The `$` sign and `,` grouping separators are dropped before parsing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAmount`] if the remainder is not a decimal.
    ///
    /// ```
    /// use effective_balance::Balance;
    /// use rust_decimal::Decimal;
    ///
    /// let balance = Balance::parse("$1,234.56").unwrap();
    /// assert_eq!(balance.amount(), Decimal::new(123_456, 2));
    /// ```
    pub fn parse(raw: &str) -> Result<Self> {
        let digits: String = raw.chars().filter(|c| *c != '$' && *c != ',').collect();

        Decimal::from_str(&digits)
            .map(Self)
            .map_err(|source| Error::InvalidAmount {
                raw: raw.to_string(),
                source,
            })
    }

    /// Returns the amount.
    #[must_use]
    pub fn amount(self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Signed difference between the two tracked balances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EffectiveBalance(Decimal);

impl EffectiveBalance {
    /// Returns the amount.
    #[must_use]
    pub fn amount(self) -> Decimal {
        self.0
    }
}

impl From<Decimal> for EffectiveBalance {
    fn from(amount: Decimal) -> Self {
        Self(amount)
    }
}

/// Plain decimal notation: no grouping, leading `-` when negative.
impl fmt::Display for EffectiveBalance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Combines two balances into the effective balance `a - b`.
///
/// ```
/// use effective_balance::{aggregate, Balance};
/// use rust_decimal::Decimal;
///
/// let a = Balance::new(Decimal::new(10_000, 2));
/// let b = Balance::new(Decimal::new(4_000, 2));
/// assert_eq!(aggregate(a, b).amount(), Decimal::new(6_000, 2));
/// ```
#[must_use]
pub fn aggregate(balance_a: Balance, balance_b: Balance) -> EffectiveBalance {
    EffectiveBalance(balance_a.0 - balance_b.0)
}

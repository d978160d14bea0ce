//! Snippet matching for pulling an amount out of alert text.
//!
//! # Example
//!
//! ```
//! use effective_balance::matcher::{DollarAmountMatcher, Matcher};
//!
//! let matcher = DollarAmountMatcher::new();
//! let text = "Your balance is $1,234.56 as of today";
//! assert_eq!(matcher.find_match(text).as_deref(), Some("1,234.56"));
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

/// `$`, then digits with optional `,` grouping, then an optional fraction.
static DOLLAR_AMOUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$(\d[\d,]*(?:\.\d+)?)").expect("valid regex"));

/// Trait for matching and extracting content from message text.
///
/// Implement this trait to plug in a different alert format.
///
/// # Example
///
/// ```
/// use effective_balance::matcher::Matcher;
/// use std::borrow::Cow;
///
/// struct EuroMatcher;
///
/// impl Matcher for EuroMatcher {
///     fn find_match<'a>(&self, text: &'a str) -> Option<Cow<'a, str>> {
///         text.split_whitespace()
///             .find_map(|word| word.strip_prefix('€'))
///             .map(Cow::Borrowed)
///     }
///
///     fn description(&self) -> &str {
///         "euro amount"
///     }
/// }
///
/// assert_eq!(EuroMatcher.find_match("Saldo €12.50").as_deref(), Some("12.50"));
/// ```
pub trait Matcher: Send + Sync {
    /// Attempts to find and extract matching content from the text.
    ///
    /// Returns `Some(matched_value)` if found, `None` otherwise.
    fn find_match<'a>(&self, text: &'a str) -> Option<Cow<'a, str>>;

    /// Returns a human-readable description of what this matcher looks for.
    ///
    /// Used in logging and error messages.
    fn description(&self) -> &str;
}

/// Matcher for `$`-prefixed amounts such as `$1,234.56`.
///
/// Only the first amount in reading order is returned, without the `$`.
/// Alerts that print a transaction amount before the balance will
/// yield the transaction amount.
///
/// ```
/// use effective_balance::matcher::{DollarAmountMatcher, Matcher};
///
/// let matcher = DollarAmountMatcher::new();
/// let text = "Payment of $50.00 posted; new balance $900.00";
/// assert_eq!(matcher.find_match(text).as_deref(), Some("50.00"));
/// assert_eq!(matcher.find_match("no amount"), None);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct DollarAmountMatcher;

impl DollarAmountMatcher {
    /// Creates the matcher.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Matcher for DollarAmountMatcher {
    fn find_match<'a>(&self, text: &'a str) -> Option<Cow<'a, str>> {
        DOLLAR_AMOUNT
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| Cow::Borrowed(m.as_str()))
    }

    fn description(&self) -> &str {
        "dollar amount"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grouped_amount() {
        let matcher = DollarAmountMatcher::new();
        assert_eq!(
            matcher
                .find_match("Your balance is $1,234.56 as of today")
                .as_deref(),
            Some("1,234.56")
        );
    }

    #[test]
    fn test_first_amount_wins() {
        let matcher = DollarAmountMatcher::new();
        assert_eq!(
            matcher
                .find_match("Payment of $50.00 posted; new balance $900.00")
                .as_deref(),
            Some("50.00")
        );
    }

    #[test]
    fn test_whole_dollars_and_trailing_period() {
        let matcher = DollarAmountMatcher::new();
        assert_eq!(matcher.find_match("Balance: $200").as_deref(), Some("200"));
        // Sentence punctuation is not a fraction
        assert_eq!(
            matcher.find_match("Your balance is $1,500.").as_deref(),
            Some("1,500")
        );
    }

    #[test]
    fn test_no_amount() {
        let matcher = DollarAmountMatcher::new();
        assert_eq!(matcher.find_match("Your balance is available online"), None);
        assert_eq!(matcher.find_match("Price in $ only"), None);
        assert_eq!(matcher.find_match(""), None);
    }

    #[test]
    fn test_returns_borrowed() {
        let matcher = DollarAmountMatcher::new();
        let result = matcher.find_match("Balance $12.34");
        assert!(matches!(result, Some(Cow::Borrowed(_))));
    }
}

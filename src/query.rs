//! Sender-scoped mailbox queries.

use std::fmt;

/// A bank whose alerts are tracked: a display label and the alert sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankAccount {
    /// Human-readable name used in logs and errors.
    pub label: String,
    /// Sender address the alerts come from.
    pub sender: String,
}

impl BankAccount {
    /// Creates a bank account description.
    #[must_use]
    pub fn new(label: impl Into<String>, sender: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            sender: sender.into(),
        }
    }

    /// Builds the query for this bank's alerts within the recency window.
    #[must_use]
    pub fn query(&self, recency_days: u32) -> Query {
        Query::new(&self.sender, recency_days)
    }
}

/// An immutable (sender, recency window) pair.
///
/// Renders in Gmail search syntax:
///
/// ```
/// use effective_balance::Query;
///
/// let query = Query::new("alerts@citibank.com", 2);
/// assert_eq!(query.to_string(), "from:alerts@citibank.com newer_than:2d");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    sender: String,
    recency_days: u32,
}

impl Query {
    /// Creates a query for one sender and one recency window.
    #[must_use]
    pub fn new(sender: impl Into<String>, recency_days: u32) -> Self {
        Self {
            sender: sender.into(),
            recency_days,
        }
    }

    /// Returns the sender this query targets.
    #[must_use]
    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Returns the recency window in days.
    #[must_use]
    pub fn recency_days(&self) -> u32 {
        self.recency_days
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "from:{} newer_than:{}d", self.sender, self.recency_days)
    }
}

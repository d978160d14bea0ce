//! The read-only mailbox interface consumed by the extractor.
//!
//! [`GmailClient`](crate::GmailClient) is the production implementation. Tests
//! drive the pipeline with in-memory implementations.

use crate::error::Result;
use crate::query::Query;
use chrono::{DateTime, Utc};
use std::fmt;

/// Opaque identifier of a message in the mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(pub u32);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One search hit. Only the id is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageSummary {
    /// Message identifier to pass to [`Mailbox::fetch`].
    pub id: MessageId,
}

/// A fetched message, reduced to the fields the extractor reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDetail {
    /// Message identifier.
    pub id: MessageId,
    /// Short plain-text excerpt of the body.
    pub snippet: String,
    /// Server receive time, used to find the newest alert.
    pub internal_date: DateTime<Utc>,
}

/// Read-only access to a mailbox.
#[allow(async_fn_in_trait)]
pub trait Mailbox {
    /// Returns the first page of messages matching `query`.
    ///
    /// # Errors
    ///
    /// Returns an error if the search cannot be performed.
    async fn search(&mut self, query: &Query) -> Result<Vec<MessageSummary>>;

    /// Fetches one message.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be fetched or parsed.
    async fn fetch(&mut self, id: MessageId) -> Result<MessageDetail>;

    /// Ends the session. The default does nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the logout.
    async fn logout(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Opens mailbox sessions with valid credentials.
#[allow(async_fn_in_trait)]
pub trait SessionProvider {
    /// The session type handed to the extractor.
    type Session: Mailbox;

    /// Returns an authenticated, read-only session.
    ///
    /// # Errors
    ///
    /// Returns an error if credentials cannot be loaded or refreshed, or the
    /// connection fails.
    async fn get_session(&self) -> Result<Self::Session>;
}

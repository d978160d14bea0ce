//! # effective-balance
//!
//! Reads the latest balance alerts from two banks in a Gmail mailbox, subtracts
//! one from the other and emails the result.
//!
//! This crate provides:
//! - A read-only Gmail client over IMAP with OAuth2 (`XOAUTH2`) and token refresh
//! - Extraction of a dollar amount from the newest alert of a given sender
//! - Aggregation and SMTP notification of the effective balance
//! - A non-overlapping periodic driver
//!
//! ## Features
//!
//! - **`integration-tests`**: Enables tests against a live Gmail account.
//!
//! ## Quick Start
//!
//! ```no_run
//! use effective_balance::{AppConfig, GmailSessionProvider, Pipeline, RunOutcome, SmtpNotifier};
//!
//! # async fn example() -> effective_balance::Result<()> {
//! let config = AppConfig::from_env()?;
//!
//! let provider = GmailSessionProvider::new(&config)?;
//! let notifier = SmtpNotifier::new(&config.smtp, &config.timeouts)?;
//! let pipeline = Pipeline::new(provider, notifier, (&config).into());
//!
//! match pipeline.run_once().await? {
//!     RunOutcome::Sent(balance) => println!("Sent: {balance}"),
//!     RunOutcome::Skipped { sender_label } => println!("No recent alert from {sender_label}"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Aggregation
//!
//! ```
//! use effective_balance::{aggregate, Balance, Notification};
//!
//! let a = Balance::parse("200.00").unwrap();
//! let b = Balance::parse("75.25").unwrap();
//! let report = Notification::effective_balance(aggregate(a, b));
//! assert_eq!(report.body, "Effective Balance: $124.75");
//! ```
//!
//! ## Error Handling
//!
//! All errors implement `std::error::Error` and provide context. Use [`Error::is_retryable`]
//! to decide whether an operation can be retried, and [`Error::is_skip`] to recognize a
//! run that ended because a bank had no recent alert:
//!
//! ```
//! use effective_balance::Error;
//!
//! fn handle_error(error: &Error) {
//!     if error.is_skip() {
//!         println!("Nothing to report: {}", error);
//!     } else if error.is_retryable() {
//!         println!("Transient error, can retry: {}", error);
//!     } else {
//!         println!("Permanent error: {}", error);
//!     }
//! }
//! ```
//!
//! ## Observability
//!
//! The crate uses `tracing` for instrumentation. All major operations emit spans with
//! structured fields suitable for distributed tracing.
//!
//! ### Span Naming Convention
//!
//! - `Pipeline::run_once` - One end-to-end run
//! - `Pipeline::run_periodic` - Scheduler
//! - `Extractor::extract` - Balance extraction for one bank
//! - `GmailSessionProvider::get_session` - Credential refresh and login
//! - `GmailClient::connect` / `search` / `fetch` / `logout` - IMAP operations
//! - `session::authenticate` - IMAP authentication
//! - `connection::connect_tls` - TLS connection
//! - `SmtpNotifier::send` - Notification delivery
//!
//! ### Standard Fields
//!
//! - `email` - Mailbox address
//! - `imap_host` - IMAP server hostname
//! - `bank` - Bank label
//! - `query` - Rendered search query
//! - `uid` - Message UID

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
pub mod balance;
pub mod config;
pub mod error;
pub mod extractor;
pub mod mailbox;
pub mod matcher;
pub mod notifier;
pub mod oauth;
pub mod pipeline;
pub mod query;
pub mod retry;

// Internal modules
mod client;
mod connection;
mod parser;
mod provider;
mod session;
#[cfg(test)]
mod test_support;

// Re-exports for ergonomic API
pub use balance::{aggregate, Balance, EffectiveBalance};
pub use client::GmailClient;
pub use config::{
    AppConfig, AppConfigBuilder, CredentialSource, MailConfig, ScheduleConfig, SmtpConfig,
    SmtpTls, TimeoutConfig,
};
pub use email_address::EmailAddress;
pub use error::{Error, ErrorCategory, Result};
pub use mailbox::{Mailbox, MessageDetail, MessageId, MessageSummary, SessionProvider};
pub use notifier::{notify, Notification, Notifier, SmtpNotifier};
pub use oauth::{CredentialStore, OAuthCredentials};
pub use pipeline::{Pipeline, PipelineSettings, RunOutcome};
pub use provider::GmailSessionProvider;
pub use query::{BankAccount, Query};
pub use retry::RetryPolicy;

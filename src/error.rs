//! Error types for the effective-balance crate.
//!
//! Every failure of a pipeline run is one [`Error`] variant. Errors are
//! classified by retryability (see [`Error::is_retryable`]) and by
//! [`ErrorCategory`] for logging.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while producing an effective balance.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    // ─────────────────────────────────────────────────────────────────────────
    // Configuration / validation errors (NOT retryable)
    // ─────────────────────────────────────────────────────────────────────────
    /// Invalid email address format.
    #[error("invalid email format: {email}")]
    InvalidEmailFormat {
        /// The invalid email address.
        email: String,
    },

    /// Invalid configuration provided.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration error.
        message: String,
    },

    /// Invalid DNS name for TLS.
    #[error("invalid DNS name for host '{host}'")]
    InvalidDnsName {
        /// The invalid hostname.
        host: String,
        /// The underlying DNS name error.
        #[source]
        source: rustls::client::InvalidDnsNameError,
    },

    /// Credential JSON could not be decoded.
    #[error("malformed OAuth credentials")]
    CredentialFormat {
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Credential file could not be read or written.
    #[error("credential file {path} is not accessible")]
    CredentialFile {
        /// Path of the credential file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Authorization errors (NOT retryable except server-side token errors)
    // ─────────────────────────────────────────────────────────────────────────
    /// The stored credential has expired and carries no refresh token.
    #[error("access token expired and no refresh token is stored")]
    MissingRefreshToken,

    /// The token endpoint rejected the refresh or code exchange.
    #[error("token endpoint rejected the request ({status}): {body}")]
    TokenRejected {
        /// HTTP status returned by the token endpoint.
        status: u16,
        /// Response body, usually an OAuth error object.
        body: String,
    },

    /// The token endpoint answered with success but the body is not a token response.
    #[error("token endpoint {token_uri} returned an unreadable token response")]
    TokenResponse {
        /// The token endpoint.
        token_uri: String,
        /// The underlying decode error.
        #[source]
        source: reqwest::Error,
    },

    /// IMAP XOAUTH2 authentication failed.
    #[error("IMAP login failed for {email}")]
    ImapLogin {
        /// The mailbox address used for login.
        email: String,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Network / connection errors (RETRYABLE)
    // ─────────────────────────────────────────────────────────────────────────
    /// Failed to establish TCP connection.
    #[error("failed to connect to {target}")]
    TcpConnect {
        /// The target address that failed.
        target: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to establish TLS connection.
    #[error("failed to establish TLS connection to {target}")]
    TlsConnect {
        /// The target address that failed.
        target: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The token endpoint could not be reached.
    #[error("failed to reach token endpoint {token_uri}")]
    TokenRefresh {
        /// The token endpoint.
        token_uri: String,
        /// The underlying HTTP error.
        #[source]
        source: reqwest::Error,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Timeout errors (RETRYABLE except logout)
    // ─────────────────────────────────────────────────────────────────────────
    /// Connection timeout.
    #[error("connection timeout to {target} after {timeout:?}")]
    ConnectTimeout {
        /// The target address.
        target: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Authentication timeout.
    #[error("authentication timeout for {email} after {timeout:?}")]
    AuthTimeout {
        /// The mailbox address used for authentication.
        email: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Mailbox examine timeout.
    #[error("mailbox selection timeout for '{mailbox}' after {timeout:?}")]
    SelectTimeout {
        /// The mailbox name.
        mailbox: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Search timeout.
    #[error("search timeout for '{query}' after {timeout:?}")]
    SearchTimeout {
        /// The provider query.
        query: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Message fetch timeout.
    #[error("message fetch timeout for UID {uid} after {timeout:?}")]
    FetchTimeout {
        /// The UID being fetched.
        uid: u32,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Notification send timeout.
    #[error("notification send timeout after {timeout:?}")]
    SendTimeout {
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Logout timeout (not critical).
    #[error("logout timeout after {timeout:?}")]
    LogoutTimeout {
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // IMAP protocol errors (RETRYABLE - could be transient server issues)
    // ─────────────────────────────────────────────────────────────────────────
    /// Failed to open the mailbox.
    #[error("failed to examine mailbox '{mailbox}'")]
    ExamineMailbox {
        /// The mailbox name.
        mailbox: String,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// IMAP search failed.
    #[error("IMAP search failed for '{query}'")]
    ImapSearch {
        /// The provider query.
        query: String,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// IMAP fetch failed.
    #[error("IMAP fetch failed for UID {uid}")]
    ImapFetch {
        /// The UID that failed.
        uid: u32,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// The server answered a fetch without the requested message.
    #[error("message UID {uid} not returned by server")]
    MessageMissing {
        /// The requested UID.
        uid: u32,
    },

    /// IMAP logout failed.
    #[error("IMAP logout failed")]
    ImapLogout {
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Content errors (NOT retryable - the message won't change)
    // ─────────────────────────────────────────────────────────────────────────
    /// Failed to parse a fetched message.
    #[error("failed to parse message UID {uid}")]
    ParseEmail {
        /// The message UID.
        uid: u32,
        /// The underlying parse error.
        #[source]
        source: mailparse::MailParseError,
    },

    /// The newest alert contains no dollar amount.
    #[error("no dollar amount found in latest message from {sender_label}")]
    ExtractionFailure {
        /// The bank whose message was inspected.
        sender_label: String,
        /// The snippet that was scanned.
        snippet: String,
    },

    /// A matched amount could not be represented as a decimal.
    #[error("amount '{raw}' is not a valid decimal")]
    InvalidAmount {
        /// The matched text.
        raw: String,
        /// The underlying decimal error.
        #[source]
        source: rust_decimal::Error,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Notification errors
    // ─────────────────────────────────────────────────────────────────────────
    /// The notification message could not be built.
    #[error("failed to build notification message")]
    InvalidMessage {
        /// The underlying builder error.
        #[source]
        source: lettre::error::Error,
    },

    /// SMTP submission failed.
    #[error("failed to send notification via {host}")]
    SmtpSend {
        /// The SMTP relay host.
        host: String,
        /// The underlying SMTP error.
        #[source]
        source: lettre::transport::smtp::Error,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Search result errors (NOT retryable, skip this run)
    // ─────────────────────────────────────────────────────────────────────────
    /// The search returned no messages for a sender.
    #[error("no matching messages for {sender_label}")]
    NoMatchingMessages {
        /// The bank whose query came back empty.
        sender_label: String,
    },
}

impl Error {
    /// Returns `true` if this error represents a transient failure that might succeed on retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::TcpConnect { .. }
            | Error::TlsConnect { .. }
            | Error::TokenRefresh { .. }
            | Error::ConnectTimeout { .. }
            | Error::AuthTimeout { .. }
            | Error::SelectTimeout { .. }
            | Error::SearchTimeout { .. }
            | Error::FetchTimeout { .. }
            | Error::SendTimeout { .. }
            | Error::ExamineMailbox { .. }
            | Error::ImapSearch { .. }
            | Error::ImapFetch { .. }
            | Error::MessageMissing { .. } => true,

            Error::TokenRejected { status, .. } => *status >= 500,
            Error::SmtpSend { source, .. } => source.is_transient() || source.is_timeout(),

            Error::InvalidEmailFormat { .. }
            | Error::InvalidConfig { .. }
            | Error::InvalidDnsName { .. }
            | Error::CredentialFormat { .. }
            | Error::CredentialFile { .. }
            | Error::MissingRefreshToken
            | Error::TokenResponse { .. }
            | Error::ImapLogin { .. }
            | Error::LogoutTimeout { .. }
            | Error::ImapLogout { .. }
            | Error::ParseEmail { .. }
            | Error::ExtractionFailure { .. }
            | Error::InvalidAmount { .. }
            | Error::InvalidMessage { .. }
            | Error::NoMatchingMessages { .. } => false,
        }
    }

    /// Returns `true` if an IMAP command was cut off before its responses were read.
    ///
    /// The connection may still deliver replies to the abandoned command, so
    /// the session must be dropped rather than reused or logged out.
    #[must_use]
    pub fn breaks_session(&self) -> bool {
        matches!(
            self,
            Error::SearchTimeout { .. }
                | Error::FetchTimeout { .. }
                | Error::ImapSearch { .. }
                | Error::ImapFetch { .. }
        )
    }

    /// Returns `true` if the run should be skipped quietly rather than reported as a failure.
    #[must_use]
    pub fn is_skip(&self) -> bool {
        matches!(self, Error::NoMatchingMessages { .. })
    }

    /// Returns the error category for logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidEmailFormat { .. }
            | Error::InvalidConfig { .. }
            | Error::InvalidDnsName { .. }
            | Error::CredentialFormat { .. }
            | Error::CredentialFile { .. } => ErrorCategory::Configuration,

            Error::MissingRefreshToken | Error::TokenRejected { .. } | Error::ImapLogin { .. } => {
                ErrorCategory::Auth
            }

            Error::TcpConnect { .. } | Error::TlsConnect { .. } | Error::TokenRefresh { .. } => {
                ErrorCategory::Network
            }

            Error::ConnectTimeout { .. }
            | Error::AuthTimeout { .. }
            | Error::SelectTimeout { .. }
            | Error::SearchTimeout { .. }
            | Error::FetchTimeout { .. }
            | Error::LogoutTimeout { .. } => ErrorCategory::Timeout,

            Error::ExamineMailbox { .. }
            | Error::ImapSearch { .. }
            | Error::ImapFetch { .. }
            | Error::MessageMissing { .. }
            | Error::ImapLogout { .. }
            | Error::TokenResponse { .. } => ErrorCategory::Protocol,

            Error::ParseEmail { .. }
            | Error::ExtractionFailure { .. }
            | Error::InvalidAmount { .. } => ErrorCategory::Parse,

            Error::SendTimeout { .. } | Error::InvalidMessage { .. } | Error::SmtpSend { .. } => {
                ErrorCategory::Notification
            }

            Error::NoMatchingMessages { .. } => ErrorCategory::NotFound,
        }
    }
}

/// Error categories for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Configuration or validation errors.
    Configuration,
    /// Credential or login errors.
    Auth,
    /// Network connectivity errors.
    Network,
    /// Timeout errors.
    Timeout,
    /// IMAP protocol errors.
    Protocol,
    /// Message content errors.
    Parse,
    /// No matching message found.
    NotFound,
    /// Outbound notification errors.
    Notification,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Auth => write!(f, "auth"),
            ErrorCategory::Network => write!(f, "network"),
            ErrorCategory::Timeout => write!(f, "timeout"),
            ErrorCategory::Protocol => write!(f, "protocol"),
            ErrorCategory::Parse => write!(f, "parse"),
            ErrorCategory::NotFound => write!(f, "not_found"),
            ErrorCategory::Notification => write!(f, "notification"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let err = Error::InvalidEmailFormat {
            email: "bad".into(),
        };
        assert!(!err.is_retryable());

        let err = Error::TcpConnect {
            target: "imap.gmail.com:993".into(),
            source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
        };
        assert!(err.is_retryable());

        let err = Error::SearchTimeout {
            query: "from:alerts@citibank.com newer_than:2d".into(),
            timeout: Duration::from_secs(15),
        };
        assert!(err.is_retryable());

        // Auth and content failures never succeed on a second attempt
        assert!(!Error::MissingRefreshToken.is_retryable());
        let err = Error::ExtractionFailure {
            sender_label: "Citi".into(),
            snippet: "no amounts here".into(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_interrupted_commands_break_session() {
        let err = Error::SearchTimeout {
            query: "from:alerts@citibank.com newer_than:2d".into(),
            timeout: Duration::from_secs(15),
        };
        assert!(err.breaks_session());

        let err = Error::FetchTimeout {
            uid: 7,
            timeout: Duration::from_secs(30),
        };
        assert!(err.breaks_session());

        // Fully answered commands leave the connection in sync
        assert!(!Error::MessageMissing { uid: 7 }.breaks_session());
        assert!(!Error::MissingRefreshToken.breaks_session());
    }

    #[test]
    fn test_no_matching_messages_is_skip() {
        let err = Error::NoMatchingMessages {
            sender_label: "SunTrust".into(),
        };
        assert!(err.is_skip());
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "no matching messages for SunTrust");

        let err = Error::ExtractionFailure {
            sender_label: "SunTrust".into(),
            snippet: String::new(),
        };
        assert!(!err.is_skip());
    }

    #[test]
    fn test_error_categories() {
        let err = Error::TokenRejected {
            status: 400,
            body: r#"{"error":"invalid_grant"}"#.into(),
        };
        assert_eq!(err.category(), ErrorCategory::Auth);

        let err = Error::ConnectTimeout {
            target: "imap.gmail.com:993".into(),
            timeout: Duration::from_secs(10),
        };
        assert_eq!(err.category(), ErrorCategory::Timeout);

        let err = Error::NoMatchingMessages {
            sender_label: "Citi".into(),
        };
        assert_eq!(err.category(), ErrorCategory::NotFound);

        let err = Error::SendTimeout {
            timeout: Duration::from_secs(30),
        };
        assert_eq!(err.category(), ErrorCategory::Notification);
        assert_eq!(err.category().to_string(), "notification");
    }
}

//! Gmail mailbox client over IMAP.
//!
//! [`GmailClient`] implements [`Mailbox`] on top of Gmail's IMAP service. It
//! authenticates with an OAuth2 access token (`XOAUTH2`), opens INBOX
//! read-only and searches with Gmail's own query syntax (`X-GM-RAW`).
//!
//! # Example
//!
//! ```no_run
//! use effective_balance::{AppConfig, GmailClient, Mailbox, Query};
//!
//! # async fn example(config: AppConfig, access_token: &str) -> effective_balance::Result<()> {
//! let mut client = GmailClient::connect(&config.mail, &config.timeouts, access_token).await?;
//!
//! let hits = client.search(&Query::new("alerts@citibank.com", 2)).await?;
//! for hit in hits {
//!     let detail = client.fetch(hit.id).await?;
//!     println!("{}: {}", detail.internal_date, detail.snippet);
//! }
//!
//! client.logout().await?;
//! # Ok(())
//! # }
//! ```

use crate::config::{MailConfig, TimeoutConfig};
use crate::connection;
use crate::error::{Error, Result};
use crate::mailbox::{Mailbox, MessageDetail, MessageId, MessageSummary};
use crate::query::Query;
use crate::session::{self, ImapSession};
use tracing::{debug, instrument};

const INBOX: &str = "INBOX";

/// Authenticated, read-only Gmail session.
///
/// Create using [`GmailClient::connect`], or through
/// [`GmailSessionProvider`](crate::GmailSessionProvider) which also takes
/// care of token refresh.
pub struct GmailClient {
    session: Box<ImapSession>,
    address: String,
    timeouts: TimeoutConfig,
}

impl GmailClient {
    /// Connects, authenticates with `access_token` and opens INBOX read-only.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Connection cannot be established
    /// - The token is rejected ([`Error::ImapLogin`])
    /// - INBOX cannot be opened
    #[instrument(
        name = "GmailClient::connect",
        skip_all,
        fields(
            email = %mail.address(),
            imap_host = %mail.imap_host
        )
    )]
    pub async fn connect(
        mail: &MailConfig,
        timeouts: &TimeoutConfig,
        access_token: &str,
    ) -> Result<Self> {
        let tls_stream =
            connection::connect_tls(&mail.imap_host, mail.imap_port, timeouts.connect).await?;

        debug!("TLS connection established");

        let mut session = tokio::time::timeout(
            timeouts.auth,
            session::authenticate(tls_stream, mail.address(), access_token),
        )
        .await
        .map_err(|_| Error::AuthTimeout {
            email: mail.address().to_string(),
            timeout: timeouts.auth,
        })??;

        debug!("Authenticated");

        tokio::time::timeout(timeouts.select, session::examine_mailbox(&mut session, INBOX))
            .await
            .map_err(|_| Error::SelectTimeout {
                mailbox: INBOX.to_string(),
                timeout: timeouts.select,
            })??;

        debug!("Examined INBOX");

        Ok(Self {
            session: Box::new(session),
            address: mail.address().to_string(),
            timeouts: timeouts.clone(),
        })
    }

    /// Returns the mailbox address of this session.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.address
    }
}

impl Mailbox for GmailClient {
    #[instrument(name = "GmailClient::search", skip(self), fields(query = %query))]
    async fn search(&mut self, query: &Query) -> Result<Vec<MessageSummary>> {
        let rendered = query.to_string();
        let timeout = self.timeouts.search;

        let uids = tokio::time::timeout(timeout, session::gmail_search(&mut self.session, &rendered))
            .await
            .map_err(|_| Error::SearchTimeout {
                query: rendered.clone(),
                timeout,
            })??;

        Ok(uids
            .into_iter()
            .map(|uid| MessageSummary { id: MessageId(uid) })
            .collect())
    }

    #[instrument(name = "GmailClient::fetch", skip(self), fields(uid = id.0))]
    async fn fetch(&mut self, id: MessageId) -> Result<MessageDetail> {
        let timeout = self.timeouts.fetch;

        tokio::time::timeout(timeout, session::fetch_detail(&mut self.session, id.0))
            .await
            .map_err(|_| Error::FetchTimeout { uid: id.0, timeout })?
    }

    #[instrument(name = "GmailClient::logout", skip(self))]
    async fn logout(&mut self) -> Result<()> {
        let timeout = self.timeouts.logout;

        tokio::time::timeout(timeout, session::logout(&mut self.session))
            .await
            .map_err(|_| Error::LogoutTimeout { timeout })?
    }
}

impl std::fmt::Debug for GmailClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GmailClient")
            .field("email", &self.address)
            .finish_non_exhaustive()
    }
}

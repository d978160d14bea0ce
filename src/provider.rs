//! Mail session provider: valid credential in, authenticated session out.

use crate::client::GmailClient;
use crate::config::{AppConfig, MailConfig, TimeoutConfig};
use crate::error::{Error, Result};
use crate::mailbox::SessionProvider;
use crate::oauth::{self, CredentialStore, OAuthCredentials};
use chrono::Utc;
use std::future::Future;
use tracing::{debug, instrument, warn};

/// Opens [`GmailClient`] sessions, refreshing the OAuth token when needed.
///
/// The provider never runs an interactive authorization; the stored
/// credential must already carry a refresh token (see the `authorize`
/// subcommand of the binary).
#[derive(Debug)]
pub struct GmailSessionProvider {
    mail: MailConfig,
    timeouts: TimeoutConfig,
    store: CredentialStore,
    http: reqwest::Client,
}

impl GmailSessionProvider {
    /// Creates a provider from the application configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the HTTP client cannot be created.
    pub fn new(config: &AppConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeouts.token_refresh)
            .build()
            .map_err(|e| Error::InvalidConfig {
                message: format!("HTTP client: {e}"),
            })?;

        Ok(Self {
            mail: config.mail.clone(),
            timeouts: config.timeouts.clone(),
            store: CredentialStore::new(config.mail.credentials.clone()),
            http,
        })
    }

    async fn refresh(&self, creds: &OAuthCredentials) -> Result<OAuthCredentials> {
        let refreshed = oauth::refresh(&self.http, creds, Utc::now()).await?;
        self.store.save(&refreshed).await?;
        Ok(refreshed)
    }

    /// Loads the credential, refreshes it when stale and hands the access
    /// token to `connect`. A login rejection on a token that was not just
    /// refreshed gets one refresh and one more `connect`.
    async fn open_with<T, F, Fut>(&self, connect: F) -> Result<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut creds = self.store.load().await?;
        let mut refreshed = false;

        if creds.needs_refresh(Utc::now()) {
            debug!(expiry = ?creds.token_expiry(), "Access token expired");
            creds = self.refresh(&creds).await?;
            refreshed = true;
        }

        match connect(access_token(&creds)?).await {
            // A token revoked before its recorded expiry gets one fresh attempt
            Err(Error::ImapLogin { .. }) if !refreshed => {
                warn!("Access token rejected by IMAP server, refreshing");
                let creds = self.refresh(&creds).await?;
                connect(access_token(&creds)?).await
            }
            result => result,
        }
    }
}

fn access_token(creds: &OAuthCredentials) -> Result<String> {
    creds
        .access_token()
        .map(str::to_string)
        .ok_or(Error::MissingRefreshToken)
}

impl SessionProvider for GmailSessionProvider {
    type Session = GmailClient;

    #[instrument(name = "GmailSessionProvider::get_session", skip(self), fields(email = %self.mail.address()))]
    async fn get_session(&self) -> Result<GmailClient> {
        let (mail, timeouts) = (&self.mail, &self.timeouts);
        self.open_with(|token| async move { GmailClient::connect(mail, timeouts, &token).await })
            .await
    }
}

//! OAuth2 credentials for Gmail access.
//!
//! Credentials use the JSON layout written by Google's `oauth2client`
//! (`access_token`, `client_id`, `client_secret`, `refresh_token`,
//! `token_expiry`, `token_uri`, `user_agent`). Unknown fields are ignored.
//!
//! ```
//! use effective_balance::oauth::OAuthCredentials;
//! use chrono::{TimeZone, Utc};
//!
//! let creds = OAuthCredentials::from_json(r#"{
//!     "access_token": "ya29.a0",
//!     "client_id": "id.apps.googleusercontent.com",
//!     "client_secret": "secret",
//!     "refresh_token": "1//0g",
//!     "token_expiry": "2026-10-16T12:00:00Z",
//!     "token_uri": "https://oauth2.googleapis.com/token",
//!     "user_agent": null
//! }"#).unwrap();
//!
//! let before = Utc.with_ymd_and_hms(2026, 10, 16, 11, 0, 0).unwrap();
//! let after = Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 1).unwrap();
//! assert!(!creds.needs_refresh(before));
//! assert!(creds.needs_refresh(after));
//! ```

use crate::config::CredentialSource;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use reqwest::Url;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

/// Google's token endpoint.
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Google's consent page.
pub const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";

/// Scope required for IMAP access with XOAUTH2.
pub const GMAIL_IMAP_SCOPE: &str = "https://mail.google.com/";

/// Tokens expiring within this window are refreshed early.
fn expiry_skew() -> chrono::Duration {
    chrono::Duration::seconds(60)
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

/// A stored OAuth2 credential.
#[derive(Clone, Serialize, Deserialize)]
pub struct OAuthCredentials {
    #[serde(default)]
    access_token: Option<String>,
    client_id: String,
    client_secret: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    token_expiry: Option<DateTime<Utc>>,
    #[serde(default = "default_token_uri")]
    token_uri: String,
    #[serde(default)]
    user_agent: Option<String>,
}

impl std::fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("token_expiry", &self.token_expiry)
            .field("token_uri", &self.token_uri)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl OAuthCredentials {
    /// Decodes a credential from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CredentialFormat`] if the JSON is malformed or lacks the client fields.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|source| Error::CredentialFormat { source })
    }

    /// Encodes the credential as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CredentialFormat`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|source| Error::CredentialFormat { source })
    }

    /// Returns the current access token, if any.
    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    /// Returns the access token expiry, if known.
    #[must_use]
    pub fn token_expiry(&self) -> Option<DateTime<Utc>> {
        self.token_expiry
    }

    /// Returns `true` if the access token is missing or expires within a minute of `now`.
    ///
    /// A token without a recorded expiry is treated as valid.
    #[must_use]
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        match (&self.access_token, self.token_expiry) {
            (None, _) => true,
            (Some(_), Some(expiry)) => expiry - expiry_skew() <= now,
            (Some(_), None) => false,
        }
    }

    /// Merges a token endpoint response received at `now`.
    fn apply(&mut self, response: TokenResponse, now: DateTime<Utc>) {
        self.access_token = Some(response.access_token);
        self.token_expiry = response
            .expires_in
            .map(|secs| now + chrono::Duration::seconds(secs));
        if let Some(refresh_token) = response.refresh_token {
            self.refresh_token = Some(refresh_token);
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Exchanges the refresh token for a new access token.
///
/// # Errors
///
/// - [`Error::MissingRefreshToken`] if no refresh token is stored
/// - [`Error::TokenRejected`] if the endpoint answers with an error status
/// - [`Error::TokenResponse`] if a success response carries no usable token
/// - [`Error::TokenRefresh`] if the endpoint cannot be reached
#[instrument(name = "oauth::refresh", skip_all, fields(token_uri = %creds.token_uri))]
pub async fn refresh(
    http: &reqwest::Client,
    creds: &OAuthCredentials,
    now: DateTime<Utc>,
) -> Result<OAuthCredentials> {
    let refresh_token = creds
        .refresh_token
        .as_deref()
        .ok_or(Error::MissingRefreshToken)?;

    let params = [
        ("grant_type", "refresh_token"),
        ("client_id", creds.client_id.as_str()),
        ("client_secret", creds.client_secret.as_str()),
        ("refresh_token", refresh_token),
    ];
    let response = post_token_request(http, &creds.token_uri, &params).await?;

    let mut refreshed = creds.clone();
    refreshed.apply(response, now);

    info!(expiry = ?refreshed.token_expiry, "Access token refreshed");

    Ok(refreshed)
}

/// Builds the consent page URL for the one-time authorization step.
///
/// # Errors
///
/// Returns [`Error::InvalidConfig`] if the URL cannot be built.
pub fn consent_url(client_id: &str, redirect_uri: &str) -> Result<String> {
    Url::parse_with_params(
        GOOGLE_AUTH_URI,
        &[
            ("client_id", client_id),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("scope", GMAIL_IMAP_SCOPE),
            ("access_type", "offline"),
            ("prompt", "consent"),
        ],
    )
    .map(String::from)
    .map_err(|e| Error::InvalidConfig {
        message: format!("consent URL: {e}"),
    })
}

/// Exchanges an authorization code for a full credential.
///
/// # Errors
///
/// Returns [`Error::TokenRejected`], [`Error::TokenResponse`] or
/// [`Error::TokenRefresh`] as for [`refresh`].
#[instrument(name = "oauth::exchange_code", skip_all)]
pub async fn exchange_code(
    http: &reqwest::Client,
    client_id: &str,
    client_secret: &str,
    code: &str,
    redirect_uri: &str,
    now: DateTime<Utc>,
) -> Result<OAuthCredentials> {
    let params = [
        ("grant_type", "authorization_code"),
        ("client_id", client_id),
        ("client_secret", client_secret),
        ("code", code),
        ("redirect_uri", redirect_uri),
    ];
    let response = post_token_request(http, GOOGLE_TOKEN_URI, &params).await?;

    let mut creds = OAuthCredentials {
        access_token: None,
        client_id: client_id.to_string(),
        client_secret: client_secret.to_string(),
        refresh_token: None,
        token_expiry: None,
        token_uri: GOOGLE_TOKEN_URI.to_string(),
        user_agent: Some(env!("CARGO_PKG_NAME").to_string()),
    };
    creds.apply(response, now);

    if creds.refresh_token.is_none() {
        return Err(Error::MissingRefreshToken);
    }

    Ok(creds)
}

async fn post_token_request(
    http: &reqwest::Client,
    token_uri: &str,
    params: &[(&str, &str)],
) -> Result<TokenResponse> {
    let transport = |source| Error::TokenRefresh {
        token_uri: token_uri.to_string(),
        source,
    };

    let response = http
        .post(token_uri)
        .form(params)
        .send()
        .await
        .map_err(transport)?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::TokenRejected {
            status: status.as_u16(),
            body,
        });
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|source| {
            if source.is_decode() {
                Error::TokenResponse {
                    token_uri: token_uri.to_string(),
                    source,
                }
            } else {
                transport(source)
            }
        })
}

/// Loads and persists the credential for one [`CredentialSource`].
///
/// An inline source keeps refreshed tokens in memory for the life of the
/// process. A file source is rewritten after every refresh.
#[derive(Debug)]
pub struct CredentialStore {
    source: CredentialSource,
    cached: Mutex<Option<OAuthCredentials>>,
}

impl CredentialStore {
    /// Creates a store for `source`.
    #[must_use]
    pub fn new(source: CredentialSource) -> Self {
        Self {
            source,
            cached: Mutex::new(None),
        }
    }

    /// Returns the latest credential.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read or decoded.
    pub async fn load(&self) -> Result<OAuthCredentials> {
        if let Some(creds) = self.cached.lock().await.as_ref() {
            return Ok(creds.clone());
        }

        let creds = match &self.source {
            CredentialSource::Inline(blob) => OAuthCredentials::from_json(blob.expose_secret())?,
            CredentialSource::File(path) => {
                debug!(path = %path.display(), "Reading credential file");
                let json = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| Error::CredentialFile {
                        path: path.clone(),
                        source,
                    })?;
                OAuthCredentials::from_json(&json)?
            }
        };

        *self.cached.lock().await = Some(creds.clone());
        Ok(creds)
    }

    /// Records a refreshed credential.
    ///
    /// # Errors
    ///
    /// Returns an error if the credential file cannot be written.
    pub async fn save(&self, creds: &OAuthCredentials) -> Result<()> {
        if let CredentialSource::File(path) = &self.source {
            tokio::fs::write(path, creds.to_json()?)
                .await
                .map_err(|source| Error::CredentialFile {
                    path: path.clone(),
                    source,
                })?;
            debug!(path = %path.display(), "Credential file updated");
        }

        *self.cached.lock().await = Some(creds.clone());
        Ok(())
    }
}

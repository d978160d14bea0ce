//! Configuration for the effective-balance pipeline.
//!
//! The configuration is built once at process start and passed by value into
//! each component. Use [`AppConfigBuilder`] directly, or read the process
//! environment with [`AppConfig::from_env`]:
//!
//! ```
//! use effective_balance::AppConfig;
//!
//! let config = AppConfig::builder()
//!     .gmail_address("me@gmail.com")
//!     .credentials_file("token.json")
//!     .smtp_credentials("me@gmail.com", "app-password")
//!     .notify_to("me@gmail.com")
//!     .build()
//!     .expect("valid config");
//!
//! assert_eq!(config.schedule.recency_days, 2);
//! assert_eq!(config.bank_a.label, "SunTrust");
//! ```

use crate::error::{Error, Result};
use crate::query::BankAccount;
use crate::retry::RetryPolicy;
use email_address::EmailAddress;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_IMAP_HOST: &str = "imap.gmail.com";
const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";
const HOUR: Duration = Duration::from_secs(3600);
/// Longest accepted poll interval, one leap year.
const MAX_POLL_INTERVAL_HOURS: u64 = 24 * 366;

/// Complete configuration of one process.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Mailbox that receives the bank alerts.
    pub mail: MailConfig,
    /// Outbound notification channel.
    pub smtp: SmtpConfig,
    /// Bank whose balance is the minuend.
    pub bank_a: BankAccount,
    /// Bank whose balance is subtracted.
    pub bank_b: BankAccount,
    /// Recency window and poll cadence.
    pub schedule: ScheduleConfig,
    /// Per-call network timeouts.
    pub timeouts: TimeoutConfig,
    /// Retry policy for transient failures.
    pub retry: RetryPolicy,
}

/// Where the OAuth credential comes from.
#[derive(Clone)]
pub enum CredentialSource {
    /// A JSON credential blob, typically from `CREDENTIALS_JSON`.
    Inline(SecretString),
    /// A token file that is rewritten after every refresh.
    File(PathBuf),
}

impl std::fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialSource::Inline(_) => f.write_str("Inline([REDACTED])"),
            CredentialSource::File(path) => f.debug_tuple("File").field(path).finish(),
        }
    }
}

/// Mailbox connection settings.
#[derive(Debug, Clone)]
pub struct MailConfig {
    address: EmailAddress,
    /// IMAP server hostname.
    pub imap_host: String,
    /// IMAP server port (993 for IMAPS).
    pub imap_port: u16,
    /// OAuth credential source.
    pub credentials: CredentialSource,
}

impl MailConfig {
    /// Returns the mailbox address used as the XOAUTH2 user.
    #[must_use]
    pub fn address(&self) -> &str {
        self.address.as_str()
    }

    /// Returns the IMAP server address as "host:port".
    #[must_use]
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.imap_host, self.imap_port)
    }
}

/// How the SMTP connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpTls {
    /// Plain connection upgraded with STARTTLS (port 587).
    StartTls,
    /// TLS from the first byte (port 465).
    Implicit,
}

impl FromStr for SmtpTls {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "starttls" => Ok(SmtpTls::StartTls),
            "tls" | "implicit" => Ok(SmtpTls::Implicit),
            other => Err(Error::InvalidConfig {
                message: format!("unknown SMTP TLS mode '{other}'"),
            }),
        }
    }
}

/// SMTP submission settings.
///
/// The password is held as a [`SecretString`] and redacted from `Debug` output.
#[derive(Clone)]
pub struct SmtpConfig {
    /// SMTP relay hostname.
    pub host: String,
    /// SMTP relay port.
    pub port: u16,
    /// TLS mode.
    pub tls: SmtpTls,
    username: String,
    password: SecretString,
    from: EmailAddress,
    to: EmailAddress,
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("from", &self.from.as_str())
            .field("to", &self.to.as_str())
            .finish()
    }
}

impl SmtpConfig {
    /// Returns the SMTP login name.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns the SMTP password.
    #[must_use]
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }

    /// Returns the notification sender address.
    #[must_use]
    pub fn from(&self) -> &str {
        self.from.as_str()
    }

    /// Returns the notification recipient address.
    #[must_use]
    pub fn to(&self) -> &str {
        self.to.as_str()
    }
}

/// Recency window and poll cadence.
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// Only alerts newer than this many days are considered.
    pub recency_days: u32,
    /// Time between two pipeline runs.
    pub poll_interval: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            recency_days: 2,
            poll_interval: 23 * HOUR,
        }
    }
}

/// Timeout configuration for network calls.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Timeout for establishing TCP/TLS connection.
    pub connect: Duration,
    /// Timeout for IMAP authentication.
    pub auth: Duration,
    /// Timeout for opening the mailbox.
    pub select: Duration,
    /// Timeout for a search.
    pub search: Duration,
    /// Timeout for fetching one message.
    pub fetch: Duration,
    /// Timeout for logout.
    pub logout: Duration,
    /// Timeout for a token endpoint request.
    pub token_refresh: Duration,
    /// Timeout for submitting the notification.
    pub send: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            auth: Duration::from_secs(30),
            select: Duration::from_secs(10),
            search: Duration::from_secs(15),
            fetch: Duration::from_secs(30),
            logout: Duration::from_secs(5),
            token_refresh: Duration::from_secs(30),
            send: Duration::from_secs(30),
        }
    }
}

#[derive(Deserialize)]
struct SmtpLogin {
    username: String,
    password: String,
}

impl AppConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value is invalid.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name to its value.
    ///
    /// See the crate documentation for the recognized variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::builder();

        if let Some(address) = lookup("GMAIL_ADDRESS") {
            builder = builder.gmail_address(address);
        }
        if let Some(blob) = lookup("CREDENTIALS_JSON") {
            builder = builder.credentials_json(blob);
        } else if let Some(path) = lookup("CREDENTIALS_FILE") {
            builder = builder.credentials_file(path);
        }
        if let Some(host) = lookup("IMAP_HOST") {
            builder = builder.imap_host(host);
        }
        if let Some(port) = parse_var(&lookup, "IMAP_PORT")? {
            builder = builder.imap_port(port);
        }

        if let Some(json) = lookup("SMTP_LOGIN_JSON") {
            let login: SmtpLogin =
                serde_json::from_str(&json).map_err(|source| Error::CredentialFormat { source })?;
            builder = builder.smtp_credentials(login.username, login.password);
        } else if let (Some(username), Some(password)) =
            (lookup("SMTP_USERNAME"), lookup("SMTP_PASSWORD"))
        {
            builder = builder.smtp_credentials(username, password);
        }
        if let Some(host) = lookup("SMTP_HOST") {
            builder = builder.smtp_host(host);
        }
        if let Some(port) = parse_var(&lookup, "SMTP_PORT")? {
            builder = builder.smtp_port(port);
        }
        if let Some(tls) = parse_var(&lookup, "SMTP_TLS")? {
            builder = builder.smtp_tls(tls);
        }
        if let Some(to) = lookup("NOTIFY_TO") {
            builder = builder.notify_to(to);
        }
        if let Some(from) = lookup("NOTIFY_FROM") {
            builder = builder.notify_from(from);
        }

        let default_a = default_bank_a();
        builder = builder.bank_a(BankAccount::new(
            lookup("BANK_A_LABEL").unwrap_or(default_a.label),
            lookup("BANK_A_SENDER").unwrap_or(default_a.sender),
        ));
        let default_b = default_bank_b();
        builder = builder.bank_b(BankAccount::new(
            lookup("BANK_B_LABEL").unwrap_or(default_b.label),
            lookup("BANK_B_SENDER").unwrap_or(default_b.sender),
        ));

        if let Some(days) = parse_var(&lookup, "RECENCY_DAYS")? {
            builder = builder.recency_days(days);
        }
        if let Some(hours) = parse_var::<u64, _>(&lookup, "POLL_INTERVAL_HOURS")? {
            if hours > MAX_POLL_INTERVAL_HOURS {
                return Err(Error::InvalidConfig {
                    message: format!(
                        "POLL_INTERVAL_HOURS: {hours} exceeds {MAX_POLL_INTERVAL_HOURS}"
                    ),
                });
            }
            builder = builder.poll_interval(Duration::from_secs(hours * HOUR.as_secs()));
        }
        if let Some(attempts) = parse_var(&lookup, "RETRY_MAX_ATTEMPTS")? {
            builder = builder.retry(RetryPolicy {
                max_attempts: attempts,
                ..RetryPolicy::default()
            });
        }

        builder.build()
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim().parse().map_err(|e| Error::InvalidConfig {
                message: format!("{key}: {e}"),
            })
        })
        .transpose()
}

fn default_bank_a() -> BankAccount {
    BankAccount::new("SunTrust", "alertnotification@suntrust.com")
}

fn default_bank_b() -> BankAccount {
    BankAccount::new("Citi", "alerts@citibank.com")
}

/// Validates an email address format.
fn validate_email(email: &str) -> Result<EmailAddress> {
    EmailAddress::parse_with_options(email, email_address::Options::default()).map_err(|_| {
        Error::InvalidEmailFormat {
            email: email.to_string(),
        }
    })
}

fn required<T>(value: Option<T>, what: &str) -> Result<T> {
    value.ok_or_else(|| Error::InvalidConfig {
        message: format!("{what} is required"),
    })
}

/// Builder for [`AppConfig`].
#[derive(Debug, Default)]
pub struct AppConfigBuilder {
    gmail_address: Option<String>,
    credentials: Option<CredentialSource>,
    imap_host: Option<String>,
    imap_port: Option<u16>,
    smtp_host: Option<String>,
    smtp_port: Option<u16>,
    smtp_tls: Option<SmtpTls>,
    smtp_credentials: Option<(String, SecretString)>,
    notify_from: Option<String>,
    notify_to: Option<String>,
    bank_a: Option<BankAccount>,
    bank_b: Option<BankAccount>,
    schedule: Option<ScheduleConfig>,
    timeouts: Option<TimeoutConfig>,
    retry: Option<RetryPolicy>,
}

impl AppConfigBuilder {
    /// Sets the Gmail address whose inbox holds the alerts (required).
    #[must_use]
    pub fn gmail_address(mut self, address: impl Into<String>) -> Self {
        self.gmail_address = Some(address.into());
        self
    }

    /// Uses an inline OAuth credential JSON blob.
    #[must_use]
    pub fn credentials_json(mut self, blob: impl Into<String>) -> Self {
        self.credentials = Some(CredentialSource::Inline(SecretString::from(blob.into())));
        self
    }

    /// Uses a stored token file, refreshed in place.
    #[must_use]
    pub fn credentials_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials = Some(CredentialSource::File(path.into()));
        self
    }

    /// Sets the IMAP server hostname. Default is `imap.gmail.com`.
    #[must_use]
    pub fn imap_host(mut self, host: impl Into<String>) -> Self {
        self.imap_host = Some(host.into());
        self
    }

    /// Sets the IMAP server port. Default is 993.
    #[must_use]
    pub fn imap_port(mut self, port: u16) -> Self {
        self.imap_port = Some(port);
        self
    }

    /// Sets the SMTP relay hostname. Default is `smtp.gmail.com`.
    #[must_use]
    pub fn smtp_host(mut self, host: impl Into<String>) -> Self {
        self.smtp_host = Some(host.into());
        self
    }

    /// Sets the SMTP relay port. Default is 587 for STARTTLS and 465 for implicit TLS.
    #[must_use]
    pub fn smtp_port(mut self, port: u16) -> Self {
        self.smtp_port = Some(port);
        self
    }

    /// Sets the SMTP TLS mode. Default is STARTTLS.
    #[must_use]
    pub fn smtp_tls(mut self, tls: SmtpTls) -> Self {
        self.smtp_tls = Some(tls);
        self
    }

    /// Sets the SMTP login (required).
    #[must_use]
    pub fn smtp_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.smtp_credentials = Some((username.into(), SecretString::from(password.into())));
        self
    }

    /// Sets the notification sender. Defaults to the recipient.
    #[must_use]
    pub fn notify_from(mut self, address: impl Into<String>) -> Self {
        self.notify_from = Some(address.into());
        self
    }

    /// Sets the notification recipient (required).
    #[must_use]
    pub fn notify_to(mut self, address: impl Into<String>) -> Self {
        self.notify_to = Some(address.into());
        self
    }

    /// Sets the bank whose balance is the minuend.
    #[must_use]
    pub fn bank_a(mut self, bank: BankAccount) -> Self {
        self.bank_a = Some(bank);
        self
    }

    /// Sets the bank whose balance is subtracted.
    #[must_use]
    pub fn bank_b(mut self, bank: BankAccount) -> Self {
        self.bank_b = Some(bank);
        self
    }

    /// Sets the recency window in days.
    #[must_use]
    pub fn recency_days(mut self, days: u32) -> Self {
        self.schedule
            .get_or_insert_with(ScheduleConfig::default)
            .recency_days = days;
        self
    }

    /// Sets the time between pipeline runs.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.schedule
            .get_or_insert_with(ScheduleConfig::default)
            .poll_interval = interval;
        self
    }

    /// Sets timeout configuration.
    #[must_use]
    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if required fields are missing or invalid.
    pub fn build(self) -> Result<AppConfig> {
        let address = validate_email(&required(self.gmail_address, "Gmail address")?)?;
        let credentials = required(self.credentials, "OAuth credentials")?;
        let (username, password) = required(self.smtp_credentials, "SMTP login")?;
        let to_raw = required(self.notify_to, "notification recipient")?;
        let to = validate_email(&to_raw)?;
        let from = match self.notify_from {
            Some(from) => validate_email(&from)?,
            None => to.clone(),
        };

        let schedule = self.schedule.unwrap_or_default();
        if schedule.recency_days == 0 {
            return Err(Error::InvalidConfig {
                message: "recency window must be at least one day".into(),
            });
        }
        if schedule.poll_interval.is_zero() {
            return Err(Error::InvalidConfig {
                message: "poll interval must be positive".into(),
            });
        }
        if schedule.poll_interval > Duration::from_secs(MAX_POLL_INTERVAL_HOURS * HOUR.as_secs()) {
            return Err(Error::InvalidConfig {
                message: format!("poll interval must be at most {MAX_POLL_INTERVAL_HOURS} hours"),
            });
        }

        let retry = self.retry.unwrap_or_default();
        if retry.max_attempts == 0 {
            return Err(Error::InvalidConfig {
                message: "retry attempts must be at least 1".into(),
            });
        }

        let tls = self.smtp_tls.unwrap_or(SmtpTls::StartTls);
        let default_smtp_port = match tls {
            SmtpTls::StartTls => 587,
            SmtpTls::Implicit => 465,
        };

        Ok(AppConfig {
            mail: MailConfig {
                address,
                imap_host: self
                    .imap_host
                    .unwrap_or_else(|| DEFAULT_IMAP_HOST.to_string()),
                imap_port: self.imap_port.unwrap_or(993),
                credentials,
            },
            smtp: SmtpConfig {
                host: self
                    .smtp_host
                    .unwrap_or_else(|| DEFAULT_SMTP_HOST.to_string()),
                port: self.smtp_port.unwrap_or(default_smtp_port),
                tls,
                username,
                password,
                from,
                to,
            },
            bank_a: self.bank_a.unwrap_or_else(default_bank_a),
            bank_b: self.bank_b.unwrap_or_else(default_bank_b),
            schedule,
            timeouts: self.timeouts.unwrap_or_default(),
            retry,
        })
    }
}

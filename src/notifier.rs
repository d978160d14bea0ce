//! Outbound notification of the effective balance.
//!
//! The pipeline talks to a [`Notifier`]; [`SmtpNotifier`] submits through an
//! authenticated SMTP relay (Gmail, or Amazon SES through its SMTP endpoint).

use crate::balance::EffectiveBalance;
use crate::config::{SmtpConfig, SmtpTls, TimeoutConfig};
use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;
use tracing::{info, instrument};

/// A one-line report: subject and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

impl Notification {
    /// The report for `balance`; subject and body are both `Effective Balance: $<value>`.
    ///
    /// ```
    /// use effective_balance::{EffectiveBalance, Notification};
    /// use rust_decimal::Decimal;
    ///
    /// let n = Notification::effective_balance(EffectiveBalance::from(Decimal::new(-155, 1)));
    /// assert_eq!(n.body, "Effective Balance: $-15.5");
    /// assert_eq!(n.subject, n.body);
    /// ```
    #[must_use]
    pub fn effective_balance(balance: EffectiveBalance) -> Self {
        let line = format!("Effective Balance: ${balance}");
        Self {
            subject: line.clone(),
            body: line,
        }
    }
}

/// Delivery channel for notifications.
#[allow(async_fn_in_trait)]
pub trait Notifier {
    /// Sends one notification.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be built or delivered.
    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// Sends the report for `balance`, retrying transient failures under `retry`.
///
/// # Errors
///
/// Returns the last delivery error once retries are exhausted or on a permanent failure.
#[instrument(name = "notifier::notify", skip(notifier, retry), fields(balance = %balance))]
pub async fn notify<N: Notifier>(
    notifier: &N,
    balance: EffectiveBalance,
    retry: &RetryPolicy,
) -> Result<()> {
    let notification = Notification::effective_balance(balance);

    let mut attempt = 1;
    loop {
        match notifier.send(&notification).await {
            Ok(()) => {
                info!(subject = %notification.subject, "Email sent");
                return Ok(());
            }
            Err(e) if retry.should_retry(&e, attempt) => {
                retry.pause("send", attempt, &e).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// SMTP-backed [`Notifier`].
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    host: String,
    from: Address,
    to: Address,
    send_timeout: Duration,
}

impl SmtpNotifier {
    /// Creates a notifier for the configured relay and addresses.
    ///
    /// No connection is made until the first send.
    ///
    /// # Errors
    ///
    /// Returns an error if the relay host or an address is invalid.
    pub fn new(smtp: &SmtpConfig, timeouts: &TimeoutConfig) -> Result<Self> {
        let builder = match smtp.tls {
            SmtpTls::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host),
            SmtpTls::Implicit => AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host),
        }
        .map_err(|source| Error::SmtpSend {
            host: smtp.host.clone(),
            source,
        })?;

        let transport = builder
            .port(smtp.port)
            .credentials(Credentials::new(
                smtp.username().to_string(),
                smtp.password().to_string(),
            ))
            .timeout(Some(timeouts.send))
            .build();

        Ok(Self {
            transport,
            host: smtp.host.clone(),
            from: parse_address(smtp.from())?,
            to: parse_address(smtp.to())?,
            send_timeout: timeouts.send,
        })
    }

    fn message(&self, notification: &Notification) -> Result<Message> {
        Message::builder()
            .from(self.from.clone().into())
            .to(self.to.clone().into())
            .subject(notification.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(notification.body.clone())
            .map_err(|source| Error::InvalidMessage { source })
    }
}

impl Notifier for SmtpNotifier {
    #[instrument(name = "SmtpNotifier::send", skip_all, fields(host = %self.host, to = %self.to))]
    async fn send(&self, notification: &Notification) -> Result<()> {
        let message = self.message(notification)?;

        tokio::time::timeout(self.send_timeout, self.transport.send(message))
            .await
            .map_err(|_| Error::SendTimeout {
                timeout: self.send_timeout,
            })?
            .map_err(|source| Error::SmtpSend {
                host: self.host.clone(),
                source,
            })?;

        Ok(())
    }
}

impl std::fmt::Debug for SmtpNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpNotifier")
            .field("host", &self.host)
            .field("from", &self.from)
            .field("to", &self.to)
            .finish_non_exhaustive()
    }
}

fn parse_address(address: &str) -> Result<Address> {
    address
        .parse::<Address>()
        .map_err(|_| Error::InvalidEmailFormat {
            email: address.to_string(),
        })
}

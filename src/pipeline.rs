//! One end-to-end run and the periodic driver around it.
//!
//! A run opens one mailbox session, extracts both balances over it, closes it,
//! subtracts and sends the report. A retryable extraction failure is retried
//! on a new session; a session whose command was cut off is dropped without
//! another command. The periodic driver starts a run right away
//! and then once per poll interval until told to stop.

use crate::balance::{aggregate, Balance, EffectiveBalance};
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::extractor;
use crate::mailbox::{Mailbox, SessionProvider};
use crate::matcher::{DollarAmountMatcher, Matcher};
use crate::notifier::{self, Notifier};
use crate::query::BankAccount;
use crate::retry::RetryPolicy;
use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, instrument, warn};

/// What the pipeline needs from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Bank whose balance is the minuend.
    pub bank_a: BankAccount,
    /// Bank whose balance is subtracted.
    pub bank_b: BankAccount,
    /// Only alerts newer than this many days are considered.
    pub recency_days: u32,
    /// Time between two runs.
    pub poll_interval: Duration,
    /// Retry policy for extraction (per session) and send.
    pub retry: RetryPolicy,
}

impl From<&AppConfig> for PipelineSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            bank_a: config.bank_a.clone(),
            bank_b: config.bank_b.clone(),
            recency_days: config.schedule.recency_days,
            poll_interval: config.schedule.poll_interval,
            retry: config.retry.clone(),
        }
    }
}

/// Result of a run that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The effective balance was computed and the report sent.
    Sent(EffectiveBalance),
    /// A bank had no alert in the recency window; nothing was sent.
    Skipped {
        /// Label of the bank without a recent alert.
        sender_label: String,
    },
}

/// Extract, aggregate and notify, wired to a session provider and a notifier.
///
/// # Example
///
/// ```no_run
/// use effective_balance::{AppConfig, GmailSessionProvider, Pipeline, SmtpNotifier};
///
/// # async fn example() -> effective_balance::Result<()> {
/// let config = AppConfig::from_env()?;
/// let provider = GmailSessionProvider::new(&config)?;
/// let notifier = SmtpNotifier::new(&config.smtp, &config.timeouts)?;
///
/// let pipeline = Pipeline::new(provider, notifier, (&config).into());
/// pipeline.run_periodic(tokio::signal::ctrl_c()).await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Pipeline<P, N> {
    provider: P,
    notifier: N,
    matcher: DollarAmountMatcher,
    settings: PipelineSettings,
}

impl<P, N> Pipeline<P, N>
where
    P: SessionProvider,
    N: Notifier,
{
    /// Creates a pipeline.
    pub fn new(provider: P, notifier: N, settings: PipelineSettings) -> Self {
        Self {
            provider,
            notifier,
            matcher: DollarAmountMatcher::new(),
            settings,
        }
    }

    /// Returns the settings this pipeline runs with.
    #[must_use]
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Performs one run.
    ///
    /// A bank with no recent alert is not an error: the run ends with
    /// [`RunOutcome::Skipped`] and nothing is sent.
    ///
    /// # Errors
    ///
    /// Returns the session or extraction error that outlived the retry
    /// policy, or the notification error. Logout failures are only logged.
    #[instrument(name = "Pipeline::run_once", skip(self))]
    pub async fn run_once(&self) -> Result<RunOutcome> {
        let (balance_a, balance_b) = match self.extract_with_retry().await {
            Ok(balances) => balances,
            Err(Error::NoMatchingMessages { sender_label }) => {
                info!(bank = %sender_label, "No recent alert, skipping run");
                return Ok(RunOutcome::Skipped { sender_label });
            }
            Err(e) => return Err(e),
        };

        let effective = aggregate(balance_a, balance_b);
        info!(
            balance_a = %balance_a,
            balance_b = %balance_b,
            effective = %effective,
            "Computed effective balance"
        );

        notifier::notify(&self.notifier, effective, &self.settings.retry).await?;

        Ok(RunOutcome::Sent(effective))
    }

    async fn extract_with_retry(&self) -> Result<(Balance, Balance)> {
        let retry = &self.settings.retry;
        let mut attempt = 1;
        loop {
            match self.extract_in_new_session().await {
                Err(e) if retry.should_retry(&e, attempt) => {
                    retry.pause("extract", attempt, &e).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn extract_in_new_session(&self) -> Result<(Balance, Balance)> {
        let mut session = self.provider.get_session().await?;

        let extracted = self.extract_both(&mut session).await;

        match &extracted {
            // Unread responses would be taken as the reply to LOGOUT
            Err(e) if e.breaks_session() => {
                warn!(error = %e, "Abandoning session after interrupted command");
            }
            _ => {
                if let Err(e) = session.logout().await {
                    warn!(error = %e, "Logout failed");
                }
            }
        }

        extracted
    }

    async fn extract_both(&self, session: &mut P::Session) -> Result<(Balance, Balance)> {
        let settings = &self.settings;
        let matcher: &dyn Matcher = &self.matcher;

        let query_a = settings.bank_a.query(settings.recency_days);
        let balance_a = extractor::extract(session, &settings.bank_a, &query_a, matcher).await?;

        let query_b = settings.bank_b.query(settings.recency_days);
        let balance_b = extractor::extract(session, &settings.bank_b, &query_b, matcher).await?;

        Ok((balance_a, balance_b))
    }

    /// Runs immediately, then once per poll interval, until `shutdown` resolves.
    ///
    /// Runs never overlap. A run that outlasts the interval delays the next
    /// one rather than queueing extra runs. Failed runs are logged and the
    /// schedule continues.
    #[instrument(
        name = "Pipeline::run_periodic",
        skip_all,
        fields(interval_secs = self.settings.poll_interval.as_secs())
    )]
    pub async fn run_periodic<F>(&self, shutdown: F)
    where
        F: Future,
    {
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping scheduler");
                    return;
                }
                _ = ticker.tick() => {}
            }

            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested during run, stopping scheduler");
                    return;
                }
                result = self.run_once() => log_outcome(&result),
            }
        }
    }
}

fn log_outcome(result: &Result<RunOutcome>) {
    match result {
        Ok(RunOutcome::Sent(balance)) => info!(effective = %balance, "Run complete"),
        Ok(RunOutcome::Skipped { sender_label }) => {
            info!(bank = %sender_label, "Run skipped");
        }
        Err(e) => error!(
            error = %e,
            category = %e.category(),
            retryable = e.is_retryable(),
            "Run failed"
        ),
    }
}

//! End-to-end pipeline tests with an in-memory mailbox and notifier.

use chrono::{DateTime, TimeZone, Utc};
use effective_balance::{
    BankAccount, Error, Mailbox, MessageDetail, MessageId, MessageSummary, Notification, Notifier,
    Pipeline, PipelineSettings, Query, Result, RetryPolicy, RunOutcome, SessionProvider,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

const SUNTRUST: &str = "alertnotification@suntrust.com";
const CITI: &str = "alerts@citibank.com";
const HOUR: Duration = Duration::from_secs(3600);

// ─────────────────────────────────────────────────────────────────────────────
// Fakes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Inbox {
    by_sender: HashMap<String, Vec<MessageDetail>>,
    sessions: u32,
    logouts: u32,
    active: u32,
    max_active: u32,
    run_starts: Vec<Instant>,
    fail_sessions: u32,
    fail_logout: bool,
    session_delay: Duration,
    search_timeouts: u32,
    commands: Vec<(u32, &'static str)>,
}

impl Inbox {
    fn commands_of(&self, session: u32) -> Vec<&'static str> {
        self.commands
            .iter()
            .filter(|(id, _)| *id == session)
            .map(|(_, command)| *command)
            .collect()
    }
}

#[derive(Clone, Default)]
struct FakeProvider {
    inbox: Arc<Mutex<Inbox>>,
}

impl FakeProvider {
    fn alert(self, sender: &str, uid: u32, snippet: &str, hour: u32) -> Self {
        let detail = MessageDetail {
            id: MessageId(uid),
            snippet: snippet.to_string(),
            internal_date: at(hour),
        };
        self.inbox
            .lock()
            .unwrap()
            .by_sender
            .entry(sender.to_string())
            .or_default()
            .push(detail);
        self
    }

    fn inbox(&self) -> std::sync::MutexGuard<'_, Inbox> {
        self.inbox.lock().unwrap()
    }
}

struct FakeSession {
    id: u32,
    inbox: Arc<Mutex<Inbox>>,
}

impl SessionProvider for FakeProvider {
    type Session = FakeSession;

    async fn get_session(&self) -> Result<FakeSession> {
        let (id, delay) = {
            let mut inbox = self.inbox();
            inbox.run_starts.push(Instant::now());
            if inbox.fail_sessions > 0 {
                inbox.fail_sessions -= 1;
                return Err(Error::MissingRefreshToken);
            }
            inbox.sessions += 1;
            inbox.active += 1;
            inbox.max_active = inbox.max_active.max(inbox.active);
            (inbox.sessions, inbox.session_delay)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(FakeSession {
            id,
            inbox: Arc::clone(&self.inbox),
        })
    }
}

impl Mailbox for FakeSession {
    async fn search(&mut self, query: &Query) -> Result<Vec<MessageSummary>> {
        let mut inbox = self.inbox.lock().unwrap();
        inbox.commands.push((self.id, "search"));
        if inbox.search_timeouts > 0 {
            inbox.search_timeouts -= 1;
            return Err(Error::SearchTimeout {
                query: query.to_string(),
                timeout: Duration::from_secs(15),
            });
        }
        Ok(inbox
            .by_sender
            .get(query.sender())
            .map(|alerts| {
                alerts
                    .iter()
                    .map(|detail| MessageSummary { id: detail.id })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn fetch(&mut self, id: MessageId) -> Result<MessageDetail> {
        let mut inbox = self.inbox.lock().unwrap();
        inbox.commands.push((self.id, "fetch"));
        inbox
            .by_sender
            .values()
            .flatten()
            .find(|detail| detail.id == id)
            .cloned()
            .ok_or(Error::MessageMissing { uid: id.0 })
    }

    async fn logout(&mut self) -> Result<()> {
        let mut inbox = self.inbox.lock().unwrap();
        inbox.commands.push((self.id, "logout"));
        inbox.logouts += 1;
        inbox.active -= 1;
        if inbox.fail_logout {
            return Err(Error::LogoutTimeout {
                timeout: Duration::from_secs(5),
            });
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
struct FakeNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
    reject: bool,
}

impl FakeNotifier {
    fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for FakeNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        if self.reject {
            return Err(Error::InvalidEmailFormat {
                email: "nobody".into(),
            });
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
}

fn settings(poll_interval: Duration) -> PipelineSettings {
    PipelineSettings {
        bank_a: BankAccount::new("SunTrust", SUNTRUST),
        bank_b: BankAccount::new("Citi", CITI),
        recency_days: 2,
        poll_interval,
        retry: RetryPolicy::none(),
    }
}

fn both_banks() -> FakeProvider {
    FakeProvider::default()
        .alert(SUNTRUST, 10, "Your available balance is $200.00", 9)
        .alert(CITI, 20, "Current balance: $75.25 as of 03/01", 10)
}

// ─────────────────────────────────────────────────────────────────────────────
// Single Run Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_run_once_sends_effective_balance() {
    let provider = both_banks();
    let notifier = FakeNotifier::default();
    let pipeline = Pipeline::new(provider.clone(), notifier.clone(), settings(HOUR));

    let outcome = pipeline.run_once().await.unwrap();

    match outcome {
        RunOutcome::Sent(balance) => assert_eq!(balance.to_string(), "124.75"),
        other => panic!("unexpected outcome: {other:?}"),
    }

    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "Effective Balance: $124.75");
    assert_eq!(sent[0].body, "Effective Balance: $124.75");

    let inbox = provider.inbox();
    assert_eq!(inbox.sessions, 1);
    assert_eq!(inbox.logouts, 1);
}

#[tokio::test]
async fn test_run_once_uses_newest_alert() {
    let provider = both_banks()
        .alert(SUNTRUST, 11, "Your available balance is $500.00", 12)
        .alert(SUNTRUST, 9, "Your available balance is $1.00", 3);
    let notifier = FakeNotifier::default();
    let pipeline = Pipeline::new(provider, notifier.clone(), settings(HOUR));

    pipeline.run_once().await.unwrap();

    assert_eq!(notifier.sent()[0].body, "Effective Balance: $424.75");
}

#[tokio::test]
async fn test_negative_effective_balance() {
    let provider = FakeProvider::default()
        .alert(SUNTRUST, 1, "Balance $40.00", 9)
        .alert(CITI, 2, "Balance $100.00", 9);
    let notifier = FakeNotifier::default();
    let pipeline = Pipeline::new(provider, notifier.clone(), settings(HOUR));

    pipeline.run_once().await.unwrap();

    assert_eq!(notifier.sent()[0].body, "Effective Balance: $-60.00");
}

#[tokio::test]
async fn test_missing_alert_skips_without_sending() {
    let provider = FakeProvider::default().alert(SUNTRUST, 1, "Balance $40.00", 9);
    let notifier = FakeNotifier::default();
    let pipeline = Pipeline::new(provider.clone(), notifier.clone(), settings(HOUR));

    let outcome = pipeline.run_once().await.unwrap();

    assert_eq!(
        outcome,
        RunOutcome::Skipped {
            sender_label: "Citi".into()
        }
    );
    assert!(notifier.sent().is_empty());
    assert_eq!(provider.inbox().logouts, 1);
}

#[tokio::test]
async fn test_unparseable_snippet_fails_run() {
    let provider = FakeProvider::default()
        .alert(SUNTRUST, 1, "Your statement is ready", 9)
        .alert(CITI, 2, "Balance $100.00", 9);
    let notifier = FakeNotifier::default();
    let pipeline = Pipeline::new(provider.clone(), notifier.clone(), settings(HOUR));

    let err = pipeline.run_once().await.unwrap_err();

    assert!(matches!(err, Error::ExtractionFailure { ref sender_label, .. } if sender_label == "SunTrust"));
    assert!(notifier.sent().is_empty());
    assert_eq!(provider.inbox().logouts, 1);
}

#[tokio::test]
async fn test_logout_failure_does_not_fail_run() {
    let provider = both_banks();
    provider.inbox().fail_logout = true;
    let notifier = FakeNotifier::default();
    let pipeline = Pipeline::new(provider, notifier.clone(), settings(HOUR));

    let outcome = pipeline.run_once().await.unwrap();

    assert!(matches!(outcome, RunOutcome::Sent(_)));
    assert_eq!(notifier.sent().len(), 1);
}

#[tokio::test]
async fn test_send_failure_fails_run() {
    let notifier = FakeNotifier {
        reject: true,
        ..FakeNotifier::default()
    };
    let pipeline = Pipeline::new(both_banks(), notifier, settings(HOUR));

    let err = pipeline.run_once().await.unwrap_err();

    assert!(matches!(err, Error::InvalidEmailFormat { .. }));
}

#[tokio::test]
async fn test_session_failure_fails_run() {
    let provider = both_banks();
    provider.inbox().fail_sessions = 1;
    let notifier = FakeNotifier::default();
    let pipeline = Pipeline::new(provider, notifier.clone(), settings(HOUR));

    let err = pipeline.run_once().await.unwrap_err();

    assert!(matches!(err, Error::MissingRefreshToken));
    assert!(notifier.sent().is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// Interrupted Command Tests
// ─────────────────────────────────────────────────────────────────────────────

fn retrying(poll_interval: Duration) -> PipelineSettings {
    PipelineSettings {
        retry: RetryPolicy::default(),
        ..settings(poll_interval)
    }
}

#[tokio::test(start_paused = true)]
async fn test_search_timeout_retried_on_new_session() {
    let provider = both_banks();
    provider.inbox().search_timeouts = 1;
    let notifier = FakeNotifier::default();
    let pipeline = Pipeline::new(provider.clone(), notifier.clone(), retrying(HOUR));

    let outcome = pipeline.run_once().await.unwrap();

    assert!(matches!(outcome, RunOutcome::Sent(_)));
    assert_eq!(notifier.sent().len(), 1);

    let inbox = provider.inbox();
    assert_eq!(inbox.sessions, 2);
    // The timed-out session gets nothing after the search, not even LOGOUT
    assert_eq!(inbox.commands_of(1), vec!["search"]);
    assert_eq!(
        inbox.commands_of(2),
        vec!["search", "fetch", "search", "fetch", "logout"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_repeated_timeouts_exhaust_retries() {
    let provider = both_banks();
    provider.inbox().search_timeouts = 10;
    let notifier = FakeNotifier::default();
    let pipeline = Pipeline::new(provider.clone(), notifier.clone(), retrying(HOUR));

    let err = pipeline.run_once().await.unwrap_err();

    assert!(matches!(err, Error::SearchTimeout { .. }));
    assert!(notifier.sent().is_empty());

    let inbox = provider.inbox();
    assert_eq!(inbox.sessions, 3);
    assert_eq!(inbox.logouts, 0);
    for session in 1..=3 {
        assert_eq!(inbox.commands_of(session), vec!["search"]);
    }
}

#[tokio::test(start_paused = true)]
async fn test_non_retryable_failure_not_retried() {
    let provider = FakeProvider::default()
        .alert(SUNTRUST, 1, "Your statement is ready", 9)
        .alert(CITI, 2, "Balance $100.00", 9);
    let pipeline = Pipeline::new(provider.clone(), FakeNotifier::default(), retrying(HOUR));

    let err = pipeline.run_once().await.unwrap_err();

    assert!(matches!(err, Error::ExtractionFailure { .. }));
    let inbox = provider.inbox();
    assert_eq!(inbox.sessions, 1);
    assert_eq!(inbox.commands_of(1), vec!["search", "fetch", "logout"]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Periodic Driver Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_periodic_runs_immediately_then_every_interval() {
    let provider = both_banks();
    let notifier = FakeNotifier::default();
    let pipeline = Pipeline::new(provider.clone(), notifier.clone(), settings(HOUR));
    let started = Instant::now();

    pipeline
        .run_periodic(tokio::time::sleep(HOUR * 2 + HOUR / 2))
        .await;

    let inbox = provider.inbox();
    assert_eq!(inbox.run_starts.len(), 3);
    assert_eq!(inbox.run_starts[0], started);
    for pair in inbox.run_starts.windows(2) {
        assert!(pair[1] - pair[0] >= HOUR);
    }
    assert_eq!(notifier.sent().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_periodic_runs_never_overlap() {
    let provider = both_banks();
    provider.inbox().session_delay = HOUR + HOUR / 2;
    let notifier = FakeNotifier::default();
    let pipeline = Pipeline::new(provider.clone(), notifier.clone(), settings(HOUR));

    pipeline.run_periodic(tokio::time::sleep(HOUR * 4)).await;

    let inbox = provider.inbox();
    assert_eq!(inbox.max_active, 1);
    assert!(inbox.run_starts.len() >= 2);
    for pair in inbox.run_starts.windows(2) {
        assert!(pair[1] - pair[0] >= HOUR + HOUR / 2);
    }
}

#[tokio::test(start_paused = true)]
async fn test_periodic_continues_after_failed_run() {
    let provider = both_banks();
    provider.inbox().fail_sessions = 1;
    let notifier = FakeNotifier::default();
    let pipeline = Pipeline::new(provider.clone(), notifier.clone(), settings(HOUR));

    pipeline
        .run_periodic(tokio::time::sleep(HOUR + HOUR / 2))
        .await;

    assert_eq!(provider.inbox().run_starts.len(), 2);
    assert_eq!(notifier.sent().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_periodic_stops_on_shutdown() {
    let provider = both_banks();
    let notifier = FakeNotifier::default();
    let pipeline = Pipeline::new(provider.clone(), notifier, settings(HOUR * 23));

    let started = Instant::now();
    pipeline.run_periodic(tokio::time::sleep(HOUR)).await;

    assert_eq!(provider.inbox().run_starts.len(), 1);
    assert!(Instant::now() - started < HOUR * 23);
}

//! Balance extraction: newest matching alert, first dollar amount in its snippet.

use crate::balance::Balance;
use crate::error::{Error, Result};
use crate::mailbox::{Mailbox, MessageDetail};
use crate::matcher::Matcher;
use crate::query::{BankAccount, Query};
use tracing::{debug, info, instrument};

/// Reads the current balance of `bank` from its newest alert matching `query`.
///
/// Every hit is fetched and the one with the latest internal date wins; on a
/// tie the higher message id is taken. The first amount the matcher finds in
/// that snippet is the balance.
///
/// Mailbox errors are returned as soon as they happen, with no further
/// command on `mailbox`. A timed-out command leaves its responses unread, so
/// retrying belongs to the caller, on a new session.
///
/// # Errors
///
/// - [`Error::NoMatchingMessages`] if the search returns nothing
/// - [`Error::ExtractionFailure`] if the newest snippet has no amount
/// - [`Error::InvalidAmount`] if the matched text is not a number
/// - the first mailbox error
#[instrument(
    name = "Extractor::extract",
    skip(mailbox, matcher),
    fields(bank = %bank.label, query = %query, matcher = matcher.description())
)]
pub async fn extract<M: Mailbox>(
    mailbox: &mut M,
    bank: &BankAccount,
    query: &Query,
    matcher: &dyn Matcher,
) -> Result<Balance> {
    let hits = mailbox.search(query).await?;
    if hits.is_empty() {
        return Err(Error::NoMatchingMessages {
            sender_label: bank.label.clone(),
        });
    }

    debug!(count = hits.len(), "Search returned messages");

    let mut newest: Option<MessageDetail> = None;
    for hit in hits {
        let detail = mailbox.fetch(hit.id).await?;
        let replace = match &newest {
            Some(current) => {
                (detail.internal_date, detail.id) > (current.internal_date, current.id)
            }
            None => true,
        };
        if replace {
            newest = Some(detail);
        }
    }

    let Some(newest) = newest else {
        return Err(Error::NoMatchingMessages {
            sender_label: bank.label.clone(),
        });
    };

    debug!(uid = newest.id.0, internal_date = %newest.internal_date, "Selected newest alert");

    let raw = matcher
        .find_match(&newest.snippet)
        .ok_or_else(|| Error::ExtractionFailure {
            sender_label: bank.label.clone(),
            snippet: newest.snippet.clone(),
        })?;

    let balance = Balance::parse(&raw)?;
    info!(bank = %bank.label, balance = %balance, "Extracted balance");
    Ok(balance)
}

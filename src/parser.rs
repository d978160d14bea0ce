//! Internal module for turning fetched messages into snippets.

use crate::error::{Error, Result};
use crate::mailbox::{MessageDetail, MessageId};
use chrono::{DateTime, TimeZone, Utc};
use mailparse::{parse_mail, MailHeaderMap, ParsedMail};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

/// Length of a Gmail API snippet, in characters.
pub(crate) const SNIPPET_LEN: usize = 200;

static STYLE_OR_SCRIPT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(style|script)\b.*?</(style|script)\s*>").expect("valid regex"));
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));

/// Builds a [`MessageDetail`] from an IMAP fetch of `(INTERNALDATE BODY.PEEK[])`.
pub(crate) fn detail_from_fetch(message: &async_imap::types::Fetch) -> Result<MessageDetail> {
    let uid = message.uid.unwrap_or_default();

    let Some(body) = message.body() else {
        debug!(uid, "Message has no body");
        return Err(Error::MessageMissing { uid });
    };

    let parsed = parse_mail(body).map_err(|source| Error::ParseEmail { uid, source })?;
    let snippet = snippet(&parsed).map_err(|source| Error::ParseEmail { uid, source })?;

    let internal_date = match message.internal_date() {
        Some(date) => date.with_timezone(&Utc),
        None => {
            warn!(uid, "Server sent no INTERNALDATE, falling back to Date header");
            header_date(&parsed)
        }
    };

    Ok(MessageDetail {
        id: MessageId(uid),
        snippet,
        internal_date,
    })
}

/// Plain-text excerpt of a message: whitespace collapsed, at most [`SNIPPET_LEN`] chars.
pub(crate) fn snippet(parsed: &ParsedMail<'_>) -> std::result::Result<String, mailparse::MailParseError> {
    let (text, is_html) = extract_body_text(parsed)?;
    let text = if is_html { strip_html(&text) } else { text };

    Ok(text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(SNIPPET_LEN)
        .collect())
}

/// Extracts text content, preferring `text/plain` over `text/html` in multipart messages.
fn extract_body_text(
    parsed: &ParsedMail<'_>,
) -> std::result::Result<(String, bool), mailparse::MailParseError> {
    if parsed.subparts.is_empty() {
        let is_html = parsed.ctype.mimetype.eq_ignore_ascii_case("text/html");
        return Ok((parsed.get_body()?, is_html));
    }

    if let Some(plain) = find_part(parsed, "text/plain") {
        return Ok((plain.get_body()?, false));
    }
    if let Some(html) = find_part(parsed, "text/html") {
        return Ok((html.get_body()?, true));
    }

    extract_body_text(&parsed.subparts[0])
}

/// Depth-first search for the first part with the given MIME type.
fn find_part<'a, 'b>(parsed: &'a ParsedMail<'b>, mimetype: &str) -> Option<&'a ParsedMail<'b>> {
    if parsed.ctype.mimetype.eq_ignore_ascii_case(mimetype) {
        return Some(parsed);
    }
    parsed
        .subparts
        .iter()
        .find_map(|part| find_part(part, mimetype))
}

fn strip_html(html: &str) -> String {
    let without_blocks = STYLE_OR_SCRIPT.replace_all(html, " ");
    let text = TAG.replace_all(&without_blocks, " ");

    text.replace("&nbsp;", " ")
        .replace("&#36;", "$")
        .replace("&#x24;", "$")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn header_date(parsed: &ParsedMail<'_>) -> DateTime<Utc> {
    parsed
        .headers
        .get_first_value("Date")
        .and_then(|value| mailparse::dateparse(&value).ok())
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

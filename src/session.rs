//! Internal IMAP session management.
//!
//! This module wraps async-imap operations with proper error handling. The
//! mailbox is opened with `EXAMINE` and bodies are fetched with `BODY.PEEK[]`,
//! so nothing in here changes mailbox state.

use crate::connection::TlsStream;
use crate::error::{Error, Result};
use crate::mailbox::MessageDetail;
use crate::parser;
use async_imap::Session;
use futures::StreamExt;
use tracing::{debug, instrument};

/// Type alias for IMAP session over TLS.
pub(crate) type ImapSession = Session<TlsStream>;

/// SASL `XOAUTH2` initial response.
struct XOAuth2<'a> {
    user: &'a str,
    access_token: &'a str,
    sent: bool,
}

impl async_imap::Authenticator for XOAuth2<'_> {
    type Response = String;

    fn process(&mut self, _challenge: &[u8]) -> Self::Response {
        // A second challenge carries the error details; the server expects an empty reply.
        if self.sent {
            return String::new();
        }
        self.sent = true;
        format!(
            "user={}\x01auth=Bearer {}\x01\x01",
            self.user, self.access_token
        )
    }
}

/// Authenticates with an OAuth2 access token and returns a session.
#[instrument(name = "session::authenticate", skip_all, fields(email = %user))]
pub(crate) async fn authenticate(
    tls_stream: TlsStream,
    user: &str,
    access_token: &str,
) -> Result<ImapSession> {
    let client = async_imap::Client::new(tls_stream);

    debug!("Authenticating with XOAUTH2");

    let authenticator = XOAuth2 {
        user,
        access_token,
        sent: false,
    };

    client
        .authenticate("XOAUTH2", authenticator)
        .await
        .map_err(|e| Error::ImapLogin {
            email: user.to_string(),
            source: e.0,
        })
}

/// Opens a mailbox read-only.
#[instrument(name = "session::examine", skip(session), fields(mailbox = %mailbox))]
pub(crate) async fn examine_mailbox(session: &mut ImapSession, mailbox: &str) -> Result<()> {
    session
        .examine(mailbox)
        .await
        .map_err(|source| Error::ExamineMailbox {
            mailbox: mailbox.to_string(),
            source,
        })?;

    Ok(())
}

/// Runs a Gmail search (`X-GM-RAW`) and returns the matching UIDs in ascending order.
#[instrument(name = "session::search", skip(session), fields(query = %query))]
pub(crate) async fn gmail_search(session: &mut ImapSession, query: &str) -> Result<Vec<u32>> {
    let command = format!("X-GM-RAW {}", quote(query));

    let uids = session
        .uid_search(&command)
        .await
        .map_err(|source| Error::ImapSearch {
            query: query.to_string(),
            source,
        })?;

    let mut uids: Vec<u32> = uids.into_iter().collect();
    uids.sort_unstable();

    debug!(uid_count = uids.len(), "Search complete");

    Ok(uids)
}

/// Fetches one message by UID without setting `\Seen`.
#[instrument(name = "session::fetch", skip(session))]
pub(crate) async fn fetch_detail(session: &mut ImapSession, uid: u32) -> Result<MessageDetail> {
    let stream = session
        .uid_fetch(uid.to_string(), "(UID INTERNALDATE BODY.PEEK[])")
        .await
        .map_err(|source| Error::ImapFetch { uid, source })?;
    let mut stream = std::pin::pin!(stream);

    // The stream is read to its end so the tagged response is consumed and
    // the session stays usable for the next command
    let mut detail = None;
    let mut failure = None;
    while let Some(item) = stream.next().await {
        let fetch = match item {
            Ok(fetch) => fetch,
            Err(source) => {
                failure.get_or_insert(Error::ImapFetch { uid, source });
                break;
            }
        };
        // Unsolicited FETCH responses for other messages may be interleaved
        if detail.is_none() && failure.is_none() && fetch.uid == Some(uid) {
            match parser::detail_from_fetch(&fetch) {
                Ok(parsed) => detail = Some(parsed),
                Err(e) => failure = Some(e),
            }
        }
    }

    match (failure, detail) {
        (Some(e), _) => Err(e),
        (None, Some(detail)) => Ok(detail),
        (None, None) => Err(Error::MessageMissing { uid }),
    }
}

/// Logs out from IMAP session.
#[instrument(name = "session::logout", skip(session))]
pub(crate) async fn logout(session: &mut ImapSession) -> Result<()> {
    debug!("Logging out");

    session
        .logout()
        .await
        .map_err(|source| Error::ImapLogout { source })
}

/// Renders `value` as an IMAP quoted string.
fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_imap::Authenticator;

    #[test]
    fn test_quote() {
        assert_eq!(
            quote("from:alerts@citibank.com newer_than:2d"),
            "\"from:alerts@citibank.com newer_than:2d\""
        );
        assert_eq!(quote(r#"a"b\c"#), r#""a\"b\\c""#);
    }

    #[test]
    fn test_xoauth2_response() {
        let mut auth = XOAuth2 {
            user: "me@gmail.com",
            access_token: "ya29.token",
            sent: false,
        };
        assert_eq!(
            auth.process(b""),
            "user=me@gmail.com\x01auth=Bearer ya29.token\x01\x01"
        );
        // Error challenge is answered with an empty line
        assert_eq!(auth.process(b"eyJzdGF0dXMiOiI0MDAifQ=="), "");
    }
}

//! Internal module for opening TLS connections to the IMAP server.

use crate::error::{Error, Result};
use rustls::ClientConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, instrument};
use webpki_roots::TLS_SERVER_ROOTS;

/// A TLS stream over TCP, used for IMAP communication.
pub(crate) type TlsStream = tokio_rustls::client::TlsStream<TcpStream>;

/// Connects to `host:port` and completes the TLS handshake within `timeout`.
#[instrument(
    name = "connection::connect_tls",
    skip_all,
    fields(imap_host = %host, port = port)
)]
pub(crate) async fn connect_tls(host: &str, port: u16, timeout: Duration) -> Result<TlsStream> {
    let target = format!("{host}:{port}");
    let server_name = parse_server_name(host)?;

    tokio::time::timeout(timeout, handshake(server_name, &target))
        .await
        .map_err(|_| Error::ConnectTimeout {
            target: target.clone(),
            timeout,
        })?
}

async fn handshake(server_name: rustls::ServerName, target: &str) -> Result<TlsStream> {
    debug!(target, "Establishing TCP connection");

    let tcp_stream = TcpStream::connect(target)
        .await
        .map_err(|source| Error::TcpConnect {
            target: target.to_string(),
            source,
        })?;

    debug!("Performing TLS handshake");

    tls_connector()
        .connect(server_name, tcp_stream)
        .await
        .map_err(|source| Error::TlsConnect {
            target: target.to_string(),
            source,
        })
}

/// TLS connector trusting the Mozilla root set.
fn tls_connector() -> TlsConnector {
    let mut roots = rustls::RootCertStore::empty();
    roots.add_trust_anchors(TLS_SERVER_ROOTS.iter().map(|ta| {
        rustls::OwnedTrustAnchor::from_subject_spki_name_constraints(
            ta.subject,
            ta.spki,
            ta.name_constraints,
        )
    }));

    let tls_config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(tls_config))
}

/// Parses server name for TLS SNI.
fn parse_server_name(host: &str) -> Result<rustls::ServerName> {
    rustls::ServerName::try_from(host).map_err(|source| Error::InvalidDnsName {
        host: host.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_gmail_server_name() {
        assert!(parse_server_name("imap.gmail.com").is_ok());
    }

    #[test]
    fn test_parse_invalid_server_name() {
        let err = parse_server_name("").unwrap_err();
        assert!(matches!(err, Error::InvalidDnsName { .. }));
    }
}

//! High-level client API: connect, TOFU-check, optionally follow redirects.

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::client::config::ClientConfig;
use crate::client::protocol::{self, ClientProtocolError};
use crate::response::Response;
use crate::tls::{self, build_client_config};
use crate::tofu::{TofuError, TofuOutcome};
use crate::uri::{GeminiUri, UriError};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid URI: {0}")]
    InvalidUri(#[from] UriError),
    #[error(transparent)]
    Protocol(#[from] ClientProtocolError),
    #[error("request to {uri} timed out")]
    Timeout { uri: String },
    #[error("I/O error talking to {uri}: {source}")]
    Io {
        uri: String,
        #[source]
        source: std::io::Error,
    },
    #[error("TLS error talking to {uri}: {source}")]
    Tls {
        uri: String,
        #[source]
        source: rustls::Error,
    },
    #[error(
        "certificate for {hostname}:{port} has changed (old={old_fingerprint}, new={new_fingerprint})"
    )]
    CertificateChanged {
        hostname: String,
        port: u16,
        old_fingerprint: String,
        new_fingerprint: String,
    },
    #[error("TOFU store error: {0}")]
    Tofu(#[from] TofuError),
    #[error("redirect loop detected at {uri}")]
    RedirectLoop { uri: String },
    #[error("exceeded {max} redirects, stopped at {uri}")]
    TooManyRedirects { max: u32, uri: String },
    #[error("redirect target is not a valid absolute URI: {0:?}")]
    InvalidRedirect(String),
    #[error("server presented no certificate")]
    NoPeerCertificate,
}

pub struct ClientSession {
    config: ClientConfig,
}

impl ClientSession {
    pub fn new(config: ClientConfig) -> Self {
        ClientSession { config }
    }

    /// Fetch `url`, following gemini-only redirects when `follow_redirects` is set.
    pub async fn get(&self, url: &str, follow_redirects: bool) -> Result<Response, ClientError> {
        let mut current = GeminiUri::parse(url, &["gemini"])?;
        let mut visited: HashSet<String> = HashSet::new();
        let mut hops = 0u32;

        loop {
            let response = self.fetch_single(&current).await?;

            if !follow_redirects || !response.is_redirect() {
                return Ok(response.with_url(current.serialize()));
            }

            let target_raw = response
                .redirect_target()
                .ok_or_else(|| ClientError::InvalidRedirect("missing meta".into()))?
                .to_owned();

            // Only a gemini:// redirect is auto-followed; anything else is returned
            // to the caller verbatim.
            let scheme = url::Url::parse(&target_raw)
                .ok()
                .map(|u| u.scheme().to_owned());
            if scheme.as_deref() != Some("gemini") {
                return Ok(response.with_url(current.serialize()));
            }

            let target = GeminiUri::parse(&target_raw, &["gemini"])
                .map_err(|_| ClientError::InvalidRedirect(target_raw.clone()))?;

            let visited_key = current.serialize();
            if visited.contains(&target.serialize()) {
                return Err(ClientError::RedirectLoop {
                    uri: target.serialize(),
                });
            }
            visited.insert(visited_key);

            hops += 1;
            if hops > self.config.max_redirects {
                return Err(ClientError::TooManyRedirects {
                    max: self.config.max_redirects,
                    uri: target.serialize(),
                });
            }

            current = target;
        }
    }

    async fn fetch_single(&self, uri: &GeminiUri) -> Result<Response, ClientError> {
        let uri_str = uri.serialize();
        tokio::time::timeout(self.config.timeout, self.fetch_inner(uri))
            .await
            .map_err(|_| ClientError::Timeout { uri: uri_str.clone() })?
    }

    async fn fetch_inner(&self, uri: &GeminiUri) -> Result<Response, ClientError> {
        let uri_str = uri.serialize();
        let (host, port) = uri.authority();

        let tcp = TcpStream::connect((host.as_str(), port))
            .await
            .map_err(|source| ClientError::Io {
                uri: uri_str.clone(),
                source,
            })?;

        let tls_config = build_client_config(self.config.tls_mode, self.config.client_identity.clone())
            .map_err(|e| ClientError::Tls {
                uri: uri_str.clone(),
                source: rustls::Error::General(e.to_string()),
            })?;
        let connector = TlsConnector::from(tls_config);
        let server_name = rustls::pki_types::ServerName::try_from(host.clone())
            .map_err(|_| ClientError::InvalidUri(UriError::MissingHost))?;

        let mut stream = connector
            .connect(server_name, tcp)
            .await
            .map_err(|source| ClientError::Io {
                uri: uri_str.clone(),
                source,
            })?;

        if let Some(tofu) = &self.config.tofu {
            let (_, session) = stream.get_ref();
            let peer_certs = session.peer_certificates().unwrap_or(&[]);
            let der = tls::end_entity_der(peer_certs).ok_or(ClientError::NoPeerCertificate)?;
            match tofu.verify(&host, port, &der)? {
                TofuOutcome::FirstUse | TofuOutcome::Matched => {}
                TofuOutcome::Changed { old } => {
                    let new_fingerprint = crate::fingerprint::fingerprint_der(&der);
                    return Err(ClientError::CertificateChanged {
                        hostname: host,
                        port,
                        old_fingerprint: old,
                        new_fingerprint,
                    });
                }
            }
        }

        let response = protocol::transact(&mut stream, uri, self.config.body_cap_bytes).await?;
        Ok(response)
    }
}

/// Owns the process-wide TOFU store handle for a family of [`ClientSession`]s,
/// giving it an explicit lifetime rather than a singleton.
pub struct ClientSessionFactory {
    tofu: Arc<crate::tofu::TofuStore>,
}

impl ClientSessionFactory {
    pub fn new(tofu: Arc<crate::tofu::TofuStore>) -> Self {
        ClientSessionFactory { tofu }
    }

    pub fn session(&self, mut config: ClientConfig) -> ClientSession {
        config.tofu = Some(self.tofu.clone());
        ClientSession::new(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_uri_is_rejected_before_connecting() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let session = ClientSession::new(ClientConfig::default());
        let result = rt.block_on(session.get("not a uri", true));
        assert!(matches!(result, Err(ClientError::InvalidUri(_))));
    }
}

//! Server-side TLS configuration.
//!
//! Gemini client certificates are almost always self-signed, so a stock
//! `WebPkiClientVerifier` (which requires a chain to a configured root) would reject
//! every real-world client. [`AcceptAnyClientCert`] requests a client certificate but
//! accepts any syntactically valid one; authorization happens afterwards, by
//! fingerprint, in the certificate-authorization middleware.

use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, UnixTime};
use rustls::server::danger::{self, ClientCertVerifier};
use rustls::server::WebPkiClientVerifier;
use rustls::{DigitallySignedStruct, DistinguishedName, RootCertStore, ServerConfig, SignatureScheme};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerTlsError {
    #[error("failed to build client certificate verifier: {0}")]
    Verifier(String),
    #[error("invalid certificate chain or private key: {0}")]
    Identity(#[from] rustls::Error),
}

#[derive(Debug)]
struct AcceptAnyClientCert {
    // Used only to borrow its signature-verification machinery; its trust decision
    // (which requires an empty root store and unauthenticated clients to even build)
    // is never consulted.
    inner: Arc<dyn ClientCertVerifier>,
}

impl AcceptAnyClientCert {
    fn new() -> Result<Arc<Self>, ServerTlsError> {
        let empty_roots = Arc::new(RootCertStore::empty());
        let inner = WebPkiClientVerifier::builder(empty_roots)
            .allow_unauthenticated()
            .build()
            .map_err(|e| ServerTlsError::Verifier(e.to_string()))?;
        Ok(Arc::new(Self { inner }))
    }
}

impl ClientCertVerifier for AcceptAnyClientCert {
    fn offer_client_auth(&self) -> bool {
        true
    }

    fn client_auth_mandatory(&self) -> bool {
        // A client certificate is requested but never required at the TLS layer;
        // requiring one (or a specific fingerprint) is the job of the certificate
        // authorization middleware.
        false
    }

    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        &[]
    }

    fn verify_client_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _now: UnixTime,
    ) -> Result<danger::ClientCertVerified, rustls::Error> {
        Ok(danger::ClientCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<danger::HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<danger::HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

/// Build a server TLS config that requests (but does not require) a client
/// certificate and accepts any well-formed one.
pub fn build_server_config(
    cert_chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
) -> Result<Arc<ServerConfig>, ServerTlsError> {
    let config = ServerConfig::builder()
        .with_client_cert_verifier(AcceptAnyClientCert::new()?)
        .with_single_cert(cert_chain, key)?;
    Ok(Arc::new(config))
}

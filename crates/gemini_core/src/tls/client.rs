//! Client-side TLS configuration.
//!
//! The Gemini norm is a self-signed server certificate, so the standard
//! CA-chain-validating path is never useful here. [`TofuFriendlyVerifier`] is the
//! teacher's `AllowUnknownIssuerVerification` generalized only slightly: it still runs
//! the full WebPKI checks (expiry, signature, name constraints, ...) and only waives the
//! "issuer is not a known CA" failure, leaving the actual trust decision to the TOFU
//! store once the handshake's peer certificate is available.

use std::sync::Arc;

use rustls::client::danger::{self, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientTlsError {
    #[error("failed to build certificate verifier: {0}")]
    Verifier(String),
    #[error("invalid client certificate/key pair: {0}")]
    ClientIdentity(#[from] rustls::Error),
}

/// Whether the client validates the server's certificate chain at all before handing
/// the peer certificate to the TOFU layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientTlsMode {
    /// Production default: run WebPKI checks but waive unknown-issuer failures; TOFU
    /// decides trust afterwards.
    TofuWithWebPkiChecks,
    /// Testing mode: accept any chain outright. Never the default.
    AcceptAny,
}

#[derive(Debug)]
struct TofuFriendlyVerifier {
    inner: Arc<WebPkiServerVerifier>,
}

impl TofuFriendlyVerifier {
    fn new() -> Result<Arc<Self>, ClientTlsError> {
        let roots = Arc::new(RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        });
        let inner = WebPkiServerVerifier::builder(roots)
            .build()
            .map_err(|e| ClientTlsError::Verifier(e.to_string()))?;
        Ok(Arc::new(Self { inner }))
    }
}

impl ServerCertVerifier for TofuFriendlyVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp: &[u8],
        now: UnixTime,
    ) -> Result<danger::ServerCertVerified, rustls::Error> {
        match self
            .inner
            .verify_server_cert(end_entity, intermediates, server_name, ocsp, now)
        {
            Ok(verified) => Ok(verified),
            Err(rustls::Error::InvalidCertificate(rustls::CertificateError::UnknownIssuer)) => {
                Ok(danger::ServerCertVerified::assertion())
            }
            Err(e) => Err(e),
        }
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

#[derive(Debug)]
struct AcceptAnyVerifier {
    inner: Arc<WebPkiServerVerifier>,
}

impl AcceptAnyVerifier {
    fn new() -> Result<Arc<Self>, ClientTlsError> {
        let roots = Arc::new(RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        });
        let inner = WebPkiServerVerifier::builder(roots)
            .build()
            .map_err(|e| ClientTlsError::Verifier(e.to_string()))?;
        Ok(Arc::new(Self { inner }))
    }
}

impl ServerCertVerifier for AcceptAnyVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp: &[u8],
        _now: UnixTime,
    ) -> Result<danger::ServerCertVerified, rustls::Error> {
        Ok(danger::ServerCertVerified::assertion())
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

/// Build a client TLS config. `client_identity`, when set, is presented during the
/// handshake as an optional client certificate.
pub fn build_client_config(
    mode: ClientTlsMode,
    client_identity: Option<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)>,
) -> Result<Arc<ClientConfig>, ClientTlsError> {
    let builder = ClientConfig::builder().dangerous();
    let builder = match mode {
        ClientTlsMode::TofuWithWebPkiChecks => {
            builder.with_custom_certificate_verifier(TofuFriendlyVerifier::new()?)
        }
        ClientTlsMode::AcceptAny => {
            builder.with_custom_certificate_verifier(AcceptAnyVerifier::new()?)
        }
    };

    let config = match client_identity {
        Some((chain, key)) => builder.with_client_auth_cert(chain, key)?,
        None => builder.with_no_client_auth(),
    };

    Ok(Arc::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_default_tofu_config() {
        build_client_config(ClientTlsMode::TofuWithWebPkiChecks, None).unwrap();
    }

    #[test]
    fn builds_accept_any_config() {
        build_client_config(ClientTlsMode::AcceptAny, None).unwrap();
    }
}

//! TLS adapters: a client side that defers trust to the TOFU layer, and a server side
//! that accepts arbitrary self-signed client certificates.

pub mod client;
pub mod server;

pub use client::{build_client_config, ClientTlsMode};
pub use server::build_server_config;

/// Extracts the DER bytes of the peer's end-entity certificate, if one was presented.
pub fn end_entity_der(certs: &[rustls::pki_types::CertificateDer<'_>]) -> Option<Vec<u8>> {
    certs.first().map(|c| c.as_ref().to_vec())
}

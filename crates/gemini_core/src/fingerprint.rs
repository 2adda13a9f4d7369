//! SHA-256 certificate fingerprints, shared by the TOFU store on both ends of a connection.

use sha2::{Digest, Sha256};

/// `sha256:<64 lowercase hex chars>` over the certificate's DER encoding.
pub fn fingerprint_der(der: &[u8]) -> String {
    let digest = Sha256::digest(der);
    format!("sha256:{}", hex::encode(digest))
}

use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};

use crate::client::protocol::DEFAULT_BODY_CAP_BYTES;
use crate::tls::ClientTlsMode;
use crate::tofu::TofuStore;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_REDIRECTS: u32 = 5;

/// Configuration for a [`crate::client::session::ClientSession`].
///
/// The secure default is `tls_mode = TofuWithWebPkiChecks` with a TOFU store attached;
/// nothing in this crate defaults to the insecure `AcceptAny` testing mode.
pub struct ClientConfig {
    pub timeout: Duration,
    pub max_redirects: u32,
    pub body_cap_bytes: usize,
    pub tls_mode: ClientTlsMode,
    pub client_identity: Option<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)>,
    pub tofu: Option<Arc<TofuStore>>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            timeout: DEFAULT_TIMEOUT,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            body_cap_bytes: DEFAULT_BODY_CAP_BYTES,
            tls_mode: ClientTlsMode::TofuWithWebPkiChecks,
            client_identity: None,
            tofu: None,
        }
    }
}

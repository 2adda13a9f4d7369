//! Core library: wire protocol, TLS trust, TOFU store, and both the client and server
//! halves of a Gemini protocol implementation.

pub mod client;
pub mod fingerprint;
pub mod request;
pub mod response;
pub mod server;
pub mod status;
pub mod tls;
pub mod tofu;
pub mod uri;

pub use request::Request;
pub use response::Response;
pub use uri::{GeminiUri, UriError};

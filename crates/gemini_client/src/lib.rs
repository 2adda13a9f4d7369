//! Thin re-export of `gemini_core`'s client-facing pieces, for callers (like embedders
//! that only fetch pages and never run a server) that don't want the server module's
//! dependency footprint in their own public API.

pub use gemini_core::client::{ClientConfig, ClientError, ClientSession, ClientSessionFactory};
pub use gemini_core::tofu::{TofuError, TofuOutcome, TofuStore};
pub use gemini_core::{GeminiUri, Request, Response, UriError};

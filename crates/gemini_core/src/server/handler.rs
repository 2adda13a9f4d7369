//! The trait every route target implements.

use async_trait::async_trait;
use thiserror::Error;

use crate::request::Request;
use crate::response::Response;

/// An unexpected failure inside a handler, as opposed to a deliberate error response
/// (a handler that wants to return `51 "Not found"` just builds that `Response`
/// directly). The router turns this into `40 "Server error: <reason>"`.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Internal(String),
}

#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, request: &Request) -> Result<Response, HandlerError>;
}

/// Adapts a plain closure into a [`Handler`], for routes simple enough not to need a
/// dedicated type.
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: Fn(&Request) -> Response + Send + Sync,
{
    async fn handle(&self, request: &Request) -> Result<Response, HandlerError> {
        Ok((self.0)(request))
    }
}

//! Request middleware: small, composable checks that run before a request reaches the
//! router. Each middleware either allows a request through or produces the final
//! response itself (access denied, rate limited, certificate required).

pub mod access_control;
pub mod cert_auth;
pub mod rate_limit;

use std::net::IpAddr;

use async_trait::async_trait;

use crate::response::Response;

pub use access_control::{AccessControl, AccessControlConfig};
pub use cert_auth::{CertificateAuth, CertificateAuthConfig};
pub use rate_limit::{RateLimitConfig, RateLimiter, TokenBucket};

/// The outcome of running one middleware against a request.
pub enum Decision {
    Allow,
    Deny(Response),
}

#[async_trait]
pub trait Middleware: Send + Sync {
    /// `remote_addr` is the peer's IP (for access control / rate limiting);
    /// `client_cert_fingerprint` is `Some` only when the client presented a certificate.
    async fn process_request(
        &self,
        uri: &str,
        remote_addr: IpAddr,
        client_cert_fingerprint: Option<&str>,
    ) -> Decision;
}

/// Lets a chain stage be built from an `Arc<T>` instead of owning `T` outright, needed
/// when the caller also holds an `Arc` to the same middleware for its own purposes —
/// `RateLimiter::start` takes `self: &Arc<Self>` to spawn its cleanup task, so a caller
/// that wants the sweep running has to keep an `Arc` around rather than boxing `T` directly.
#[async_trait]
impl<T: Middleware + ?Sized> Middleware for std::sync::Arc<T> {
    async fn process_request(
        &self,
        uri: &str,
        remote_addr: IpAddr,
        client_cert_fingerprint: Option<&str>,
    ) -> Decision {
        T::process_request(self, uri, remote_addr, client_cert_fingerprint).await
    }
}

/// An ordered list of middlewares, evaluated in registration order. The first to deny
/// short-circuits the chain; if every middleware allows, the chain allows.
pub struct MiddlewareChain {
    stages: Vec<Box<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new(stages: Vec<Box<dyn Middleware>>) -> Self {
        MiddlewareChain { stages }
    }

    pub async fn process_request(
        &self,
        uri: &str,
        remote_addr: IpAddr,
        client_cert_fingerprint: Option<&str>,
    ) -> Decision {
        for stage in &self.stages {
            if let Decision::Deny(response) =
                stage.process_request(uri, remote_addr, client_cert_fingerprint).await
            {
                return Decision::Deny(response);
            }
        }
        Decision::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysAllow;
    #[async_trait]
    impl Middleware for AlwaysAllow {
        async fn process_request(&self, _: &str, _: IpAddr, _: Option<&str>) -> Decision {
            Decision::Allow
        }
    }

    struct AlwaysDeny(u32);
    #[async_trait]
    impl Middleware for AlwaysDeny {
        async fn process_request(&self, _: &str, _: IpAddr, _: Option<&str>) -> Decision {
            Decision::Deny(Response::new(self.0, "denied", None))
        }
    }

    fn ip() -> IpAddr {
        "192.168.1.1".parse().unwrap()
    }

    #[tokio::test]
    async fn empty_chain_allows() {
        let chain = MiddlewareChain::new(vec![]);
        assert!(matches!(
            chain.process_request("gemini://test/", ip(), None).await,
            Decision::Allow
        ));
    }

    #[tokio::test]
    async fn first_denial_short_circuits() {
        let chain = MiddlewareChain::new(vec![
            Box::new(AlwaysDeny(53)),
            Box::new(AlwaysDeny(44)),
        ]);
        match chain.process_request("gemini://test/", ip(), None).await {
            Decision::Deny(resp) => assert_eq!(resp.status(), 53),
            Decision::Allow => panic!("expected deny"),
        }
    }

    #[tokio::test]
    async fn all_allow_passes_through() {
        let chain = MiddlewareChain::new(vec![Box::new(AlwaysAllow), Box::new(AlwaysAllow)]);
        assert!(matches!(
            chain.process_request("gemini://test/", ip(), None).await,
            Decision::Allow
        ));
    }
}

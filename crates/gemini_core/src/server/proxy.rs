//! Reverse-proxy handler: forwards a request to an upstream Gemini server and relays
//! its response verbatim, redirects included.

use async_trait::async_trait;

use crate::client::{ClientConfig, ClientError, ClientSession};
use crate::request::Request;
use crate::response::Response;
use crate::server::handler::{Handler, HandlerError};

pub struct ProxyHandler {
    upstream: String,
    prefix: String,
    strip_prefix: bool,
    client: ClientSession,
}

impl ProxyHandler {
    pub fn new(upstream: impl Into<String>, prefix: impl Into<String>, strip_prefix: bool) -> Self {
        let upstream = upstream.into().trim_end_matches('/').to_owned();
        ProxyHandler {
            upstream,
            prefix: prefix.into(),
            strip_prefix,
            client: ClientSession::new(ClientConfig::default()),
        }
    }

    pub fn upstream(&self) -> &str {
        &self.upstream
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn target_path(&self, request: &Request) -> String {
        let path = request.path();
        if !self.strip_prefix {
            return path.to_owned();
        }

        let prefix = self.prefix.trim_end_matches('/');
        if path == prefix {
            return "/".to_owned();
        }
        match path.strip_prefix(prefix) {
            // Only a `/`-bounded match counts as the prefix; `/apikey` must not be
            // treated as `/api` + `key`.
            Some(rest) if rest.starts_with('/') => rest.to_owned(),
            _ => path.to_owned(),
        }
    }

    fn target_uri(&self, request: &Request) -> String {
        let path = self.target_path(request);
        match request.query() {
            Some(query) => format!("{}{path}?{query}", self.upstream),
            None => format!("{}{path}", self.upstream),
        }
    }
}

#[async_trait]
impl Handler for ProxyHandler {
    async fn handle(&self, request: &Request) -> Result<Response, HandlerError> {
        let target = self.target_uri(request);
        let response = match self.client.get(&target, false).await {
            Ok(response) => response,
            Err(ClientError::Timeout { .. }) => {
                Response::new(43, "Proxy error: upstream timeout", None)
            }
            Err(ClientError::Io { source, .. }) => {
                Response::new(43, format!("Proxy error: connection failed ({source})"), None)
            }
            Err(err) => Response::new(43, format!("Proxy error: {err}"), None),
        };
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uri::GeminiUri;

    fn req(path_and_query: &str) -> Request {
        Request::from_uri(
            GeminiUri::parse(&format!("gemini://frontend{path_and_query}"), &["gemini"]).unwrap(),
        )
    }

    #[test]
    fn trailing_slash_removed_from_upstream() {
        let handler = ProxyHandler::new("gemini://backend:1965/", "/", false);
        assert_eq!(handler.upstream(), "gemini://backend:1965");
    }

    #[test]
    fn strip_prefix_rewrites_target_path() {
        let handler = ProxyHandler::new("gemini://backend:1965", "/api/", true);
        let target = handler.target_uri(&req("/api/resource"));
        assert_eq!(target, "gemini://backend:1965/resource");
    }

    #[test]
    fn strip_prefix_exact_match_yields_root() {
        let handler = ProxyHandler::new("gemini://backend:1965", "/api", true);
        let target = handler.target_uri(&req("/api"));
        assert_eq!(target, "gemini://backend:1965/");
    }

    #[test]
    fn strip_prefix_does_not_touch_sibling_with_shared_stem() {
        let handler = ProxyHandler::new("gemini://backend:1965", "/api", true);
        let target = handler.target_uri(&req("/apikey"));
        assert_eq!(target, "gemini://backend:1965/apikey");
    }

    #[test]
    fn query_string_is_preserved() {
        let handler = ProxyHandler::new("gemini://backend:1965", "/", false);
        let target = handler.target_uri(&req("/search?q=test"));
        assert_eq!(target, "gemini://backend:1965/search?q=test");
    }
}

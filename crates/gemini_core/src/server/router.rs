//! Registration-order route matching: exact, prefix, or regex.

use regex::Regex;
use thiserror::Error;

use crate::request::Request;
use crate::response::Response;
use crate::server::handler::{Handler, HandlerError};
use crate::server::location::{HandlerType, LocationConfig, LocationConfigError};
use crate::server::proxy::ProxyHandler;
use crate::server::static_handler::StaticHandler;
use crate::server::titan::TitanHandler;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("invalid regex pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    Exact,
    Prefix,
    Regex,
}

enum Matcher {
    Exact(String),
    Prefix(String),
    Regex(Regex),
}

pub struct Route {
    pattern: String,
    kind: RouteKind,
    matcher: Matcher,
    handler: Box<dyn Handler>,
}

impl Route {
    fn matches(&self, path: &str) -> bool {
        match &self.matcher {
            Matcher::Exact(p) => path == p,
            // `/`-bounded on the pattern with any trailing slash trimmed off, so `/api`
            // and `/api/` behave identically: both match `/api` and `/api/x`, neither
            // matches `/apikey`.
            Matcher::Prefix(p) => {
                let trimmed = p.trim_end_matches('/');
                if trimmed.is_empty() {
                    true
                } else {
                    path == trimmed
                        || path
                            .strip_prefix(trimmed)
                            .is_some_and(|rest| rest.starts_with('/'))
                }
            }
            Matcher::Regex(re) => re.is_match(path),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn kind(&self) -> RouteKind {
        self.kind
    }
}

/// Matches requests to handlers in the order routes were registered; the first match
/// wins, so a `/api` exact route registered before a `/api` prefix route is never
/// shadowed by it. A `/api` prefix route matches `/api` and `/api/...` but never a
/// sibling with the same stem like `/apikey` — the trailing slash on a registered
/// pattern is optional, `/api` and `/api/` behave identically.
pub struct Router {
    routes: Vec<Route>,
    default_handler: Option<Box<dyn Handler>>,
}

impl Default for Router {
    fn default() -> Self {
        Router::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Router {
            routes: Vec::new(),
            default_handler: None,
        }
    }

    pub fn add_exact(&mut self, pattern: impl Into<String>, handler: Box<dyn Handler>) {
        let pattern = pattern.into();
        self.routes.push(Route {
            matcher: Matcher::Exact(pattern.clone()),
            pattern,
            kind: RouteKind::Exact,
            handler,
        });
    }

    pub fn add_prefix(&mut self, pattern: impl Into<String>, handler: Box<dyn Handler>) {
        let pattern = pattern.into();
        self.routes.push(Route {
            matcher: Matcher::Prefix(pattern.clone()),
            pattern,
            kind: RouteKind::Prefix,
            handler,
        });
    }

    pub fn add_regex(
        &mut self,
        pattern: impl Into<String>,
        handler: Box<dyn Handler>,
    ) -> Result<(), RouterError> {
        let pattern = pattern.into();
        let re = Regex::new(&pattern).map_err(|source| RouterError::InvalidPattern {
            pattern: pattern.clone(),
            source,
        })?;
        self.routes.push(Route {
            matcher: Matcher::Regex(re),
            pattern,
            kind: RouteKind::Regex,
            handler,
        });
        Ok(())
    }

    pub fn set_default_handler(&mut self, handler: Box<dyn Handler>) {
        self.default_handler = Some(handler);
    }

    /// Builds and registers the concrete handler a [`LocationConfig`] describes, as a
    /// prefix route at `location.prefix`. `LocationConfig`'s constructors already
    /// validate the fields each `HandlerType` needs, so the `Missing*` errors here only
    /// fire against a config built by hand with the invariant broken.
    pub fn add_location(&mut self, location: &LocationConfig) -> Result<(), LocationConfigError> {
        let handler: Box<dyn Handler> = match location.handler_type {
            HandlerType::Static => {
                let root = location
                    .document_root
                    .clone()
                    .ok_or(LocationConfigError::MissingDocumentRoot)?;
                Box::new(StaticHandler::new(root).with_directory_listing(location.enable_directory_listing))
            }
            HandlerType::Proxy => {
                let upstream = location
                    .upstream
                    .clone()
                    .ok_or(LocationConfigError::MissingUpstream)?;
                Box::new(ProxyHandler::new(upstream, location.prefix.clone(), location.strip_prefix))
            }
            HandlerType::Titan => {
                let root = location
                    .document_root
                    .clone()
                    .ok_or(LocationConfigError::MissingTitanDocumentRoot)?;
                let mut handler = TitanHandler::new(root, location.titan_max_size_bytes as u64);
                if let Some(token) = &location.titan_token {
                    handler = handler.with_required_token(token.clone());
                }
                Box::new(handler)
            }
        };
        self.add_prefix(location.prefix.clone(), handler);
        Ok(())
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Dispatches to the first matching route (or the default handler), turning an
    /// `Err` from the handler into `40 "Server error: <reason>"` per the protocol
    /// engine's contract — a handler that wants a deliberate error status builds that
    /// `Response` directly instead of returning `Err`.
    pub async fn route(&self, request: &Request) -> Response {
        let path = request.path();
        for route in &self.routes {
            if route.matches(path) {
                return Self::resolve(route.handler.handle(request).await);
            }
        }
        match &self.default_handler {
            Some(handler) => Self::resolve(handler.handle(request).await),
            None => Response::not_found("Not found"),
        }
    }

    fn resolve(result: Result<Response, HandlerError>) -> Response {
        match result {
            Ok(response) => response,
            Err(err) => Response::temporary_failure(format!("Server error: {err}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::handler::FnHandler;
    use crate::uri::GeminiUri;

    fn req(path: &str) -> Request {
        Request::from_uri(GeminiUri::parse(&format!("gemini://example.com{path}"), &["gemini"]).unwrap())
    }

    fn text(body: &'static str) -> Box<dyn Handler> {
        Box::new(FnHandler(move |_: &Request| Response::success("text/gemini", body)))
    }

    #[tokio::test]
    async fn exact_route_matches_only_that_path() {
        let mut router = Router::new();
        router.add_exact("/", text("Index"));
        router.add_exact("/about", text("About"));

        let resp = router.route(&req("/")).await;
        assert_eq!(resp.body(), Some(b"Index".as_slice()));

        let resp = router.route(&req("/about")).await;
        assert_eq!(resp.body(), Some(b"About".as_slice()));
    }

    #[tokio::test]
    async fn exact_route_does_not_match_subpaths() {
        let mut router = Router::new();
        router.add_exact("/about", text("About"));

        let resp = router.route(&req("/about/page")).await;
        assert_eq!(resp.status(), 51);
    }

    #[tokio::test]
    async fn prefix_route_matches_subpaths() {
        let mut router = Router::new();
        router.add_prefix("/static/", text("Static"));

        assert_eq!(
            router.route(&req("/static/file.txt")).await.status(),
            20
        );
        assert_eq!(router.route(&req("/other/file.txt")).await.status(), 51);
    }

    #[tokio::test]
    async fn prefix_route_does_not_match_sibling_with_shared_stem() {
        let mut router = Router::new();
        router.add_prefix("/api/", text("Api"));

        assert_eq!(router.route(&req("/apikey")).await.status(), 51);
    }

    #[tokio::test]
    async fn prefix_route_without_trailing_slash_still_enforces_boundary() {
        let mut router = Router::new();
        router.add_prefix("/api", text("Api"));

        assert_eq!(router.route(&req("/api")).await.status(), 20);
        assert_eq!(router.route(&req("/api/resource")).await.status(), 20);
        assert_eq!(router.route(&req("/apikey")).await.status(), 51);
    }

    #[tokio::test]
    async fn regex_route_matches_anchored_pattern() {
        let mut router = Router::new();
        router.add_regex(r"^/user/\d+$", text("User")).unwrap();

        assert_eq!(router.route(&req("/user/123")).await.status(), 20);
        assert_eq!(router.route(&req("/user/abc")).await.status(), 51);
    }

    #[tokio::test]
    async fn registration_order_wins_on_overlap() {
        let mut router = Router::new();
        router.add_exact("/test", text("First"));
        router.add_exact("/test", text("Second"));

        let resp = router.route(&req("/test")).await;
        assert_eq!(resp.body(), Some(b"First".as_slice()));
    }

    #[tokio::test]
    async fn default_handler_used_when_nothing_matches() {
        let mut router = Router::new();
        router.set_default_handler(Box::new(FnHandler(|req: &Request| {
            Response::new(51, format!("Not found: {}", req.path()), None)
        })));

        let resp = router.route(&req("/nonexistent")).await;
        assert_eq!(resp.status(), 51);
        assert_eq!(resp.meta(), "Not found: /nonexistent");
    }

    #[tokio::test]
    async fn no_default_handler_yields_generic_404() {
        let router = Router::new();
        let resp = router.route(&req("/notfound")).await;
        assert_eq!(resp.status(), 51);
        assert_eq!(resp.meta(), "Not found");
    }

    #[tokio::test]
    async fn handler_error_becomes_server_error_response() {
        struct Faulty;
        #[async_trait::async_trait]
        impl Handler for Faulty {
            async fn handle(&self, _: &Request) -> Result<Response, HandlerError> {
                Err(HandlerError::Internal("database connection lost".into()))
            }
        }

        let mut router = Router::new();
        router.add_exact("/", Box::new(Faulty));

        let resp = router.route(&req("/")).await;
        assert_eq!(resp.status(), 40);
        assert_eq!(resp.meta(), "Server error: database connection lost");
    }

    #[tokio::test]
    async fn add_location_registers_a_static_handler() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("page.gmi"), "# Hi").unwrap();
        let location = LocationConfig::static_files("/docs/", dir.path()).unwrap();

        let mut router = Router::new();
        router.add_location(&location).unwrap();

        let resp = router.route(&req("/docs/page.gmi")).await;
        assert_eq!(resp.status(), 20);
        assert_eq!(resp.body(), Some(b"# Hi".as_slice()));
    }

    #[tokio::test]
    async fn add_location_registers_a_titan_handler() {
        let dir = tempfile::tempdir().unwrap();
        let location = LocationConfig::titan("/drop/", dir.path())
            .unwrap()
            .with_titan_token("s3cr3t");

        let mut router = Router::new();
        router.add_location(&location).unwrap();

        let resp = router
            .route(&req("/drop/note.gmi;size=5;token=s3cr3t"))
            .await;
        assert_eq!(resp.status(), 61);

        let upload = Request::from_uri(
            GeminiUri::parse(
                "gemini://example.com/drop/note.gmi;size=5;token=s3cr3t",
                &["gemini", "titan"],
            )
            .unwrap(),
        )
        .with_titan_body(b"hello".to_vec());
        let resp = router.route(&upload).await;
        assert_eq!(resp.status(), 20);
    }

    #[tokio::test]
    async fn add_location_registers_a_proxy_handler() {
        let location = LocationConfig::proxy("/api/", "gemini://backend:1965").unwrap();

        let mut router = Router::new();
        router.add_location(&location).unwrap();

        // The proxy actually dials upstream, which isn't reachable in this test; asserting
        // the prefix matched at all (rather than falling through to `51`) is enough to show
        // the router wired the right handler in.
        let resp = router.route(&req("/api/resource")).await;
        assert_ne!(resp.status(), 51);
    }
}

pub mod config;
pub mod handler;
pub mod location;
pub mod middleware;
pub mod protocol;
pub mod proxy;
pub mod router;
pub mod static_handler;
pub mod titan;

pub use config::{ConfigError, ServerConfig};
pub use handler::{FnHandler, Handler, HandlerError};
pub use location::{HandlerType, LocationConfig, LocationConfigError};
pub use middleware::{Decision, Middleware, MiddlewareChain};
pub use protocol::serve_connection;
pub use proxy::ProxyHandler;
pub use router::{Route, RouteKind, Router, RouterError};
pub use static_handler::StaticHandler;
pub use titan::{TitanHandler, TitanParams};

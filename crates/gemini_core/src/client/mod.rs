pub mod config;
pub mod protocol;
pub mod session;

pub use config::ClientConfig;
pub use protocol::{transact, ClientProtocolError};
pub use session::{ClientError, ClientSession, ClientSessionFactory};

//! HTTP transport adapter.

mod transport;

pub use transport::{DEFAULT_USER_AGENT, HttpTransport};

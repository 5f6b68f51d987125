//! A network layer for socket-level HTTP
//!
//! This module contains the pieces the client is assembled from: typed
//! errors, the owned transport handle (TCP, TLS or Unix domain socket) with
//! its connect/timeout logic, and the HTTP/1.1 protocol implementation that
//! reads and writes directly on that handle.

/// Common error types for network operations
pub mod error;

/// Transport targets and the owned socket handle
pub mod transport;

/// HTTP/1.1 client implementation
pub mod http;

/// Re-exports of the common surface
pub mod prelude {
    pub use super::error::Error;
    pub use super::http::{Body, Client, Config, HeaderMap, Method, Request, Response, Uri};
    pub use super::transport::{Socket, Target};
}

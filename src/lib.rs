//! # sockhttp - Socket HTTP Client
//!
//! A blocking HTTP/1.1 client that speaks directly to a transport socket
//! (TCP, TLS-over-TCP or a Unix domain socket) instead of delegating to a
//! general-purpose HTTP engine. Connection establishment, request
//! serialization, status-line and header parsing, body framing
//! (content-length, chunked, read-to-close) and content decoding are all
//! implemented against OS socket primitives.
//!
//! Every request opens exactly one socket and the client always asserts
//! `Connection: close`: there is no pooling, no keep-alive reuse, no retry
//! and no redirect following. What you get in exchange is a client that can
//! talk to anything exposing an HTTP/1.1 surface over a raw socket,
//! including daemons listening on Unix domain sockets.
//!
//! ## Example
//!
//! ```rust,no_run
//! use sockhttp::network::http::{Client, Config, Method, Request};
//!
//! # fn main() -> Result<(), sockhttp::network::error::Error> {
//! let config = Config::builder()
//!     .remote("unix:///var/run/docker.sock")
//!     .timeout_ms(30_000)
//!     .build()?;
//!
//! let client = Client::new(config);
//! let request = Request::new(Method::Get, "/v1.43/containers/json")?;
//!
//! let mut response = client.send(request)?;
//! assert_eq!(response.status, 200);
//! let body = response.body.contents()?;
//! # let _ = body;
//! # Ok(())
//! # }
//! ```
//!
//! ## Response bodies
//!
//! The body of a returned [`network::http::Response`] is a read-once,
//! forward-only stream over the live socket. It becomes available as soon as
//! all headers are parsed, before the body has been transferred. Drain it
//! with `contents()`, read it incrementally, or `detach()` the underlying
//! socket to take over the connection. Whoever holds the socket last closes
//! it; dropping an undetached body stream closes the connection.

#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

/// Network layer: transport handles, the HTTP/1.1 protocol implementation
/// and the error taxonomy shared by both.
pub mod network;

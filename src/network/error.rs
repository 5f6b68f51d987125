//! Common error types for network operations

use std::io;

/// A common error type for socket HTTP operations.
///
/// Every failure the client can produce falls into one of these variants.
/// There are no internal retries anywhere: each error is raised once and
/// surfaced to the caller unchanged. When a socket had already been opened
/// at the point of failure, the client closes it before the error escapes.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An invalid or inconsistent configuration option, raised at resolve
    /// time before any socket is touched.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A transport-level connect failure (refused, unreachable, failed
    /// name resolution).
    #[error("connection to {remote} failed: {message}")]
    Connection {
        /// The remote endpoint the connect was addressed to.
        remote: String,
        /// Description of the underlying failure.
        message: String,
        /// The originating I/O error, when one exists.
        #[source]
        source: Option<io::Error>,
    },

    /// A connect, read or write exceeded the configured timeout. The
    /// connection is unusable afterwards.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The TLS handshake failed.
    #[error("cannot enable tls: {0}")]
    Tls(String),

    /// The request cannot be sent: no remote is configured and neither the
    /// URI nor a `Host` header names a connection endpoint.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The peer broke the HTTP framing: the status line is missing or
    /// malformed, or the connection failed mid-message.
    #[error("broken pipe: {0}")]
    BrokenPipe(String),

    /// A body-stream misuse (detached or closed stream) or an unclassified
    /// low-level I/O failure while reading a body.
    #[error("stream error: {0}")]
    Stream(String),
}

impl Error {
    /// Map a socket-level I/O error to the matching variant.
    ///
    /// Timeouts are reported by the OS as `TimedOut` (and as `WouldBlock`
    /// on platforms where a read/write timeout trips the non-blocking
    /// path), so both map to [`Error::Timeout`]. Everything else becomes a
    /// generic stream error.
    pub(crate) fn from_io(err: io::Error, context: &str) -> Self {
        if is_timeout(&err) {
            Error::Timeout(format!("{context} timed out"))
        } else {
            Error::Stream(format!("{context}: {err}"))
        }
    }
}

/// Whether an I/O error represents an expired socket timeout.
pub(crate) fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}

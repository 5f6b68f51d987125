//! Transport targets and the owned socket handle.
//!
//! A [`Target`] names where a connection goes (`tcp://host:port` or
//! `unix:///path`); a [`Socket`] is the connected, timeout-configured handle
//! the HTTP layer reads and writes on. The socket is an owned value with
//! explicit transfer-of-ownership semantics: it moves into the response body
//! stream once headers are parsed, and whoever holds it last closes it.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;

use log::debug;
use native_tls::{HandshakeError, TlsConnector, TlsStream};

use crate::network::error::{Error, is_timeout};

/// A parsed connection target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A TCP endpoint, optionally upgraded to TLS after connecting.
    Tcp {
        /// Host name or literal address.
        host: String,
        /// TCP port.
        port: u16,
    },
    /// A Unix domain socket path.
    #[cfg(unix)]
    Unix(PathBuf),
}

impl Target {
    /// Parse a remote endpoint string.
    ///
    /// Accepted forms are `tcp://host:port`, `unix:///path`, and the
    /// `http://` / `https://` aliases (with their default ports) that
    /// daemon addresses are commonly written in. The error value is a bare
    /// message; callers wrap it into the variant matching where the string
    /// came from (configuration vs. request).
    pub fn parse(remote: &str) -> Result<Target, String> {
        if let Some(path) = remote.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(format!("`{remote}` is missing a socket path"));
            }
            #[cfg(unix)]
            return Ok(Target::Unix(PathBuf::from(path)));
            #[cfg(not(unix))]
            return Err("unix domain sockets are not supported on this platform".to_string());
        }

        let (rest, default_port) = if let Some(rest) = remote.strip_prefix("tcp://") {
            (rest, None)
        } else if let Some(rest) = remote.strip_prefix("http://") {
            (rest, Some(80))
        } else if let Some(rest) = remote.strip_prefix("https://") {
            (rest, Some(443))
        } else {
            return Err(format!("`{remote}` has an unsupported scheme"));
        };

        // Daemon addresses may carry a path suffix (http://host:port/); the
        // endpoint is only the authority part.
        let authority = rest.split('/').next().unwrap_or("");
        let (host, port) = split_host_port(authority)?;
        let port = match (port, default_port) {
            (Some(port), _) => port,
            (None, Some(port)) => port,
            (None, None) => return Err(format!("`{remote}` is missing a port")),
        };

        if host.is_empty() {
            return Err(format!("`{remote}` is missing a host"));
        }

        Ok(Target::Tcp {
            host: host.to_string(),
            port,
        })
    }

    /// Whether the remote string's scheme implies TLS, when it does at all.
    pub fn tls_hint(remote: &str) -> Option<bool> {
        if remote.starts_with("https://") {
            Some(true)
        } else if remote.starts_with("http://") {
            Some(false)
        } else {
            None
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
            #[cfg(unix)]
            Target::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

/// Split an authority into host and optional port, tolerating bracketed
/// IPv6 literals.
pub(crate) fn split_host_port(authority: &str) -> Result<(&str, Option<u16>), String> {
    if let Some(rest) = authority.strip_prefix('[') {
        let (host, rest) = rest
            .split_once(']')
            .ok_or_else(|| format!("`{authority}` has an unterminated address literal"))?;
        let port = match rest.strip_prefix(':') {
            Some(port) => Some(
                port.parse::<u16>()
                    .map_err(|_| format!("`{authority}` has an invalid port"))?,
            ),
            None if rest.is_empty() => None,
            None => return Err(format!("`{authority}` has trailing garbage")),
        };
        return Ok((host, port));
    }

    match authority.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| format!("`{authority}` has an invalid port"))?;
            Ok((host, Some(port)))
        }
        None => Ok((authority, None)),
    }
}

/// Introspection data for a live socket.
#[derive(Debug, Clone)]
pub struct Metadata {
    /// The peer the socket is connected to, when the OS reports one.
    pub peer: Option<String>,
    /// Configured read timeout.
    pub read_timeout: Option<Duration>,
    /// Configured write timeout.
    pub write_timeout: Option<Duration>,
    /// Whether the transport is TLS-wrapped.
    pub tls: bool,
}

/// A connected, timeout-configured transport handle.
///
/// Reads and writes go straight to the OS socket. The handle closes the
/// connection when dropped; [`Socket::close`] exists for the explicit,
/// best-effort shutdown paths and never fails observably.
#[derive(Debug)]
pub enum Socket {
    /// Plain TCP.
    Tcp(TcpStream),
    /// Unix domain socket.
    #[cfg(unix)]
    Unix(UnixStream),
    /// TLS over TCP.
    Tls(Box<TlsStream<TcpStream>>),
}

impl Socket {
    /// Open a connection to `target` with `timeout` applied to both the
    /// connect phase and subsequent reads/writes.
    ///
    /// The connect phase uses the timeout truncated to whole seconds (the
    /// untruncated value when that would be zero); once connected, the
    /// socket's I/O timeout is set to the full millisecond-precision value.
    /// When `tls` is given, a handshake is performed against the contained
    /// peer name before the socket is returned.
    ///
    /// Connect failures whose OS error says "timed out" surface as
    /// [`Error::Timeout`]; every other connect failure is an
    /// [`Error::Connection`] naming the target. Handshake failures surface
    /// as [`Error::Tls`].
    pub fn open(
        target: &Target,
        timeout: Duration,
        tls: Option<(&TlsConnector, &str)>,
    ) -> Result<Socket, Error> {
        let connect_timeout = connect_phase_timeout(timeout);
        debug!("connecting to {target} (timeout {timeout:?})");

        let socket = match target {
            Target::Tcp { host, port } => {
                let addr = (host.as_str(), *port)
                    .to_socket_addrs()
                    .map_err(|err| connection_error(target, err))?
                    .next()
                    .ok_or_else(|| Error::Connection {
                        remote: target.to_string(),
                        message: "host resolved to no addresses".to_string(),
                        source: None,
                    })?;
                let stream = TcpStream::connect_timeout(&addr, connect_timeout)
                    .map_err(|err| connection_error(target, err))?;
                stream
                    .set_read_timeout(Some(timeout))
                    .and_then(|()| stream.set_write_timeout(Some(timeout)))
                    .map_err(|err| connection_error(target, err))?;
                Socket::Tcp(stream)
            }
            #[cfg(unix)]
            Target::Unix(path) => {
                let stream =
                    UnixStream::connect(path).map_err(|err| connection_error(target, err))?;
                stream
                    .set_read_timeout(Some(timeout))
                    .and_then(|()| stream.set_write_timeout(Some(timeout)))
                    .map_err(|err| connection_error(target, err))?;
                Socket::Unix(stream)
            }
        };

        match tls {
            None => Ok(socket),
            Some((connector, peer_name)) => socket.into_tls(connector, peer_name),
        }
    }

    /// Wrap an already-connected TCP socket in TLS.
    fn into_tls(self, connector: &TlsConnector, peer_name: &str) -> Result<Socket, Error> {
        let Socket::Tcp(stream) = self else {
            return Err(Error::Tls(
                "tls is only supported over tcp transports".to_string(),
            ));
        };
        debug!("starting tls handshake with peer name `{peer_name}`");
        match connector.connect(peer_name, stream) {
            Ok(tls) => Ok(Socket::Tls(Box::new(tls))),
            Err(HandshakeError::WouldBlock(_)) => {
                Err(Error::Timeout("tls handshake timed out".to_string()))
            }
            Err(HandshakeError::Failure(err)) => Err(Error::Tls(err.to_string())),
        }
    }

    /// Release the transport. Best-effort: close errors are swallowed, a
    /// failed close leaves nothing the caller could do anyway.
    pub fn close(self) {
        match self {
            Socket::Tcp(stream) => {
                let _ = stream.shutdown(Shutdown::Both);
            }
            #[cfg(unix)]
            Socket::Unix(stream) => {
                let _ = stream.shutdown(Shutdown::Both);
            }
            Socket::Tls(mut tls) => {
                // Send close_notify if the peer is still there, then tear
                // down the TCP side.
                let _ = tls.shutdown();
                let _ = tls.get_ref().shutdown(Shutdown::Both);
            }
        }
    }

    /// Socket introspection for stream metadata proxying.
    pub fn metadata(&self) -> Metadata {
        match self {
            Socket::Tcp(stream) => Metadata {
                peer: stream.peer_addr().ok().map(|addr| addr.to_string()),
                read_timeout: stream.read_timeout().ok().flatten(),
                write_timeout: stream.write_timeout().ok().flatten(),
                tls: false,
            },
            #[cfg(unix)]
            Socket::Unix(stream) => Metadata {
                peer: stream
                    .peer_addr()
                    .ok()
                    .and_then(|addr| addr.as_pathname().map(|p| p.display().to_string())),
                read_timeout: stream.read_timeout().ok().flatten(),
                write_timeout: stream.write_timeout().ok().flatten(),
                tls: false,
            },
            Socket::Tls(tls) => {
                let stream = tls.get_ref();
                Metadata {
                    peer: stream.peer_addr().ok().map(|addr| addr.to_string()),
                    read_timeout: stream.read_timeout().ok().flatten(),
                    write_timeout: stream.write_timeout().ok().flatten(),
                    tls: true,
                }
            }
        }
    }
}

impl Read for Socket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Socket::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            Socket::Unix(stream) => stream.read(buf),
            Socket::Tls(tls) => tls.read(buf),
        }
    }
}

impl Write for Socket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Socket::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            Socket::Unix(stream) => stream.write(buf),
            Socket::Tls(tls) => tls.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Socket::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            Socket::Unix(stream) => stream.flush(),
            Socket::Tls(tls) => tls.flush(),
        }
    }
}

/// The connect phase truncates the timeout to whole seconds; a sub-second
/// timeout is used as-is since a zero connect timeout is invalid.
fn connect_phase_timeout(timeout: Duration) -> Duration {
    let whole = Duration::from_secs(timeout.as_secs());
    if whole.is_zero() { timeout } else { whole }
}

fn connection_error(target: &Target, err: io::Error) -> Error {
    if is_timeout(&err) {
        Error::Timeout(format!("connection to {target} timed out"))
    } else {
        Error::Connection {
            remote: target.to_string(),
            message: err.to_string(),
            source: Some(err),
        }
    }
}

//! Single-use response body streams.
//!
//! A [`SocketStream`] is a window onto the live socket left over after the
//! response head has been parsed. It is readable exactly once, forward-only
//! and not seekable: there is no rewinding a transport. When the response
//! carried a `Content-Length`, the stream knows its size and will never
//! read past it, so a consumer cannot block on a connection that has
//! nothing more to say.
//!
//! Ownership of the socket lives here once the stream is constructed:
//! dropping the stream closes the connection unless [`SocketStream::detach`]
//! handed the socket back out first.

use std::fmt;
use std::io::{self, Read};

use crate::network::error::{Error, is_timeout};
use crate::network::transport::{Metadata, Socket};

const DRAIN_CHUNK: usize = 8192;

/// A read-once body stream bound to a live socket.
#[derive(Debug)]
pub struct SocketStream {
    socket: Option<Socket>,
    size: Option<u64>,
    consumed: u64,
    seen_eof: bool,
    detached: bool,
    request: String,
}

impl SocketStream {
    /// Bind the remaining socket as a body stream.
    ///
    /// `size` is the declared body size (`None` for chunked or
    /// close-delimited bodies); `request` is a short description of the
    /// originating request, carried into timeout diagnostics.
    pub(crate) fn new(socket: Socket, size: Option<u64>, request: String) -> SocketStream {
        SocketStream {
            socket: Some(socket),
            size,
            consumed: 0,
            seen_eof: false,
            detached: false,
            request,
        }
    }

    /// The declared body size, `None` when unknown.
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    /// Bytes consumed so far.
    pub fn tell(&self) -> Result<u64, Error> {
        self.ensure_attached()?;
        Ok(self.consumed)
    }

    /// Whether the body has been fully consumed.
    pub fn eof(&self) -> Result<bool, Error> {
        self.ensure_attached()?;
        match self.size {
            Some(size) => Ok(self.seen_eof || self.consumed >= size),
            None => Ok(self.seen_eof),
        }
    }

    /// Socket introspection (peer address, timeouts, TLS flag).
    pub fn metadata(&self) -> Result<Metadata, Error> {
        match &self.socket {
            Some(socket) => Ok(socket.metadata()),
            None => Err(detached()),
        }
    }

    /// Read up to `buf.len()` bytes of body.
    ///
    /// With a known size, a fully consumed stream returns `Ok(0)` and reads
    /// are capped so no bytes beyond the declared size are taken off the
    /// socket. A single underlying read may return fewer bytes than asked;
    /// callers wanting an exact count use [`SocketStream::contents`].
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        self.ensure_attached()?;

        let cap = match self.size {
            Some(size) => {
                let remaining = size.saturating_sub(self.consumed);
                if remaining == 0 {
                    return Ok(0);
                }
                buf.len().min(remaining.min(usize::MAX as u64) as usize)
            }
            None => buf.len(),
        };
        if cap == 0 {
            return Ok(0);
        }

        let mut n = self.socket_read(&mut buf[..cap])?;
        if n == 0 && self.size.is_some() {
            // A zero read without an OS timeout flag is ambiguous; retry
            // once before deciding the peer closed early.
            n = self.socket_read(&mut buf[..cap])?;
            if n == 0 {
                self.seen_eof = true;
                return Err(Error::Stream(format!(
                    "connection closed before the declared body size was read ({} of {} bytes, {})",
                    self.consumed,
                    self.size.unwrap_or(0),
                    self.request,
                )));
            }
        }
        if n == 0 {
            self.seen_eof = true;
        }

        self.consumed += n as u64;
        Ok(n)
    }

    /// Drain the rest of the body.
    ///
    /// With an unknown size this reads to end-of-stream; with a known size
    /// it loops until exactly the remaining byte count has been produced or
    /// a read fails. Calling it again afterwards yields an empty vector.
    pub fn contents(&mut self) -> Result<Vec<u8>, Error> {
        self.ensure_attached()?;

        let mut contents = Vec::new();
        match self.size {
            None => {
                let mut chunk = [0u8; DRAIN_CHUNK];
                loop {
                    let n = self.socket_read(&mut chunk)?;
                    if n == 0 {
                        self.seen_eof = true;
                        break;
                    }
                    self.consumed += n as u64;
                    contents.extend_from_slice(&chunk[..n]);
                }
            }
            Some(size) => {
                let mut chunk = [0u8; DRAIN_CHUNK];
                while self.consumed < size {
                    let n = self.read(&mut chunk)?;
                    contents.extend_from_slice(&chunk[..n]);
                }
            }
        }

        Ok(contents)
    }

    /// Release the transport.
    ///
    /// Fails when the stream was already closed or detached. After a
    /// successful close every further operation fails with a stream error.
    pub fn close(&mut self) -> Result<(), Error> {
        match self.socket.take() {
            Some(socket) => {
                socket.close();
                Ok(())
            }
            None => Err(detached()),
        }
    }

    /// Take ownership of the underlying socket without closing it.
    ///
    /// The first call returns the socket and marks the stream detached;
    /// later calls return `None`. A detached stream never closes the
    /// socket, not even on drop.
    pub fn detach(&mut self) -> Option<Socket> {
        if self.detached {
            return None;
        }
        self.detached = true;
        self.socket.take()
    }

    fn ensure_attached(&self) -> Result<(), Error> {
        if self.detached || self.socket.is_none() {
            Err(detached())
        } else {
            Ok(())
        }
    }

    /// One underlying socket read with timeout classification.
    fn socket_read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        let request = &self.request;
        let socket = self.socket.as_mut().ok_or_else(detached)?;
        socket.read(buf).map_err(|err| {
            if is_timeout(&err) {
                Error::Timeout(format!("stream timed out while reading data ({request})"))
            } else {
                Error::Stream(format!("failed to read from stream: {err}"))
            }
        })
    }
}

impl Drop for SocketStream {
    fn drop(&mut self) {
        // Ownership semantics: an undetached stream still owns the socket
        // and must release it.
        if let Some(socket) = self.socket.take() {
            socket.close();
        }
    }
}

impl Read for SocketStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        SocketStream::read(self, buf).map_err(to_io)
    }
}

fn detached() -> Error {
    Error::Stream("stream is detached".to_string())
}

fn to_io(err: Error) -> io::Error {
    match &err {
        Error::Timeout(_) => io::Error::new(io::ErrorKind::TimedOut, err.to_string()),
        Error::Stream(message) if message == "stream is detached" => {
            io::Error::new(io::ErrorKind::NotConnected, err.to_string())
        }
        _ => io::Error::other(err.to_string()),
    }
}

/// The body of a received response.
///
/// Starts out as a plain [`SocketStream`]; the decoding pipeline may
/// replace it with a stack of decoder wrappers reading through that stream.
pub enum ResponseBody {
    /// The raw socket stream, exactly as framed on the wire.
    Stream(SocketStream),
    /// A decoder stack wrapping the socket stream.
    Decoded(Box<dyn Read + Send>),
    /// Explicitly closed; all operations fail.
    Closed,
}

impl ResponseBody {
    /// Read up to `buf.len()` decoded body bytes.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        match self {
            ResponseBody::Stream(stream) => stream.read(buf),
            ResponseBody::Decoded(reader) => reader
                .read(buf)
                .map_err(|err| Error::from_io(err, "failed to read from stream")),
            ResponseBody::Closed => Err(detached()),
        }
    }

    /// Drain the rest of the body. A second call yields an empty vector.
    pub fn contents(&mut self) -> Result<Vec<u8>, Error> {
        match self {
            ResponseBody::Stream(stream) => stream.contents(),
            ResponseBody::Decoded(reader) => {
                let mut contents = Vec::new();
                reader
                    .read_to_end(&mut contents)
                    .map_err(|err| Error::from_io(err, "failed to get contents of stream"))?;
                Ok(contents)
            }
            ResponseBody::Closed => Err(detached()),
        }
    }

    /// Close the body, releasing the socket it holds.
    pub fn close(&mut self) -> Result<(), Error> {
        match self {
            ResponseBody::Stream(stream) => {
                stream.close()?;
                *self = ResponseBody::Closed;
                Ok(())
            }
            ResponseBody::Decoded(_) => {
                // Dropping the decoder stack drops the socket stream, which
                // closes the socket.
                *self = ResponseBody::Closed;
                Ok(())
            }
            ResponseBody::Closed => Err(detached()),
        }
    }

    /// Detach the raw socket from an undecoded body.
    ///
    /// Returns `None` once detached, or when decoders own the stream (a
    /// decoded body no longer exposes raw transport framing).
    pub fn detach(&mut self) -> Option<Socket> {
        match self {
            ResponseBody::Stream(stream) => stream.detach(),
            _ => None,
        }
    }

    /// Declared size of the raw stream, when it has one.
    pub fn size(&self) -> Option<u64> {
        match self {
            ResponseBody::Stream(stream) => stream.size(),
            _ => None,
        }
    }

    /// Unwrap into a boxed reader for decorator stacking.
    pub(crate) fn into_reader(self) -> Box<dyn Read + Send> {
        match self {
            ResponseBody::Stream(stream) => Box::new(stream),
            ResponseBody::Decoded(reader) => reader,
            ResponseBody::Closed => Box::new(io::empty()),
        }
    }
}

impl Read for ResponseBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        ResponseBody::read(self, buf).map_err(to_io)
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseBody::Stream(stream) => f.debug_tuple("Stream").field(stream).finish(),
            ResponseBody::Decoded(_) => f.write_str("Decoded"),
            ResponseBody::Closed => f.write_str("Closed"),
        }
    }
}

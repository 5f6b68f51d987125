//! Request writing: serialization of a request onto an open socket.
//!
//! The head goes out as one write; the body is streamed through a fixed
//! write buffer, so memory stays bounded no matter how large the body is.
//! Bodies without a knowable size are wrapped by the client in a
//! [`ChunkedEncoder`] before they reach this writer.

use std::io::{self, Read, Write};

use log::debug;

use crate::network::error::{Error, is_timeout};
use crate::network::http::message::{Body, Request};

/// Serialize `request` onto `socket`.
///
/// Emits the request line, one line per header value in map order, a blank
/// line, then the body read `buffer_size` bytes at a time. A timed-out
/// write is a timeout error; any other write failure is a broken pipe and
/// the caller must close the socket.
pub(crate) fn write_request<W: Write>(
    socket: &mut W,
    request: &mut Request,
    buffer_size: usize,
) -> Result<(), Error> {
    let described = request.describe();
    debug!("{described} -> writing request");

    let mut head = format!(
        "{} {} HTTP/1.1\r\n",
        request.method,
        request.uri.request_target()
    );
    for (name, value) in request.headers.iter() {
        head.push_str(name);
        head.push_str(": ");
        head.push_str(value);
        head.push_str("\r\n");
    }
    head.push_str("\r\n");

    socket
        .write_all(head.as_bytes())
        .map_err(|err| write_error(err, &described))?;

    match &mut request.body {
        Body::Empty => {}
        Body::Bytes(bytes) => {
            for chunk in bytes.chunks(buffer_size.max(1)) {
                socket
                    .write_all(chunk)
                    .map_err(|err| write_error(err, &described))?;
            }
        }
        Body::Reader { reader, .. } => {
            let mut buffer = vec![0u8; buffer_size.max(1)];
            loop {
                let n = reader
                    .read(&mut buffer)
                    .map_err(|err| Error::Stream(format!("failed to read request body: {err}")))?;
                if n == 0 {
                    break;
                }
                socket
                    .write_all(&buffer[..n])
                    .map_err(|err| write_error(err, &described))?;
            }
        }
    }

    socket.flush().map_err(|err| write_error(err, &described))
}

fn write_error(err: io::Error, described: &str) -> Error {
    if is_timeout(&err) {
        Error::Timeout(format!(
            "stream timed out while writing request ({described})"
        ))
    } else {
        Error::BrokenPipe(format!("broken pipe while writing request: {err}"))
    }
}

/// A decorator that reframes an unsized byte source into chunked transfer
/// encoding, terminator chunk included.
pub(crate) struct ChunkedEncoder<R> {
    inner: R,
    frame: Vec<u8>,
    pos: usize,
    chunk_size: usize,
    finished: bool,
}

impl<R: Read> ChunkedEncoder<R> {
    pub(crate) fn new(inner: R, chunk_size: usize) -> ChunkedEncoder<R> {
        ChunkedEncoder {
            inner,
            frame: Vec::new(),
            pos: 0,
            chunk_size: chunk_size.max(1),
            finished: false,
        }
    }

    /// Pull the next chunk from the source and frame it.
    fn fill(&mut self) -> io::Result<()> {
        let mut data = vec![0u8; self.chunk_size];
        let n = self.inner.read(&mut data)?;
        self.frame.clear();
        self.pos = 0;
        if n == 0 {
            self.frame.extend_from_slice(b"0\r\n\r\n");
            self.finished = true;
        } else {
            self.frame.extend_from_slice(format!("{n:x}\r\n").as_bytes());
            self.frame.extend_from_slice(&data[..n]);
            self.frame.extend_from_slice(b"\r\n");
        }
        Ok(())
    }
}

impl<R: Read> Read for ChunkedEncoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos == self.frame.len() {
            if self.finished {
                return Ok(0);
            }
            self.fill()?;
        }
        let n = buf.len().min(self.frame.len() - self.pos);
        buf[..n].copy_from_slice(&self.frame[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::http::Method;
    use crate::network::http::decode::ChunkDecoder;
    use std::io::Cursor;

    #[test]
    fn serializes_request_line_headers_and_body() {
        let mut request = Request::new(Method::Post, "http://example.com/submit?x=1")
            .unwrap()
            .with_header("Host", "example.com")
            .with_header("Accept", "text/html")
            .with_header("Accept", "text/plain")
            .with_body("hello");

        let mut wire = Vec::new();
        write_request(&mut wire, &mut request, 8192).unwrap();

        let expected = b"POST /submit?x=1 HTTP/1.1\r\n\
            Host: example.com\r\n\
            Accept: text/html\r\n\
            Accept: text/plain\r\n\
            \r\n\
            hello";
        assert_eq!(wire, expected);
    }

    /// Accepts `budget` bytes, then fails every write.
    struct FailingSink {
        budget: usize,
    }

    impl Write for FailingSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer went away"));
            }
            let n = buf.len().min(self.budget);
            self.budget -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn failed_body_write_is_a_broken_pipe() {
        let mut request = Request::new(Method::Post, "http://example.com/submit")
            .unwrap()
            .with_body("payload that will not fit");
        // Enough budget for the head (25 bytes), not for the whole body.
        let mut sink = FailingSink { budget: 30 };
        let err = write_request(&mut sink, &mut request, 8).unwrap_err();
        assert!(matches!(err, Error::BrokenPipe(_)), "got {err:?}");
    }

    #[test]
    fn streams_reader_bodies_through_the_write_buffer() {
        let body = Body::from_reader(Cursor::new(b"abcdefgh".to_vec()), Some(8));
        let mut request = Request::new(Method::Put, "/upload").unwrap().with_body(body);

        let mut wire = Vec::new();
        // A tiny buffer forces multiple body writes.
        write_request(&mut wire, &mut request, 3).unwrap();

        assert!(wire.ends_with(b"\r\n\r\nabcdefgh"));
    }

    #[test]
    fn chunked_encoder_frames_and_terminates() {
        let mut encoder = ChunkedEncoder::new(Cursor::new(b"Wikipedia".to_vec()), 4);
        let mut encoded = Vec::new();
        encoder.read_to_end(&mut encoded).unwrap();
        assert_eq!(encoded, b"4\r\nWiki\r\n4\r\npedi\r\n1\r\na\r\n0\r\n\r\n");
    }

    #[test]
    fn chunk_encode_then_decode_reproduces_the_original() {
        let original: Vec<u8> = (0u32..2048).map(|i| (i % 251) as u8).collect();
        let encoder = ChunkedEncoder::new(Cursor::new(original.clone()), 100);
        let mut decoder = ChunkDecoder::new(encoder);
        let mut decoded = Vec::new();
        decoder.read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn empty_source_yields_only_the_terminator() {
        let mut encoder = ChunkedEncoder::new(Cursor::new(Vec::new()), 16);
        let mut encoded = Vec::new();
        encoder.read_to_end(&mut encoded).unwrap();
        assert_eq!(encoded, b"0\r\n\r\n");
    }
}

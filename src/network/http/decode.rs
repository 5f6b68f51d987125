//! Content-decoding pipeline.
//!
//! Unwraps `Transfer-Encoding` and `Content-Encoding` layers from a
//! received response by stacking decoder wrappers over the body stream.
//! Encodings are applied on the wire in listed order, so they are removed
//! back-to-front: the last listed encoding is the outermost wire layer and
//! becomes the decorator closest to the socket. Tokens the pipeline does
//! not understand stay in place, re-accumulated into a residual header
//! value; fully handled headers are removed.

use std::io::{self, Read};

use flate2::read::{DeflateDecoder, GzDecoder};
use log::trace;

use crate::network::http::message::Response;
use crate::network::http::reader::read_line;
use crate::network::http::stream::ResponseBody;

/// Decode a response body according to its framing and encoding headers.
///
/// `Transfer-Encoding` is processed before `Content-Encoding` so that
/// dechunking always sits innermost. `chunked`, `gzip` and `deflate`
/// (raw deflate) are handled; anything else is left encoded and its token
/// kept on the header.
pub fn decode_response(mut response: Response) -> Response {
    for name in ["Transfer-Encoding", "Content-Encoding"] {
        let tokens: Vec<String> = response
            .headers
            .get_all(name)
            .flat_map(|value| value.split(','))
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
            .collect();
        if tokens.is_empty() {
            continue;
        }

        let mut body = std::mem::replace(&mut response.body, ResponseBody::Closed);
        let mut residual = Vec::new();

        for token in tokens.iter().rev() {
            body = match token.to_ascii_lowercase().as_str() {
                "chunked" => {
                    trace!("stacking chunk decoder");
                    ResponseBody::Decoded(Box::new(ChunkDecoder::new(body.into_reader())))
                }
                "gzip" => {
                    trace!("stacking gzip decoder");
                    ResponseBody::Decoded(Box::new(GzDecoder::new(body.into_reader())))
                }
                "deflate" => {
                    trace!("stacking deflate decoder");
                    ResponseBody::Decoded(Box::new(DeflateDecoder::new(body.into_reader())))
                }
                _ => {
                    residual.push(token.clone());
                    body
                }
            };
        }

        response.body = body;

        if residual.is_empty() {
            response.headers.remove(name);
        } else {
            // Tokens were collected back-to-front; restore wire order.
            residual.reverse();
            response.headers.set(name, residual.join(", "));
        }
    }

    response
}

/// A decorator that reframes chunk-size-prefixed segments into a flat byte
/// stream. Stops at the zero-size terminator chunk, consuming any trailer
/// lines after it.
#[derive(Debug)]
pub(crate) struct ChunkDecoder<R> {
    inner: R,
    /// Bytes left in the current chunk.
    remaining: u64,
    done: bool,
}

impl<R: Read> ChunkDecoder<R> {
    pub(crate) fn new(inner: R) -> ChunkDecoder<R> {
        ChunkDecoder {
            inner,
            remaining: 0,
            done: false,
        }
    }

    /// Read and parse the next chunk-size line.
    fn next_chunk_size(&mut self) -> io::Result<u64> {
        let line = read_line(&mut self.inner)?.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "unexpected end of chunked body",
            )
        })?;
        // Chunk extensions (`;name=value`) are ignored.
        let size = line.split(';').next().unwrap_or("").trim();
        u64::from_str_radix(size, 16).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid chunk size line `{line}`"),
            )
        })
    }

    /// Consume trailer lines up to the blank line ending the body.
    fn consume_trailers(&mut self) -> io::Result<()> {
        while let Some(line) = read_line(&mut self.inner)? {
            if line.is_empty() {
                break;
            }
        }
        Ok(())
    }
}

impl<R: Read> Read for ChunkDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.done || buf.is_empty() {
            return Ok(0);
        }

        if self.remaining == 0 {
            let size = self.next_chunk_size()?;
            if size == 0 {
                self.consume_trailers()?;
                self.done = true;
                return Ok(0);
            }
            self.remaining = size;
        }

        let cap = buf.len().min(self.remaining.min(usize::MAX as u64) as usize);
        let n = self.inner.read(&mut buf[..cap])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed inside a chunk",
            ));
        }
        self.remaining -= n as u64;

        if self.remaining == 0 {
            // The CRLF that terminates the chunk payload.
            read_line(&mut self.inner)?;
        }

        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::http::message::HeaderMap;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::{Cursor, Write};

    fn response_with(headers: HeaderMap, wire_body: Vec<u8>) -> Response {
        Response {
            status: 200,
            reason: Some("OK".to_string()),
            version: "1.1".to_string(),
            headers,
            body: ResponseBody::Decoded(Box::new(Cursor::new(wire_body))),
        }
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn chunk(data: &[u8]) -> Vec<u8> {
        let mut framed = Vec::new();
        framed.extend_from_slice(format!("{:x}\r\n", data.len()).as_bytes());
        framed.extend_from_slice(data);
        framed.extend_from_slice(b"\r\n0\r\n\r\n");
        framed
    }

    #[test]
    fn dechunks_a_flat_stream() {
        let mut decoder = ChunkDecoder::new(Cursor::new(b"4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n"));
        let mut decoded = Vec::new();
        decoder.read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, b"Wikipedia");
    }

    #[test]
    fn ignores_chunk_extensions_and_trailers() {
        let wire = b"4;ext=1\r\nWiki\r\n0\r\nExpires: never\r\n\r\n";
        let mut decoder = ChunkDecoder::new(Cursor::new(wire));
        let mut decoded = Vec::new();
        decoder.read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, b"Wiki");
    }

    #[test]
    fn rejects_an_invalid_chunk_size() {
        let mut decoder = ChunkDecoder::new(Cursor::new(b"Z\r\nx\r\n0\r\n\r\n"));
        let mut decoded = Vec::new();
        let err = decoder.read_to_end(&mut decoded).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn rejects_a_truncated_chunked_body() {
        let mut decoder = ChunkDecoder::new(Cursor::new(b"5\r\npar"));
        let mut decoded = Vec::new();
        let err = decoder.read_to_end(&mut decoded).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn unwraps_chunked_then_gzip_and_removes_both_headers() {
        let original = b"Hello socket client".as_slice();
        let mut headers = HeaderMap::new();
        headers.append("Transfer-Encoding", "chunked");
        headers.append("Content-Encoding", "gzip");

        let mut response = decode_response(response_with(headers, chunk(&gzip(original))));

        assert_eq!(response.body.contents().unwrap(), original);
        assert!(!response.headers.contains("Transfer-Encoding"));
        assert!(!response.headers.contains("Content-Encoding"));
    }

    #[test]
    fn encoding_tokens_match_case_insensitively() {
        let mut headers = HeaderMap::new();
        headers.append("Content-Encoding", "GZIP");

        let mut response = decode_response(response_with(headers, gzip(b"data")));

        assert_eq!(response.body.contents().unwrap(), b"data");
        assert!(!response.headers.contains("Content-Encoding"));
    }

    #[test]
    fn unknown_tokens_stay_on_the_header() {
        let mut headers = HeaderMap::new();
        headers.append("Content-Encoding", "br, gzip");

        let mut response = decode_response(response_with(headers, gzip(b"pretend brotli")));

        assert_eq!(response.headers.get("Content-Encoding"), Some("br"));
        assert_eq!(response.body.contents().unwrap(), b"pretend brotli");
    }

    #[test]
    fn untouched_headers_survive() {
        let mut headers = HeaderMap::new();
        headers.append("Content-Type", "text/plain");

        let mut response = decode_response(response_with(headers, b"plain".to_vec()));

        assert_eq!(response.headers.get("Content-Type"), Some("text/plain"));
        assert_eq!(response.body.contents().unwrap(), b"plain");
    }
}

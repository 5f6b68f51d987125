//! Response reading: status line and header parsing off a socket.
//!
//! The head is read line by line, one byte at a time, so that not a single
//! body byte is pulled off the socket before ownership moves into the body
//! stream. Lines are CRLF or bare-LF terminated; parsing is deliberately
//! tolerant everywhere except the status line, without which there is no
//! response at all.

use std::io::{self, Read};

use log::{debug, trace};

use crate::network::error::{Error, is_timeout};
use crate::network::http::message::{HeaderMap, Request, Response};
use crate::network::http::stream::{ResponseBody, SocketStream};
use crate::network::transport::Socket;

/// Read one line, stripping the CRLF or LF terminator.
///
/// Returns `None` at end-of-stream with no bytes read. Reads a single byte
/// at a time; header sections are small and this keeps the reader from
/// consuming bytes that belong to the body.
pub(crate) fn read_line<R: Read>(reader: &mut R) -> io::Result<Option<String>> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        if reader.read(&mut byte)? == 0 {
            if line.is_empty() {
                return Ok(None);
            }
            break;
        }
        if byte[0] == b'\n' {
            break;
        }
        line.push(byte[0]);
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Ok(Some(String::from_utf8_lossy(&line).into_owned()))
}

/// The parsed response head, before a body stream is attached.
#[derive(Debug)]
struct Head {
    version: String,
    status: u16,
    reason: Option<String>,
    headers: HeaderMap,
}

/// Read a response off the socket.
///
/// Parses the status line and headers, then binds the remaining socket as
/// the body stream, sized from `Content-Length` when one is present. The
/// socket is owned by the returned response; on failure it is dropped here,
/// which closes it.
pub(crate) fn read_response(mut socket: Socket, request: &Request) -> Result<Response, Error> {
    let lines = read_head_lines(&mut socket, request)?;
    let head = parse_head(lines)?;
    debug!(
        "{} <- {} {}",
        request.describe(),
        head.status,
        head.reason.as_deref().unwrap_or("")
    );

    let size = declared_size(&head.headers);
    let stream = SocketStream::new(socket, size, request.describe());

    Ok(Response {
        status: head.status,
        reason: head.reason,
        version: head.version,
        headers: head.headers,
        body: ResponseBody::Stream(stream),
    })
}

/// Read header lines until the blank line ending the head, or end of
/// stream. A timed-out read during this phase is a timeout error; any
/// other read failure means the peer broke the framing.
fn read_head_lines<R: Read>(reader: &mut R, request: &Request) -> Result<Vec<String>, Error> {
    let mut lines = Vec::new();
    loop {
        let line = read_line(reader).map_err(|err| {
            if is_timeout(&err) {
                Error::Timeout(format!(
                    "error while reading response, stream timed out ({})",
                    request.describe()
                ))
            } else {
                Error::BrokenPipe("cannot read the response".to_string())
            }
        })?;
        match line {
            None => break,
            Some(line) if line.is_empty() => break,
            Some(line) => {
                trace!("header line: {line}");
                lines.push(line);
            }
        }
    }
    Ok(lines)
}

/// Parse the status line and header lines.
fn parse_head(mut lines: Vec<String>) -> Result<Head, Error> {
    if lines.is_empty() {
        return Err(cannot_read());
    }
    let status_line = lines.remove(0);

    let mut parts = status_line.splitn(3, ' ');
    let protocol = parts.next().unwrap_or("");
    let status = parts.next().ok_or_else(cannot_read)?;
    let reason = parts.next().filter(|r| !r.is_empty()).map(str::to_string);

    if protocol.len() < 3 {
        return Err(cannot_read());
    }
    // `HTTP/1.1` -> `1.1`; only the version token is kept. The token came
    // through a lossy conversion, so the cut may land inside a multibyte
    // character; that is just another malformed status line.
    let split = protocol.len() - 3;
    if !protocol.is_char_boundary(split) {
        return Err(cannot_read());
    }
    let version = protocol[split..].to_string();
    let status = status.parse::<u16>().map_err(|_| cannot_read())?;

    let mut headers = HeaderMap::new();
    for line in lines {
        match line.split_once(':') {
            Some((name, value)) => headers.append(name.trim(), value.trim()),
            // A header line without a colon is treated as present with an
            // empty value.
            None => headers.append(line.trim(), ""),
        }
    }

    Ok(Head {
        version,
        status,
        reason,
        headers,
    })
}

/// Body size declared by `Content-Length`, when it parses to a
/// non-negative integer. Chunked and close-delimited bodies have none.
fn declared_size(headers: &HeaderMap) -> Option<u64> {
    let value = headers.get("Content-Length")?;
    match value.trim().parse::<i64>() {
        Ok(size) if size >= 0 => Some(size as u64),
        _ => None,
    }
}

fn cannot_read() -> Error {
    Error::BrokenPipe("cannot read the response".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn head_of(raw: &[u8]) -> Result<Head, Error> {
        let mut cursor = Cursor::new(raw.to_vec());
        let request = Request::new(crate::network::http::Method::Get, "/").unwrap();
        let lines = read_head_lines(&mut cursor, &request)?;
        parse_head(lines)
    }

    #[test]
    fn parses_a_full_head() {
        let head = head_of(b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 4\r\n\r\nTest").unwrap();
        assert_eq!(head.version, "1.1");
        assert_eq!(head.status, 200);
        assert_eq!(head.reason.as_deref(), Some("OK"));
        assert_eq!(head.headers.get("Content-Type"), Some("text/plain"));
        assert_eq!(declared_size(&head.headers), Some(4));
    }

    #[test]
    fn tolerates_bare_lf_line_endings() {
        let head = head_of(b"HTTP/1.0 204 No Content\nServer: stub\n\n").unwrap();
        assert_eq!(head.version, "1.0");
        assert_eq!(head.status, 204);
        assert_eq!(head.reason.as_deref(), Some("No Content"));
        assert_eq!(head.headers.get("Server"), Some("stub"));
    }

    #[test]
    fn reason_phrase_is_optional() {
        let head = head_of(b"HTTP/1.1 200\r\n\r\n").unwrap();
        assert_eq!(head.status, 200);
        assert_eq!(head.reason, None);
    }

    #[test]
    fn repeated_headers_accumulate_in_order() {
        let head = head_of(b"HTTP/1.1 200 OK\r\nSet-Cookie: a=1\r\nSet-Cookie: b=2\r\n\r\n").unwrap();
        let values: Vec<&str> = head.headers.get_all("Set-Cookie").collect();
        assert_eq!(values, vec!["a=1", "b=2"]);
    }

    #[test]
    fn header_line_without_colon_keeps_an_empty_value() {
        let head = head_of(b"HTTP/1.1 200 OK\r\nX-Flag\r\n\r\n").unwrap();
        assert_eq!(head.headers.get("X-Flag"), Some(""));
    }

    #[test]
    fn missing_status_line_is_a_broken_pipe() {
        assert!(matches!(head_of(b""), Err(Error::BrokenPipe(_))));
        assert!(matches!(head_of(b"garbage\r\n\r\n"), Err(Error::BrokenPipe(_))));
        assert!(matches!(
            head_of(b"HTTP/1.1 abc OK\r\n\r\n"),
            Err(Error::BrokenPipe(_))
        ));
    }

    #[test]
    fn multibyte_protocol_token_is_a_broken_pipe_not_a_panic() {
        // Two 2-byte characters: taking the last 3 bytes would cut one of
        // them in half.
        assert!(matches!(
            head_of("\u{e9}\u{e9} 200 OK\r\n\r\n".as_bytes()),
            Err(Error::BrokenPipe(_))
        ));
        // An invalid byte becomes a 3-byte replacement character after the
        // lossy conversion, putting the cut inside it.
        assert!(matches!(
            head_of(b"\xffxy 200 OK\r\n\r\n"),
            Err(Error::BrokenPipe(_))
        ));
    }

    #[test]
    fn negative_or_malformed_content_length_means_unknown_size() {
        let head = head_of(b"HTTP/1.1 200 OK\r\nContent-Length: -1\r\n\r\n").unwrap();
        assert_eq!(declared_size(&head.headers), None);
        let head = head_of(b"HTTP/1.1 200 OK\r\nContent-Length: abc\r\n\r\n").unwrap();
        assert_eq!(declared_size(&head.headers), None);
    }
}

//! Request and response value types.
//!
//! These are deliberately small: a method, a URI, an insertion-ordered
//! header multimap and a body. The client only ever adds or overrides
//! headers and possibly re-wraps the body; it never needs a message type
//! richer than what the wire format itself expresses.

use std::fmt;
use std::io;

use crate::network::error::Error;
use crate::network::http::stream::ResponseBody;
use crate::network::transport::split_host_port;

/// HTTP request methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET
    Get,
    /// HEAD
    Head,
    /// POST
    Post,
    /// PUT
    Put,
    /// DELETE
    Delete,
    /// PATCH
    Patch,
    /// OPTIONS
    Options,
}

impl Method {
    /// The wire representation of the method.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request target URI.
///
/// Either absolute (`http://host:port/path?query`) or origin-form
/// (`/path?query`). Origin-form targets have an empty scheme and host; the
/// connection endpoint then has to come from the client configuration or a
/// `Host` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uri {
    /// URI scheme, lowercased. Empty for origin-form targets.
    pub scheme: String,
    /// Host component. Empty for origin-form targets.
    pub host: String,
    /// Explicit port, if one was written.
    pub port: Option<u16>,
    /// Path component, never empty (`/` at minimum).
    pub path: String,
    /// Query string without the leading `?`.
    pub query: Option<String>,
}

impl Uri {
    /// Parse an absolute or origin-form URI.
    pub fn parse(input: &str) -> Result<Uri, Error> {
        if input.is_empty() {
            return Err(Error::InvalidRequest("empty request uri".to_string()));
        }

        if input.starts_with('/') {
            let (path, query) = split_path_query(input);
            return Ok(Uri {
                scheme: String::new(),
                host: String::new(),
                port: None,
                path,
                query,
            });
        }

        let (scheme, rest) = input.split_once("://").ok_or_else(|| {
            Error::InvalidRequest(format!(
                "`{input}` is neither an absolute uri nor an origin-form target"
            ))
        })?;

        let (authority, path_and_query) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, "/"),
        };
        // Userinfo is accepted but not used for anything.
        let authority = authority.rsplit_once('@').map_or(authority, |(_, a)| a);

        let (host, port) = split_host_port(authority).map_err(Error::InvalidRequest)?;
        let (path, query) = split_path_query(path_and_query);

        Ok(Uri {
            scheme: scheme.to_ascii_lowercase(),
            host: host.to_string(),
            port,
            path,
            query,
        })
    }

    /// The request-target written on the request line.
    pub fn request_target(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{}", self.path, query),
            None => self.path.clone(),
        }
    }

    /// Whether the scheme implies TLS.
    pub fn is_https(&self) -> bool {
        self.scheme == "https"
    }
}

fn split_path_query(input: &str) -> (String, Option<String>) {
    match input.split_once('?') {
        Some((path, query)) => (path.to_string(), Some(query.to_string())),
        None => (input.to_string(), None),
    }
}

/// An insertion-ordered header multimap with case-insensitive names.
///
/// Multiple values under one name accumulate in encounter order and are
/// serialized as one line per value.
#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    /// An empty map.
    pub fn new() -> HeaderMap {
        HeaderMap::default()
    }

    /// Append a value, keeping any existing values under the same name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Replace all values under `name` with a single one.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.remove(name);
        self.entries.push((name.to_string(), value.into()));
    }

    /// First value under `name`, if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values under `name`, in insertion order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.entries
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether any value exists under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Drop every value under `name`.
    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// All `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of header lines.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map holds no headers.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A request body.
///
/// Bodies with a knowable size are framed with `Content-Length`; a reader
/// without a size is re-wrapped by the client in chunked transfer encoding.
pub enum Body {
    /// No body at all. No framing header is emitted.
    Empty,
    /// An in-memory body with an exactly known size.
    Bytes(Vec<u8>),
    /// A streaming body, with an optional declared size.
    Reader {
        /// Source of the body bytes.
        reader: Box<dyn io::Read + Send>,
        /// Total size when known; `None` forces chunked framing.
        size: Option<u64>,
    },
}

impl Body {
    /// Wrap a reader as a streaming body.
    pub fn from_reader(reader: impl io::Read + Send + 'static, size: Option<u64>) -> Body {
        Body::Reader {
            reader: Box::new(reader),
            size,
        }
    }

    /// The body size, when knowable.
    pub fn size(&self) -> Option<u64> {
        match self {
            Body::Empty => Some(0),
            Body::Bytes(bytes) => Some(bytes.len() as u64),
            Body::Reader { size, .. } => *size,
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Body::Empty"),
            Body::Bytes(bytes) => f.debug_tuple("Body::Bytes").field(&bytes.len()).finish(),
            Body::Reader { size, .. } => f.debug_struct("Body::Reader").field("size", size).finish(),
        }
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Body {
        Body::Bytes(bytes)
    }
}

impl From<&[u8]> for Body {
    fn from(bytes: &[u8]) -> Body {
        Body::Bytes(bytes.to_vec())
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Body {
        Body::Bytes(text.as_bytes().to_vec())
    }
}

impl From<String> for Body {
    fn from(text: String) -> Body {
        Body::Bytes(text.into_bytes())
    }
}

/// An outgoing HTTP request.
#[derive(Debug)]
pub struct Request {
    /// Request method.
    pub method: Method,
    /// Target URI (absolute or origin-form).
    pub uri: Uri,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request body.
    pub body: Body,
}

impl Request {
    /// Build a request for `uri` with an empty body.
    pub fn new(method: Method, uri: &str) -> Result<Request, Error> {
        Ok(Request {
            method,
            uri: Uri::parse(uri)?,
            headers: HeaderMap::new(),
            body: Body::Empty,
        })
    }

    /// Append a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Request {
        self.headers.append(name, value);
        self
    }

    /// Attach a body.
    pub fn with_body(mut self, body: impl Into<Body>) -> Request {
        self.body = body.into();
        self
    }

    /// A short request description for diagnostics (`GET /path`).
    pub(crate) fn describe(&self) -> String {
        format!("{} {}", self.method, self.uri.request_target())
    }
}

/// A received HTTP response.
///
/// The body is a not-yet-read stream over the remaining socket; drain it
/// with [`ResponseBody::contents`], read it incrementally or close it.
#[derive(Debug)]
pub struct Response {
    /// Status code.
    pub status: u16,
    /// Reason phrase, `None` when the status line omitted one.
    pub reason: Option<String>,
    /// Protocol version token, e.g. `1.1`.
    pub version: String,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body stream.
    pub body: ResponseBody,
}

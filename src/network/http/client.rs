//! Client orchestration.
//!
//! One `send` call is one socket: resolve the remote endpoint, open the
//! transport, rewrite the outgoing headers, write the request, read the
//! response head, attach the body stream and run the decoding pipeline.
//! On any failure after the socket opened, the socket is closed before the
//! error escapes. There are no retries and no connection reuse.

use log::debug;

use crate::network::error::Error;
use crate::network::http::config::Config;
use crate::network::http::decode::decode_response;
use crate::network::http::message::{Body, Request, Response};
use crate::network::http::reader::read_response;
use crate::network::http::writer::{ChunkedEncoder, write_request};
use crate::network::transport::{Socket, Target};

/// A socket HTTP client.
///
/// Holds nothing but its resolved, immutable [`Config`]; every `send`
/// opens its own socket, so concurrent calls on one client are safe.
#[derive(Debug)]
pub struct Client {
    config: Config,
}

impl Client {
    /// Create a client from a resolved configuration.
    pub fn new(config: Config) -> Client {
        Client { config }
    }

    /// The client's configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Send a request and return the response with a not-yet-read body.
    ///
    /// The caller owns the returned body stream and must drain or close
    /// it; dropping it closes the connection.
    pub fn send(&self, mut request: Request) -> Result<Response, Error> {
        if !request.headers.contains("Connection") {
            request.headers.append("Connection", "close");
        }

        let use_tls = self
            .config
            .ssl()
            .or(self.config.remote_tls_hint())
            .unwrap_or_else(|| request.uri.is_https());

        let target = match self.config.remote_target() {
            Some(target) => target.clone(),
            None => determine_remote(&request, use_tls)?,
        };

        prepare_headers(&mut request, self.config.write_buffer_size());
        debug!("{} via {target} (tls: {use_tls})", request.describe());

        let socket = if use_tls {
            let connector = self.config.tls_connector()?;
            let peer_name = self.peer_name(&target)?;
            Socket::open(&target, self.config.timeout(), Some((&connector, &peer_name)))?
        } else {
            Socket::open(&target, self.config.timeout(), None)?
        };

        let mut socket = socket;
        if let Err(err) = write_request(&mut socket, &mut request, self.config.write_buffer_size())
        {
            socket.close();
            return Err(err);
        }

        // On a read failure the socket is still owned by the reader and is
        // dropped (closed) there before the error propagates.
        let response = read_response(socket, &request)?;

        Ok(decode_response(response))
    }

    /// The name presented to the TLS peer: an explicit override, or the
    /// target host.
    fn peer_name(&self, target: &Target) -> Result<String, Error> {
        if let Some(name) = &self.config.tls_options().peer_name {
            return Ok(name.clone());
        }
        match target {
            Target::Tcp { host, .. } => Ok(host.clone()),
            #[cfg(unix)]
            Target::Unix(_) => Err(Error::Tls(
                "tls over a unix socket requires an explicit peer name".to_string(),
            )),
        }
    }
}

/// Derive the connection endpoint from the request itself.
///
/// Priority: the URI's host and port (port defaulting to 443 when TLS is
/// in play, 80 otherwise); when the URI has no host, the literal value of
/// a `Host` header. A request with neither is unsendable.
fn determine_remote(request: &Request, use_tls: bool) -> Result<Target, Error> {
    let default_port = if use_tls { 443 } else { 80 };

    if request.uri.host.is_empty() {
        let Some(host_header) = request.headers.get("Host") else {
            return Err(Error::InvalidRequest(
                "remote is not defined and we cannot determine a connection endpoint \
                 for this request (no Host header)"
                    .to_string(),
            ));
        };
        let endpoint = if host_header.contains(':') {
            format!("tcp://{host_header}")
        } else {
            format!("tcp://{host_header}:{default_port}")
        };
        return Target::parse(&endpoint).map_err(Error::InvalidRequest);
    }

    Ok(Target::Tcp {
        host: request.uri.host.clone(),
        port: request.uri.port.unwrap_or(default_port),
    })
}

/// Rewrite the outgoing headers and re-frame the body when needed.
///
/// Adds `Host` (from the URI, `localhost` for hostless requests against
/// preconfigured remotes), body framing (`Content-Length` for knowable
/// sizes, chunked re-wrapping otherwise) and the `Accept-Encoding`/`TE`
/// capability advertisements. Caller-provided headers always win.
fn prepare_headers(request: &mut Request, write_buffer_size: usize) {
    if !request.headers.contains("Host") {
        request.headers.append("Host", host_header_value(request));
    }

    if !request.headers.contains("Content-Length") && !request.headers.contains("Transfer-Encoding")
    {
        match request.body.size() {
            Some(size) => {
                if !matches!(request.body, Body::Empty) {
                    request.headers.append("Content-Length", size.to_string());
                }
            }
            None => {
                // Only reader bodies can have an unknown size.
                if let Body::Reader { reader, .. } =
                    std::mem::replace(&mut request.body, Body::Empty)
                {
                    request.body =
                        Body::from_reader(ChunkedEncoder::new(reader, write_buffer_size), None);
                    request.headers.append("Transfer-Encoding", "chunked");
                }
            }
        }
    }

    if !request.headers.contains("Accept-Encoding") {
        request.headers.append("Accept-Encoding", "gzip, deflate");
    }
    if !request.headers.contains("TE") {
        request.headers.append("TE", "gzip, deflate, chunked");
    }
}

/// The `Host` value for the outgoing request, derived from the URI.
fn host_header_value(request: &Request) -> String {
    let uri = &request.uri;
    if uri.host.is_empty() {
        // Hostless request sent through a configured remote (typically a
        // unix socket daemon).
        return "localhost".to_string();
    }
    match uri.port {
        Some(port) if Some(port) != default_port_for(uri) => format!("{}:{port}", uri.host),
        _ => uri.host.clone(),
    }
}

fn default_port_for(uri: &crate::network::http::message::Uri) -> Option<u16> {
    match uri.scheme.as_str() {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    }
}

//! HTTP/1.1 implemented directly on a transport socket.
//!
//! The pieces mirror the life of a request: a resolved [`Config`], a
//! [`Request`] serialized by the writer, a socket opened by the transport
//! layer, a response head parsed by the reader, a [`SocketStream`] body
//! bound to the remaining socket, and a decoding pipeline that unwraps
//! `Transfer-Encoding` / `Content-Encoding` layers before the [`Response`]
//! is handed back.

mod client;
mod config;
mod decode;
mod message;
mod reader;
mod stream;
mod writer;

pub use client::Client;
pub use config::{Config, ConfigBuilder, TlsOptions};
pub use decode::decode_response;
pub use message::{Body, HeaderMap, Method, Request, Response, Uri};
pub use stream::{ResponseBody, SocketStream};

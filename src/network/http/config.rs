//! Client configuration resolution.
//!
//! A [`ConfigBuilder`] plays the role of an options resolver: callers set
//! only what they care about, [`ConfigBuilder::build`] validates and fills
//! in defaults, and the resulting [`Config`] is immutable for the life of
//! the client. Option typos and type mismatches are unrepresentable here;
//! value-level mistakes (zero timeout, unparsable remote) fail with
//! [`Error::Configuration`] before any socket is touched.

use std::fmt;
use std::time::Duration;

use native_tls::{Certificate, Identity, Protocol, TlsConnector};

use crate::network::error::Error;
use crate::network::transport::Target;

/// Default request timeout, matching the usual platform default socket
/// timeout of 60 seconds.
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default write buffer size for streaming request bodies.
pub(crate) const DEFAULT_WRITE_BUFFER_SIZE: usize = 8192;

/// Declarative TLS context options.
///
/// The actual connector is built lazily from these when a TLS connection is
/// first needed, unless a prebuilt connector was supplied on the builder.
pub struct TlsOptions {
    /// Peer name presented for SNI and certificate verification. Defaults
    /// to the target host; required for TLS over targets without one.
    pub peer_name: Option<String>,
    /// Extra trusted root certificates.
    pub root_certificates: Vec<Certificate>,
    /// Client certificate identity.
    pub identity: Option<Identity>,
    /// Disable certificate verification. For test fixtures only.
    pub accept_invalid_certs: bool,
    /// Disable hostname verification.
    pub accept_invalid_hostnames: bool,
    /// Minimum accepted protocol version.
    pub min_protocol: Option<Protocol>,
    /// Maximum accepted protocol version.
    pub max_protocol: Option<Protocol>,
}

impl Default for TlsOptions {
    fn default() -> TlsOptions {
        TlsOptions {
            peer_name: None,
            root_certificates: Vec::new(),
            identity: None,
            accept_invalid_certs: false,
            accept_invalid_hostnames: false,
            // TLS 1.2 is the floor.
            min_protocol: Some(Protocol::Tlsv12),
            max_protocol: None,
        }
    }
}

impl fmt::Debug for TlsOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsOptions")
            .field("peer_name", &self.peer_name)
            .field("root_certificates", &self.root_certificates.len())
            .field("identity", &self.identity.is_some())
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .field("accept_invalid_hostnames", &self.accept_invalid_hostnames)
            .finish_non_exhaustive()
    }
}

/// Resolved, immutable client configuration.
///
/// Always carries a concrete timeout and write buffer size, even when the
/// caller specified neither.
pub struct Config {
    remote: Option<String>,
    remote_target: Option<Target>,
    remote_tls_hint: Option<bool>,
    timeout: Duration,
    ssl: Option<bool>,
    write_buffer_size: usize,
    tls: TlsOptions,
    connector: Option<TlsConnector>,
}

impl Config {
    /// Start building a configuration.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// The configured remote endpoint, if any.
    pub fn remote(&self) -> Option<&str> {
        self.remote.as_deref()
    }

    /// The request timeout applied to connect, read and write phases.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The explicit TLS on/off switch, `None` meaning "decide per request
    /// from the scheme".
    pub fn ssl(&self) -> Option<bool> {
        self.ssl
    }

    /// Buffer size used when streaming request bodies.
    pub fn write_buffer_size(&self) -> usize {
        self.write_buffer_size
    }

    /// The TLS context options.
    pub fn tls_options(&self) -> &TlsOptions {
        &self.tls
    }

    pub(crate) fn remote_target(&self) -> Option<&Target> {
        self.remote_target.as_ref()
    }

    pub(crate) fn remote_tls_hint(&self) -> Option<bool> {
        self.remote_tls_hint
    }

    /// Build (or clone, when prebuilt) the TLS connector.
    pub(crate) fn tls_connector(&self) -> Result<TlsConnector, Error> {
        if let Some(connector) = &self.connector {
            return Ok(connector.clone());
        }

        let mut builder = TlsConnector::builder();
        builder.min_protocol_version(self.tls.min_protocol);
        builder.max_protocol_version(self.tls.max_protocol);
        for certificate in &self.tls.root_certificates {
            builder.add_root_certificate(certificate.clone());
        }
        if let Some(identity) = &self.tls.identity {
            builder.identity(identity.clone());
        }
        if self.tls.accept_invalid_certs {
            builder.danger_accept_invalid_certs(true);
        }
        if self.tls.accept_invalid_hostnames {
            builder.danger_accept_invalid_hostnames(true);
        }
        builder.build().map_err(|err| Error::Tls(err.to_string()))
    }
}

impl Default for Config {
    fn default() -> Config {
        Config {
            remote: None,
            remote_target: None,
            remote_tls_hint: None,
            timeout: DEFAULT_TIMEOUT,
            ssl: None,
            write_buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
            tls: TlsOptions::default(),
            connector: None,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("remote", &self.remote)
            .field("timeout", &self.timeout)
            .field("ssl", &self.ssl)
            .field("write_buffer_size", &self.write_buffer_size)
            .field("tls", &self.tls)
            .field("prebuilt_connector", &self.connector.is_some())
            .finish()
    }
}

/// Builder for [`Config`].
#[derive(Default)]
pub struct ConfigBuilder {
    remote: Option<String>,
    timeout: Option<Duration>,
    ssl: Option<bool>,
    write_buffer_size: Option<usize>,
    tls: Option<TlsOptions>,
    connector: Option<TlsConnector>,
}

impl ConfigBuilder {
    /// Set the remote endpoint (`tcp://host:port`, `unix:///path`, or an
    /// `http(s)://` daemon address).
    pub fn remote(mut self, remote: impl Into<String>) -> ConfigBuilder {
        self.remote = Some(remote.into());
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> ConfigBuilder {
        self.timeout = Some(timeout);
        self
    }

    /// Set the request timeout in milliseconds.
    pub fn timeout_ms(mut self, timeout_ms: u64) -> ConfigBuilder {
        self.timeout = Some(Duration::from_millis(timeout_ms));
        self
    }

    /// Force TLS on or off instead of deriving it per request.
    pub fn ssl(mut self, ssl: bool) -> ConfigBuilder {
        self.ssl = Some(ssl);
        self
    }

    /// Set the write buffer size for streaming request bodies.
    pub fn write_buffer_size(mut self, size: usize) -> ConfigBuilder {
        self.write_buffer_size = Some(size);
        self
    }

    /// Set the declarative TLS context options.
    pub fn tls_options(mut self, tls: TlsOptions) -> ConfigBuilder {
        self.tls = Some(tls);
        self
    }

    /// Supply a prebuilt TLS connector, bypassing [`TlsOptions`].
    pub fn tls_connector(mut self, connector: TlsConnector) -> ConfigBuilder {
        self.connector = Some(connector);
        self
    }

    /// Validate and resolve the configuration.
    pub fn build(self) -> Result<Config, Error> {
        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);
        if timeout.is_zero() {
            return Err(Error::Configuration(
                "timeout must be greater than zero".to_string(),
            ));
        }

        let write_buffer_size = self.write_buffer_size.unwrap_or(DEFAULT_WRITE_BUFFER_SIZE);
        if write_buffer_size == 0 {
            return Err(Error::Configuration(
                "write_buffer_size must be greater than zero".to_string(),
            ));
        }

        let (remote_target, remote_tls_hint) = match &self.remote {
            Some(remote) => {
                let target = Target::parse(remote)
                    .map_err(|message| Error::Configuration(format!("remote {message}")))?;
                (Some(target), Target::tls_hint(remote))
            }
            None => (None, None),
        };

        Ok(Config {
            remote: self.remote,
            remote_target,
            remote_tls_hint,
            timeout,
            ssl: self.ssl,
            write_buffer_size,
            tls: self.tls.unwrap_or_default(),
            connector: self.connector,
        })
    }
}

impl fmt::Debug for ConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigBuilder")
            .field("remote", &self.remote)
            .field("timeout", &self.timeout)
            .field("ssl", &self.ssl)
            .field("write_buffer_size", &self.write_buffer_size)
            .finish_non_exhaustive()
    }
}

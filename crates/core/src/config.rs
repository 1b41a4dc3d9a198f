//! Settings of the forwarding engine.
//!
//! A [`ForwardConfig`] is built once with [`ForwardConfig::builder`] or
//! deserialized from the host's configuration, and shared by every forward.
//! Durations are given in milliseconds when deserialized:
//!
//! ```json
//! { "read_timeout": 30000, "buffer_size": 65536, "unframed_body": "read_until_close" }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rustls::ClientConfig;
use serde::{Deserialize, Deserializer};

use crate::codec::header::MAX_HEADER_BYTES;
use crate::ensure;
use crate::protocol::ProxyError;

const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_RELAY_STOP_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// What to do with a response body announced by neither `Content-Length` nor
/// `Transfer-Encoding: chunked`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnframedBodyPolicy {
    /// Relay the head only.
    #[default]
    Skip,
    /// Relay bytes until the upstream closes or stays silent for the read timeout.
    ReadUntilClose,
}

/// How the certificate of an `https` upstream is verified.
#[derive(Clone, Default)]
pub enum TrustPolicy {
    /// Accept any certificate, for self-signed internal services.
    #[default]
    TrustAll,
    /// Verify against the Mozilla root store shipped with `webpki-roots`.
    WebPkiRoots,
    /// A client configuration prepared by the host.
    Custom(Arc<ClientConfig>),
}

impl fmt::Debug for TrustPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrustPolicy::TrustAll => f.write_str("TrustAll"),
            TrustPolicy::WebPkiRoots => f.write_str("WebPkiRoots"),
            TrustPolicy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ForwardConfig {
    /// Upper bound of a single read on the upstream leg.
    #[serde(deserialize_with = "millis")]
    read_timeout: Duration,
    #[serde(deserialize_with = "millis")]
    connect_timeout: Duration,
    /// How long the request body relay may take to stop on its own.
    #[serde(deserialize_with = "millis")]
    relay_stop_timeout: Duration,
    /// Size of the transfer buffers in both directions.
    buffer_size: usize,
    max_header_bytes: usize,
    unframed_body: UnframedBodyPolicy,
    #[serde(skip)]
    trust_policy: TrustPolicy,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            read_timeout: DEFAULT_READ_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            relay_stop_timeout: DEFAULT_RELAY_STOP_TIMEOUT,
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_header_bytes: MAX_HEADER_BYTES,
            unframed_body: UnframedBodyPolicy::default(),
            trust_policy: TrustPolicy::default(),
        }
    }
}

impl ForwardConfig {
    pub fn builder() -> ForwardConfigBuilder {
        ForwardConfigBuilder { config: ForwardConfig::default() }
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn relay_stop_timeout(&self) -> Duration {
        self.relay_stop_timeout
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn max_header_bytes(&self) -> usize {
        self.max_header_bytes
    }

    pub fn unframed_body(&self) -> UnframedBodyPolicy {
        self.unframed_body
    }

    pub fn trust_policy(&self) -> &TrustPolicy {
        &self.trust_policy
    }

    /// Checks a deserialized configuration, [`ForwardConfigBuilder::build`] does this already.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Config`] for a zero buffer size, header limit or timeout.
    pub fn validate(&self) -> Result<(), ProxyError> {
        ensure!(self.buffer_size > 0, ProxyError::config("buffer_size must be positive"));
        ensure!(self.max_header_bytes > 0, ProxyError::config("max_header_bytes must be positive"));
        ensure!(!self.read_timeout.is_zero(), ProxyError::config("read_timeout must be positive"));
        ensure!(!self.connect_timeout.is_zero(), ProxyError::config("connect_timeout must be positive"));
        ensure!(!self.relay_stop_timeout.is_zero(), ProxyError::config("relay_stop_timeout must be positive"));
        Ok(())
    }
}

#[derive(Debug)]
pub struct ForwardConfigBuilder {
    config: ForwardConfig,
}

impl ForwardConfigBuilder {
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn relay_stop_timeout(mut self, timeout: Duration) -> Self {
        self.config.relay_stop_timeout = timeout;
        self
    }

    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.config.buffer_size = buffer_size;
        self
    }

    pub fn max_header_bytes(mut self, max_header_bytes: usize) -> Self {
        self.config.max_header_bytes = max_header_bytes;
        self
    }

    pub fn unframed_body(mut self, policy: UnframedBodyPolicy) -> Self {
        self.config.unframed_body = policy;
        self
    }

    pub fn trust_policy(mut self, trust_policy: TrustPolicy) -> Self {
        self.config.trust_policy = trust_policy;
        self
    }

    pub fn build(self) -> Result<ForwardConfig, ProxyError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

fn millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
}

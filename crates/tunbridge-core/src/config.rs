//! Engine Configuration
//!
//! Validates raw, untrusted host parameters and builds the immutable
//! configuration handed to the tunneling engine: a file-descriptor-backed
//! device reference, a URI-shaped proxy connection string, and tunables.

use serde::{Deserialize, Serialize};

use crate::engine::EngineKey;

/// Default MTU handed to the engine.
pub const DEFAULT_MTU: u16 = 1500;

/// Proxy protocols the engine understands.
///
/// Incoming proxy type strings are converted into this closed set exactly
/// once, at the validation boundary; everything downstream works with the
/// variant, never with the raw string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyProtocol {
    Socks5,
    Socks4,
    Http,
    Https,
    Shadowsocks,
    Relay,
    /// Forward without a proxy. No server endpoint required.
    Direct,
    /// Drop all traffic. No server endpoint required.
    Reject,
}

impl ProxyProtocol {
    /// Parse a host-supplied proxy type string, case-insensitively.
    ///
    /// `"ss"` is accepted as an alias for shadowsocks. Returns `None` for
    /// anything outside the supported set.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "socks5" => Some(Self::Socks5),
            "socks4" => Some(Self::Socks4),
            "http" => Some(Self::Http),
            "https" => Some(Self::Https),
            "shadowsocks" | "ss" => Some(Self::Shadowsocks),
            "relay" => Some(Self::Relay),
            "direct" => Some(Self::Direct),
            "reject" => Some(Self::Reject),
            _ => None,
        }
    }

    /// URL scheme prefix for this protocol.
    ///
    /// `https` shares the `http://` scheme: the engine speaks plain HTTP
    /// CONNECT to both.
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Socks5 => "socks5://",
            Self::Socks4 => "socks4://",
            Self::Http | Self::Https => "http://",
            Self::Shadowsocks => "ss://",
            Self::Relay => "relay://",
            Self::Direct => "direct://",
            Self::Reject => "reject://",
        }
    }

    /// Whether this protocol requires a server host and port.
    pub fn needs_endpoint(&self) -> bool {
        !matches!(self, Self::Direct | Self::Reject)
    }
}

impl std::fmt::Display for ProxyProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Socks5 => "socks5",
            Self::Socks4 => "socks4",
            Self::Http => "http",
            Self::Https => "https",
            Self::Shadowsocks => "shadowsocks",
            Self::Relay => "relay",
            Self::Direct => "direct",
            Self::Reject => "reject",
        };
        write!(f, "{}", name)
    }
}

/// Engine log verbosity, forwarded verbatim to the engine key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    /// Default: keeps the engine from spamming the host log.
    #[default]
    Warning,
    Error,
    Silent,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Silent => "silent",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Validated proxy endpoint, ready to render as a connection string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyEndpoint {
    pub protocol: ProxyProtocol,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl ProxyEndpoint {
    /// Render the URI-shaped connection string the engine consumes.
    ///
    /// Credentials: `user:pass@` when both are present; when only a
    /// password was supplied it doubles as the username (`pass:pass@`).
    /// Callers that only ever had a single secret historically passed it
    /// as "password", and the engine expects both fields populated.
    pub fn url(&self) -> String {
        if !self.protocol.needs_endpoint() {
            return self.protocol.scheme().to_string();
        }

        let mut url = String::from(self.protocol.scheme());

        let username = self.username.trim();
        let password = self.password.trim();
        if !username.is_empty() && !password.is_empty() {
            url.push_str(&format!("{}:{}@", username, password));
        } else if !password.is_empty() {
            url.push_str(&format!("{}:{}@", password, password));
        }

        url.push_str(&format!("{}:{}", self.host, self.port));
        url
    }
}

/// Configuration validation errors.
///
/// Always resolved before the engine collaborator is touched.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid file descriptor: {0}")]
    InvalidFd(i32),

    #[error("proxy server cannot be empty for {0} protocol")]
    EmptyServer(ProxyProtocol),

    #[error("invalid proxy port: {0} (must be 1-65535)")]
    InvalidPort(i32),

    #[error("unsupported proxy type: {0}")]
    UnsupportedProxyType(String),
}

/// Immutable engine configuration.
///
/// Built once by [`ConfigBuilder`] (or [`Config::with_proxy_url`] for the
/// pre-assembled URL path) and never mutated afterwards; ownership moves
/// into the controller that starts with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Tunnel device MTU.
    pub mtu: u16,
    /// Device reference, encoded as `fd://<fd>`.
    pub device: String,
    /// Proxy connection string.
    pub proxy: String,
    /// Engine log verbosity.
    pub log_level: LogLevel,
}

impl Config {
    /// Build a configuration around a pre-assembled proxy URL, skipping
    /// protocol-specific construction.
    ///
    /// Only the caller's word says the URL is well formed; the bridge
    /// checks for a scheme separator before calling this.
    pub fn with_proxy_url(fd: i32, proxy_url: impl Into<String>) -> Self {
        Self {
            mtu: DEFAULT_MTU,
            device: device_for_fd(fd),
            proxy: proxy_url.into(),
            log_level: LogLevel::default(),
        }
    }

    /// Map this configuration 1:1 onto the engine collaborator's key.
    pub fn engine_key(&self) -> EngineKey {
        EngineKey {
            mtu: self.mtu,
            device: self.device.clone(),
            proxy: self.proxy.clone(),
            log_level: self.log_level.as_str().to_string(),
        }
    }
}

/// Deterministic device encoding for a tun file descriptor.
fn device_for_fd(fd: i32) -> String {
    format!("fd://{}", fd)
}

/// Builds a validated [`Config`] from raw host parameters.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    fd: i32,
    proxy_type: String,
    server: String,
    port: i32,
    username: String,
    password: String,
    mtu: u16,
    log_level: LogLevel,
}

impl ConfigBuilder {
    /// Start building a configuration for the given tun file descriptor.
    pub fn new(fd: i32) -> Self {
        Self {
            fd,
            proxy_type: String::new(),
            server: String::new(),
            port: 0,
            username: String::new(),
            password: String::new(),
            mtu: DEFAULT_MTU,
            log_level: LogLevel::default(),
        }
    }

    /// Set the proxy type, server host, and port as received from the host.
    pub fn proxy(mut self, proxy_type: &str, server: &str, port: i32) -> Self {
        self.proxy_type = proxy_type.to_string();
        self.server = server.to_string();
        self.port = port;
        self
    }

    /// Set proxy credentials. Empty strings mean "not supplied".
    pub fn credentials(mut self, username: &str, password: &str) -> Self {
        self.username = username.to_string();
        self.password = password.to_string();
        self
    }

    pub fn mtu(mut self, mtu: u16) -> Self {
        self.mtu = mtu;
        self
    }

    pub fn log_level(mut self, log_level: LogLevel) -> Self {
        self.log_level = log_level;
        self
    }

    /// Validate and build the immutable configuration.
    ///
    /// Direct and reject protocols skip the server/port checks and render
    /// a protocol-only connection string.
    pub fn build(self) -> Result<Config, ConfigError> {
        if self.fd <= 0 {
            return Err(ConfigError::InvalidFd(self.fd));
        }

        let protocol = ProxyProtocol::parse(&self.proxy_type)
            .ok_or_else(|| ConfigError::UnsupportedProxyType(self.proxy_type.clone()))?;

        let host = self.server.trim();
        if protocol.needs_endpoint() {
            if host.is_empty() {
                return Err(ConfigError::EmptyServer(protocol));
            }
            if self.port <= 0 || self.port > 65535 {
                return Err(ConfigError::InvalidPort(self.port));
            }
        }

        let endpoint = ProxyEndpoint {
            protocol,
            host: host.to_string(),
            port: self.port.clamp(0, 65535) as u16,
            username: self.username,
            password: self.password,
        };

        Ok(Config {
            mtu: self.mtu,
            device: device_for_fd(self.fd),
            proxy: endpoint.url(),
            log_level: self.log_level,
        })
    }
}

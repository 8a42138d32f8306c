use std::fmt;
use std::str::FromStr;

use crate::error::{Result, TransportError};
use crate::stream::LinkStream;
use crate::tcp::{TcpEndpoint, DEFAULT_PORT};

#[cfg(feature = "serial")]
use crate::serial::SerialEndpoint;

/// Where a Labnode can be reached.
///
/// Parses from `tcp://host[:port]`, `serial://<path>`, a bare `host[:port]`,
/// or a bare device path (`/dev/...`, `COMn`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp(TcpEndpoint),
    #[cfg(feature = "serial")]
    Serial(SerialEndpoint),
}

impl Endpoint {
    /// Open the link.
    pub async fn open(&self) -> Result<LinkStream> {
        match self {
            Endpoint::Tcp(tcp) => tcp.open().await,
            #[cfg(feature = "serial")]
            Endpoint::Serial(serial) => serial.open().await,
        }
    }
}

impl From<TcpEndpoint> for Endpoint {
    fn from(value: TcpEndpoint) -> Self {
        Endpoint::Tcp(value)
    }
}

#[cfg(feature = "serial")]
impl From<SerialEndpoint> for Endpoint {
    fn from(value: SerialEndpoint) -> Self {
        Endpoint::Serial(value)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp(tcp) => tcp.fmt(f),
            #[cfg(feature = "serial")]
            Endpoint::Serial(serial) => serial.fmt(f),
        }
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(invalid(input, "endpoint must not be empty"));
        }

        if let Some(rest) = trimmed.strip_prefix("tcp://") {
            return parse_tcp(input, rest).map(Endpoint::Tcp);
        }
        if let Some(path) = trimmed.strip_prefix("serial://") {
            return parse_serial(input, path);
        }
        if looks_like_device_path(trimmed) {
            return parse_serial(input, trimmed);
        }
        parse_tcp(input, trimmed).map(Endpoint::Tcp)
    }
}

fn looks_like_device_path(value: &str) -> bool {
    value.starts_with('/')
        || value
            .get(..3)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("com"))
            && value[3..].chars().all(|c| c.is_ascii_digit())
            && value.len() > 3
}

fn parse_tcp(input: &str, rest: &str) -> Result<TcpEndpoint> {
    let rest = rest.trim_end_matches('/');
    if rest.is_empty() {
        return Err(invalid(input, "missing host"));
    }

    // [v6-addr]:port
    if let Some(bracketed) = rest.strip_prefix('[') {
        let (host, tail) = bracketed
            .split_once(']')
            .ok_or_else(|| invalid(input, "unterminated '[' in host"))?;
        let port = match tail.strip_prefix(':') {
            Some(port) => parse_port(input, port)?,
            None if tail.is_empty() => DEFAULT_PORT,
            None => return Err(invalid(input, "unexpected characters after ']'")),
        };
        return Ok(TcpEndpoint::new(host, port));
    }

    match rest.rsplit_once(':') {
        // A bare IPv6 address without brackets has several colons.
        Some((host, _)) if host.contains(':') => Ok(TcpEndpoint::new(rest, DEFAULT_PORT)),
        Some((host, port)) => {
            if host.is_empty() {
                return Err(invalid(input, "missing host"));
            }
            Ok(TcpEndpoint::new(host, parse_port(input, port)?))
        }
        None => Ok(TcpEndpoint::new(rest, DEFAULT_PORT)),
    }
}

fn parse_port(input: &str, port: &str) -> Result<u16> {
    match port.parse::<u16>() {
        Ok(0) | Err(_) => Err(invalid(input, &format!("invalid port '{port}'"))),
        Ok(port) => Ok(port),
    }
}

#[cfg(feature = "serial")]
fn parse_serial(input: &str, path: &str) -> Result<Endpoint> {
    if path.is_empty() {
        return Err(invalid(input, "missing device path"));
    }
    Ok(Endpoint::Serial(SerialEndpoint::new(path)))
}

#[cfg(not(feature = "serial"))]
fn parse_serial(input: &str, _path: &str) -> Result<Endpoint> {
    Err(invalid(input, "serial support is not compiled in"))
}

fn invalid(input: &str, reason: &str) -> TransportError {
    TransportError::InvalidEndpoint {
        input: input.to_string(),
        reason: reason.to_string(),
    }
}

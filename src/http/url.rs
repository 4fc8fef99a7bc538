//! Target URL decomposition
//!
//! Splits `http://host[:port][/path][?query]` into the pieces the request
//! builder and the connection need.

use super::{Error, Result, DEFAULT_HTTP_PORT};
use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};

/// Benchmark target decomposed from an absolute `http://` URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    host: String,
    port: Option<u16>,
    path: String,
    query: Option<String>,
}

impl Target {
    /// Parse an absolute URL.
    ///
    /// Supports formats:
    /// - `http://host`
    /// - `http://host:port`
    /// - `http://host:port/path?query`
    /// - `http://[::1]:port/path`
    ///
    /// Any `#fragment` is dropped. Only the `http` scheme is accepted.
    pub fn parse(url: &str) -> Result<Self> {
        let url = url.trim();
        let scheme_end = url
            .find("://")
            .ok_or_else(|| Error::InvalidUrl(format!("missing scheme: {}", url)))?;
        let scheme = &url[..scheme_end];
        if !scheme.eq_ignore_ascii_case("http") {
            return Err(Error::UnsupportedScheme(scheme.to_string()));
        }

        let rest = &url[scheme_end + 3..];
        let rest = match rest.find('#') {
            Some(idx) => &rest[..idx],
            None => rest,
        };

        let (path_part, query) = match rest.find('?') {
            Some(idx) => {
                let q = &rest[idx + 1..];
                let query = if q.is_empty() { None } else { Some(q.to_string()) };
                (&rest[..idx], query)
            }
            None => (rest, None),
        };

        let (authority, path) = match path_part.find('/') {
            Some(idx) => (&path_part[..idx], &path_part[idx..]),
            None => (path_part, "/"),
        };

        let (host, port) = parse_authority(authority)?;
        if host.is_empty() {
            return Err(Error::InvalidUrl(format!("missing host: {}", url)));
        }

        Ok(Target {
            host: host.to_string(),
            port,
            path: path.to_string(),
            query,
        })
    }

    /// Host name or IP literal (IPv6 keeps its brackets)
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port, falling back to 80
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_HTTP_PORT)
    }

    /// Path component, `/` when the URL had none
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Query string without the leading `?`
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Value for the `Host` header: the port is only spelled out when it
    /// differs from the default.
    pub fn host_header(&self) -> String {
        match self.port {
            Some(port) if port != DEFAULT_HTTP_PORT => format!("{}:{}", self.host, port),
            _ => self.host.clone(),
        }
    }

    /// Request target for the request line (`path[?query]`)
    pub fn request_uri(&self) -> String {
        match &self.query {
            Some(q) => format!("{}?{}", self.path, q),
            None => self.path.clone(),
        }
    }

    /// Resolve the host to socket addresses
    pub fn resolve(&self) -> Result<Vec<SocketAddr>> {
        let host = self
            .host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(&self.host);

        let addrs: Vec<SocketAddr> = (host, self.port())
            .to_socket_addrs()
            .map_err(|e| Error::Resolve(format!("{}: {}", self.host_header(), e)))?
            .collect();

        if addrs.is_empty() {
            return Err(Error::Resolve(self.host_header()));
        }
        Ok(addrs)
    }
}

/// Parse authority (`host[:port]`)
fn parse_authority(authority: &str) -> Result<(&str, Option<u16>)> {
    let invalid = || Error::InvalidUrl(format!("invalid authority: {}", authority));

    if authority.starts_with('[') {
        let bracket_end = authority.find(']').ok_or_else(invalid)?;
        let host = &authority[..=bracket_end];
        let rest = &authority[bracket_end + 1..];

        if rest.is_empty() {
            return Ok((host, None));
        }
        let port = rest
            .strip_prefix(':')
            .and_then(|p| p.parse::<u16>().ok())
            .ok_or_else(invalid)?;
        return Ok((host, Some(port)));
    }

    match authority.rfind(':') {
        Some(idx) => {
            let port = authority[idx + 1..].parse::<u16>().map_err(|_| invalid())?;
            Ok((&authority[..idx], Some(port)))
        }
        None => Ok((authority, None)),
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "http://{}{}", self.host_header(), self.request_uri())
    }
}

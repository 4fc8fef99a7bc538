//! Pipelined request construction
//!
//! A benchmark replays the exact same GET request over and over, so the
//! wire bytes are rendered once and shared between every burst and every
//! connection.

use super::{Error, Result, Target, CRLF};
use bytes::{BufMut, Bytes, BytesMut};

/// Immutable request: the decomposed target and its rendered wire bytes
#[derive(Debug, Clone)]
pub struct Request {
    target: Target,
    wire: Bytes,
}

impl Request {
    /// Create a builder for the given absolute URL
    pub fn builder(url: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(url)
    }

    /// Target the request is addressed to
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Wire bytes of a single request
    pub fn as_bytes(&self) -> &[u8] {
        &self.wire
    }

    /// Cheap handle on the wire bytes
    pub fn wire(&self) -> Bytes {
        self.wire.clone()
    }
}

/// Builder for [`Request`]
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    url: String,
    headers: Vec<String>,
}

impl RequestBuilder {
    /// Create a builder for the given absolute URL
    pub fn new(url: impl Into<String>) -> Self {
        RequestBuilder {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    /// Add an extra header given as a `Name: value` line
    pub fn header(mut self, line: impl Into<String>) -> Self {
        self.headers.push(line.into());
        self
    }

    /// Add several `Name: value` header lines
    pub fn headers<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.headers.extend(lines.into_iter().map(Into::into));
        self
    }

    /// Render the request.
    ///
    /// Fails when the URL cannot be decomposed into host, port and path, or
    /// when a header line has no name or contains a line break.
    pub fn build(self) -> Result<Request> {
        let target = Target::parse(&self.url)?;

        let mut wire = BytesMut::with_capacity(128);
        wire.put_slice(b"GET ");
        wire.put_slice(target.request_uri().as_bytes());
        wire.put_slice(b" HTTP/1.1");
        wire.put_slice(CRLF);

        wire.put_slice(b"Host: ");
        wire.put_slice(target.host_header().as_bytes());
        wire.put_slice(CRLF);

        for line in &self.headers {
            let (name, value) = split_header_line(line)?;
            wire.put_slice(name.as_bytes());
            wire.put_slice(b": ");
            wire.put_slice(value.as_bytes());
            wire.put_slice(CRLF);
        }

        wire.put_slice(b"Content-Length: 0");
        wire.put_slice(CRLF);
        wire.put_slice(CRLF);

        Ok(Request {
            target,
            wire: wire.freeze(),
        })
    }
}

/// Split a `Name: value` line at its first colon
fn split_header_line(line: &str) -> Result<(&str, &str)> {
    if line.contains(['\r', '\n']) {
        return Err(Error::InvalidHeader(format!("line break in header: {:?}", line)));
    }

    let (name, value) = line
        .split_once(':')
        .ok_or_else(|| Error::InvalidHeader(format!("missing ':' in header: {}", line)))?;

    let name = name.trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        return Err(Error::InvalidHeader(format!("invalid header name: {}", line)));
    }

    Ok((name, value.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_minimal_request() {
        let request = RequestBuilder::new("http://localhost:5000/plaintext").build().unwrap();
        assert_eq!(
            request.as_bytes(),
            b"GET /plaintext HTTP/1.1\r\nHost: localhost:5000\r\nContent-Length: 0\r\n\r\n"
        );
    }

    #[test]
    fn test_build_with_query_and_headers() {
        let request = Request::builder("http://example.com/db?queries=20")
            .header("Accept: application/json")
            .headers(["Connection:keep-alive"])
            .build()
            .unwrap();

        let expected = "GET /db?queries=20 HTTP/1.1\r\n\
                        Host: example.com\r\n\
                        Accept: application/json\r\n\
                        Connection: keep-alive\r\n\
                        Content-Length: 0\r\n\
                        \r\n";
        assert_eq!(request.as_bytes(), expected.as_bytes());
        assert_eq!(request.target().port(), 80);
    }

    #[test]
    fn test_wire_is_shared() {
        let request = RequestBuilder::new("http://127.0.0.1:8080/").build().unwrap();
        let a = request.wire();
        let b = request.clone().wire();
        assert_eq!(a.as_ptr(), b.as_ptr());
    }

    #[test]
    fn test_build_rejects_bad_input() {
        assert!(matches!(
            RequestBuilder::new("not a url").build(),
            Err(Error::InvalidUrl(_))
        ));
        assert!(matches!(
            RequestBuilder::new("http://localhost/").header("NoColon").build(),
            Err(Error::InvalidHeader(_))
        ));
        assert!(matches!(
            RequestBuilder::new("http://localhost/").header(": value").build(),
            Err(Error::InvalidHeader(_))
        ));
        assert!(matches!(
            RequestBuilder::new("http://localhost/")
                .header("X-Evil: a\r\nInjected: b")
                .build(),
            Err(Error::InvalidHeader(_))
        ));
    }
}

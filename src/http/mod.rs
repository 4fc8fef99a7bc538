//! Pipelined HTTP/1.1 client core
//!
//! This module holds everything needed to drive a throughput benchmark over
//! raw sockets: request construction, an incremental response parser and a
//! connection that writes bursts of pipelined requests.
//!
//! # Architecture
//!
//! - `RequestBuilder` turns a target URL and extra header lines into one
//!   immutable `Request` whose bytes are replayed for every request
//! - `ResponseParser` is a byte-level state machine that mutates an
//!   `HttpResponse` record as bytes arrive, in arbitrarily small fragments
//! - `Connection` owns the socket, a background fill thread feeding a
//!   bounded hand-off, and the read buffer the parser consumes from
//! - `Burst` is the lazy sequence of responses for one pipelined write
//!
//! # Examples
//!
//! ```no_run
//! use pipeline_bench::http::{Connection, RequestBuilder, ResponseState};
//!
//! let request = RequestBuilder::new("http://127.0.0.1:8080/plaintext")
//!     .header("Accept: text/plain")
//!     .build()
//!     .unwrap();
//!
//! let mut connection = Connection::new(request, 16);
//! connection.connect().unwrap();
//!
//! for response in connection.send_requests().unwrap() {
//!     assert_eq!(response.state(), ResponseState::Completed);
//!     assert_eq!(response.status_code(), 200);
//! }
//! ```

pub mod connection;
pub mod parser;
pub mod request;
pub mod response;
pub mod url;

pub use connection::{Burst, Connection};
pub use parser::{parse, Progress, ResponseParser};
pub use request::{Request, RequestBuilder};
pub use response::{HttpResponse, ProtocolError, ResponseState};
pub use url::Target;

use std::net::SocketAddr;

/// Result type for HTTP operations
pub type Result<T> = std::result::Result<T, Error>;

/// HTTP operation errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Could not resolve {0}")]
    Resolve(String),

    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Connection is not open")]
    NotConnected,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Connection has unread responses from an aborted burst")]
    OutOfSync,

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// CRLF line ending
pub const CRLF: &[u8] = b"\r\n";

/// The only protocol version token accepted on a status line
pub const HTTP_11: &[u8] = b"HTTP/1.1";

/// Longest Content-Length value text accepted, in bytes
pub const MAX_CONTENT_LENGTH_TEXT: usize = 128;

/// Longest status, header or chunk-size line accepted, in bytes
pub const MAX_LINE_LENGTH: usize = 8192;

/// Default HTTP port
pub const DEFAULT_HTTP_PORT: u16 = 80;

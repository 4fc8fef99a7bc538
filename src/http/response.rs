//! Per-request response record
//!
//! One `HttpResponse` is created for each slot of a burst. Only the parser
//! mutates it; the worker reads it once to classify the outcome.

use std::fmt;

/// Parsing state of a response.
///
/// States only ever move forward. `Completed` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseState {
    #[default]
    StartLine,
    Headers,
    Body,
    ChunkedBody,
    Completed,
    Error,
}

impl ResponseState {
    /// Whether the parser is done with this record
    pub fn is_terminal(&self) -> bool {
        matches!(self, ResponseState::Completed | ResponseState::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseState::StartLine => "start-line",
            ResponseState::Headers => "headers",
            ResponseState::Body => "body",
            ResponseState::ChunkedBody => "chunked-body",
            ResponseState::Completed => "completed",
            ResponseState::Error => "error",
        }
    }
}

impl fmt::Display for ResponseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Framing violations that drive a response to [`ResponseState::Error`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("unsupported HTTP version: {0}")]
    InvalidVersion(String),

    #[error("invalid status code: {0}")]
    InvalidStatusCode(String),

    #[error("header line without ':': {0}")]
    InvalidHeaderLine(String),

    #[error("invalid Content-Length: {0}")]
    InvalidContentLength(String),

    #[error("Content-Length value of {0} bytes exceeds limit")]
    ContentLengthTooLong(usize),

    #[error("invalid chunk size: {0}")]
    InvalidChunkSize(String),

    #[error("missing CRLF after chunk data")]
    MissingChunkTerminator,

    #[error("missing CRLF after last chunk")]
    MissingFinalTerminator,

    #[error("line exceeds {0} bytes")]
    LineTooLong(usize),
}

/// Parse progress for a single response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    pub(crate) state: ResponseState,
    pub(crate) status_code: u16,
    pub(crate) content_length: u64,
    pub(crate) content_length_remaining: u64,
    pub(crate) has_content_length_header: bool,
    pub(crate) last_chunk_remaining: u64,
    /// Chunk data fully read, its trailing CRLF not yet seen
    pub(crate) chunk_terminator_pending: bool,
    pub(crate) error: Option<ProtocolError>,
}

impl HttpResponse {
    /// Fresh record in the `StartLine` state
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ResponseState {
        self.state
    }

    /// Status code from the status line, 0 until it has been parsed
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    /// Declared Content-Length, or the sum of chunk sizes seen so far
    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    /// Body bytes still expected under Content-Length framing
    pub fn content_length_remaining(&self) -> u64 {
        self.content_length_remaining
    }

    pub fn has_content_length_header(&self) -> bool {
        self.has_content_length_header
    }

    /// Bytes left in the chunk currently being read
    pub fn last_chunk_remaining(&self) -> u64 {
        self.last_chunk_remaining
    }

    /// Why the record ended up in the `Error` state
    pub fn error(&self) -> Option<&ProtocolError> {
        self.error.as_ref()
    }

    pub fn is_completed(&self) -> bool {
        self.state == ResponseState::Completed
    }

    /// Completed with a 2xx status
    pub fn is_success(&self) -> bool {
        self.is_completed() && (200..300).contains(&self.status_code)
    }

    pub(crate) fn fail(&mut self, error: ProtocolError) {
        self.state = ResponseState::Error;
        self.error = Some(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_response() {
        let response = HttpResponse::new();
        assert_eq!(response.state(), ResponseState::StartLine);
        assert_eq!(response.status_code(), 0);
        assert!(!response.has_content_length_header());
        assert!(response.error().is_none());
        assert!(!response.state().is_terminal());
    }

    #[test]
    fn test_fail_is_terminal() {
        let mut response = HttpResponse::new();
        response.fail(ProtocolError::InvalidVersion("HTTP/1.0".into()));
        assert!(response.state().is_terminal());
        assert_eq!(response.state().to_string(), "error");
        assert_eq!(
            response.error().unwrap().to_string(),
            "unsupported HTTP version: HTTP/1.0"
        );
    }

    #[test]
    fn test_is_success() {
        let mut response = HttpResponse::new();
        response.status_code = 204;
        assert!(!response.is_success());

        response.state = ResponseState::Completed;
        assert!(response.is_success());

        response.status_code = 503;
        assert!(response.is_completed());
        assert!(!response.is_success());
    }
}

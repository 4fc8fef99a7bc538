//! Incremental HTTP/1.1 response parsing
//!
//! The parser is a state machine over an [`HttpResponse`] record. It is fed
//! whatever bytes are currently buffered, interprets as much as it can and
//! reports how many bytes it consumed. Bytes it could not interpret yet stay
//! with the caller and are passed again, extended, on the next call.
//!
//! Only three things matter for framing: the status line, the
//! `Content-Length` header and chunked transfer encoding. Every other header
//! is read and dropped.

use super::{
    HttpResponse, ProtocolError, ResponseState, CRLF, HTTP_11, MAX_CONTENT_LENGTH_TEXT,
    MAX_LINE_LENGTH,
};

/// Outcome of one parse call.
///
/// `consumed` bytes were fully interpreted and must be dropped by the
/// caller. `examined` (never less than `consumed`) is how far the parser
/// looked; the bytes between the two hold no line terminator, so a later
/// call can resume its search after them instead of rescanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    pub consumed: usize,
    pub examined: usize,
}

/// Parse as much of `buf` as possible into `response`.
///
/// Must not be called again once the response reached a terminal state.
pub fn parse(buf: &[u8], response: &mut HttpResponse) -> Progress {
    parse_from(buf, 0, response)
}

/// Response parser that remembers how far the unconsumed remainder has
/// already been scanned between calls.
#[derive(Debug, Default)]
pub struct ResponseParser {
    scanned: usize,
}

impl ResponseParser {
    /// Create a new response parser
    pub fn new() -> Self {
        ResponseParser { scanned: 0 }
    }

    /// Feed the buffered bytes, returning how many were consumed.
    ///
    /// `buf` must start with the remainder left unconsumed by the previous
    /// call for the same response.
    pub fn parse(&mut self, buf: &[u8], response: &mut HttpResponse) -> usize {
        debug_assert!(!response.state().is_terminal());

        let progress = parse_from(buf, self.scanned.min(buf.len()), response);
        self.scanned = if response.state().is_terminal() {
            0
        } else {
            progress.examined - progress.consumed
        };
        progress.consumed
    }

    /// Bytes of the unconsumed remainder already known to hold no line end
    pub fn scanned(&self) -> usize {
        self.scanned
    }

    /// Reset the parser for reuse
    pub fn reset(&mut self) {
        self.scanned = 0;
    }
}

enum Step {
    /// State changed, keep going
    Continue,
    /// Out of bytes
    Pending,
}

fn parse_from(buf: &[u8], scanned: usize, response: &mut HttpResponse) -> Progress {
    let mut cursor = Cursor {
        buf,
        pos: 0,
        scanned,
        examined: 0,
    };

    loop {
        let step = match response.state {
            ResponseState::StartLine => parse_start_line(&mut cursor, response),
            ResponseState::Headers => parse_headers(&mut cursor, response),
            ResponseState::Body => parse_body(&mut cursor, response),
            ResponseState::ChunkedBody => parse_chunked_body(&mut cursor, response),
            ResponseState::Completed | ResponseState::Error => break,
        };

        if let Step::Pending = step {
            break;
        }
    }

    Progress {
        consumed: cursor.pos,
        examined: cursor.examined.max(cursor.pos),
    }
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
    scanned: usize,
    examined: usize,
}

impl<'a> Cursor<'a> {
    fn remaining(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    /// Find the next complete line without consuming it.
    ///
    /// Returns the line without its CRLF and the position just past the
    /// CRLF, or `None` when the line is not fully buffered yet.
    fn peek_line(&mut self) -> Result<Option<(&'a [u8], usize)>, ProtocolError> {
        // A CR may already sit at the end of the scanned region
        let from = self.pos.max(self.scanned.saturating_sub(1));

        match find_crlf(&self.buf[from..]) {
            Some(offset) => {
                let end = from + offset;
                if end - self.pos > MAX_LINE_LENGTH {
                    return Err(ProtocolError::LineTooLong(MAX_LINE_LENGTH));
                }
                Ok(Some((&self.buf[self.pos..end], end + CRLF.len())))
            }
            None => {
                if self.buf.len() - self.pos > MAX_LINE_LENGTH {
                    return Err(ProtocolError::LineTooLong(MAX_LINE_LENGTH));
                }
                self.examined = self.buf.len();
                Ok(None)
            }
        }
    }

    /// Whether a CRLF starts at `at`; `None` until enough bytes arrive
    fn crlf_at(&self, at: usize) -> Option<bool> {
        match self.buf.get(at..at + CRLF.len()) {
            Some(bytes) => Some(bytes == CRLF),
            None => match self.buf.get(at) {
                Some(&b) if b != b'\r' => Some(false),
                _ => None,
            },
        }
    }

    fn advance(&mut self, n: usize) {
        self.pos += n;
    }
}

fn parse_start_line(cursor: &mut Cursor<'_>, response: &mut HttpResponse) -> Step {
    let (line, end) = match cursor.peek_line() {
        Ok(Some(found)) => found,
        Ok(None) => {
            // The version token can be checked before the line is complete
            let rest = cursor.remaining();
            if let Some(space) = rest.iter().position(|&b| b == b' ') {
                if &rest[..space] != HTTP_11 {
                    response.fail(ProtocolError::InvalidVersion(lossy(&rest[..space])));
                    return Step::Continue;
                }
            }
            return Step::Pending;
        }
        Err(e) => {
            response.fail(e);
            return Step::Continue;
        }
    };
    cursor.pos = end;

    let (version, rest) = split_once(line, b' ');
    if version != HTTP_11 {
        response.fail(ProtocolError::InvalidVersion(lossy(version)));
        return Step::Continue;
    }

    // Whatever follows the status code is the reason phrase
    let (code, _reason) = split_once(rest, b' ');
    match parse_decimal(code).and_then(|c| u16::try_from(c).ok()) {
        Some(status_code) => {
            response.status_code = status_code;
            response.state = ResponseState::Headers;
        }
        None => response.fail(ProtocolError::InvalidStatusCode(lossy(code))),
    }
    Step::Continue
}

fn parse_headers(cursor: &mut Cursor<'_>, response: &mut HttpResponse) -> Step {
    loop {
        let (line, end) = match cursor.peek_line() {
            Ok(Some(found)) => found,
            Ok(None) => return Step::Pending,
            Err(e) => {
                response.fail(e);
                return Step::Continue;
            }
        };
        cursor.pos = end;

        if line.is_empty() {
            response.state = if response.has_content_length_header {
                ResponseState::Body
            } else {
                ResponseState::ChunkedBody
            };
            return Step::Continue;
        }

        parse_header(line, response);
        if response.state == ResponseState::Error {
            return Step::Continue;
        }
    }
}

fn parse_header(line: &[u8], response: &mut HttpResponse) {
    let Some(colon) = line.iter().position(|&b| b == b':') else {
        response.fail(ProtocolError::InvalidHeaderLine(lossy(line)));
        return;
    };

    if !line[..colon].eq_ignore_ascii_case(b"Content-Length") {
        return;
    }
    response.has_content_length_header = true;

    let value = &line[colon + 1..];
    if value.len() > MAX_CONTENT_LENGTH_TEXT {
        response.fail(ProtocolError::ContentLengthTooLong(value.len()));
        return;
    }

    match parse_decimal(trim(value)) {
        Some(length) => {
            response.content_length = length;
            response.content_length_remaining = length;
        }
        None => response.fail(ProtocolError::InvalidContentLength(lossy(trim(value)))),
    }
}

fn parse_body(cursor: &mut Cursor<'_>, response: &mut HttpResponse) -> Step {
    let take = available(cursor, response.content_length_remaining);
    cursor.advance(take);
    response.content_length_remaining -= take as u64;

    if response.content_length_remaining == 0 {
        response.state = ResponseState::Completed;
        Step::Continue
    } else {
        Step::Pending
    }
}

fn parse_chunked_body(cursor: &mut Cursor<'_>, response: &mut HttpResponse) -> Step {
    loop {
        if response.last_chunk_remaining > 0 {
            let take = available(cursor, response.last_chunk_remaining);
            cursor.advance(take);
            response.last_chunk_remaining -= take as u64;

            if response.last_chunk_remaining > 0 {
                return Step::Pending;
            }
            response.chunk_terminator_pending = true;
        }

        if response.chunk_terminator_pending {
            match cursor.crlf_at(cursor.pos) {
                Some(true) => {
                    cursor.advance(CRLF.len());
                    response.chunk_terminator_pending = false;
                }
                Some(false) => {
                    response.fail(ProtocolError::MissingChunkTerminator);
                    return Step::Continue;
                }
                None => return Step::Pending,
            }
        }

        let (line, end) = match cursor.peek_line() {
            Ok(Some(found)) => found,
            Ok(None) => return Step::Pending,
            Err(e) => {
                response.fail(e);
                return Step::Continue;
            }
        };

        let Some(size) = parse_chunk_size(line) else {
            response.fail(ProtocolError::InvalidChunkSize(lossy(line)));
            return Step::Continue;
        };

        if size == 0 {
            // The size line is only consumed together with the final CRLF
            match cursor.crlf_at(end) {
                Some(true) => {
                    cursor.pos = end + CRLF.len();
                    response.state = ResponseState::Completed;
                }
                Some(false) => response.fail(ProtocolError::MissingFinalTerminator),
                None => return Step::Pending,
            }
            return Step::Continue;
        }

        let Some(total) = response.content_length.checked_add(size) else {
            response.fail(ProtocolError::InvalidChunkSize(lossy(line)));
            return Step::Continue;
        };
        cursor.pos = end;
        response.content_length = total;
        response.last_chunk_remaining = size;
    }
}

/// How many of `wanted` bytes are buffered past the cursor
fn available(cursor: &Cursor<'_>, wanted: u64) -> usize {
    let buffered = cursor.remaining().len();
    usize::try_from(wanted).map_or(buffered, |w| w.min(buffered))
}

/// Find the next CRLF in a buffer
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

fn split_once(bytes: &[u8], delimiter: u8) -> (&[u8], &[u8]) {
    match bytes.iter().position(|&b| b == delimiter) {
        Some(idx) => (&bytes[..idx], &bytes[idx + 1..]),
        None => (bytes, &[]),
    }
}

fn trim(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |idx| idx + 1);
    &bytes[start..end]
}

fn parse_decimal(text: &[u8]) -> Option<u64> {
    if text.is_empty() {
        return None;
    }
    text.iter().try_fold(0u64, |acc, &b| {
        let digit = (b as char).to_digit(10)?;
        acc.checked_mul(10)?.checked_add(u64::from(digit))
    })
}

/// Parse a chunk-size line, ignoring any chunk extension
fn parse_chunk_size(line: &[u8]) -> Option<u64> {
    let (size, _extension) = split_once(line, b';');
    let size = trim(size);
    if size.is_empty() {
        return None;
    }
    size.iter().try_fold(0u64, |acc, &b| {
        let digit = (b as char).to_digit(16)?;
        acc.checked_mul(16)?.checked_add(u64::from(digit))
    })
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(input: &[u8]) -> (HttpResponse, Progress) {
        let mut response = HttpResponse::new();
        let progress = parse(input, &mut response);
        (response, progress)
    }

    #[test]
    fn test_content_length_response() {
        let input = b"HTTP/1.1 200 OK\r\nContent-Length: 13\r\n\r\nHello, World!";
        let (response, progress) = parse_all(input);

        assert_eq!(response.state(), ResponseState::Completed);
        assert_eq!(response.status_code(), 200);
        assert_eq!(response.content_length(), 13);
        assert_eq!(response.content_length_remaining(), 0);
        assert_eq!(progress.consumed, input.len());
    }

    #[test]
    fn test_content_length_leaves_next_response() {
        let first = b"HTTP/1.1 200 OK\r\nContent-Length: 13\r\n\r\nHello, World!";
        let mut input = first.to_vec();
        input.extend_from_slice(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n");

        let (response, progress) = parse_all(&input);
        assert_eq!(response.state(), ResponseState::Completed);
        assert_eq!(progress.consumed, first.len());

        let (next, _) = parse_all(&input[progress.consumed..]);
        assert_eq!(next.state(), ResponseState::Completed);
        assert_eq!(next.status_code(), 404);
    }

    #[test]
    fn test_chunked_response() {
        let input = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\n\r\n";
        let (response, progress) = parse_all(input);

        assert_eq!(response.state(), ResponseState::Completed);
        assert_eq!(response.content_length(), 5);
        assert!(!response.has_content_length_header());
        assert_eq!(progress.consumed, input.len());
    }

    #[test]
    fn test_chunked_body_only() {
        let mut response = HttpResponse::new();
        response.state = ResponseState::ChunkedBody;

        let input = b"5\r\nhello\r\n0\r\n\r\n";
        let progress = parse(input, &mut response);
        assert_eq!(response.state(), ResponseState::Completed);
        assert_eq!(response.content_length(), 5);
        assert_eq!(progress.consumed, input.len());
    }

    #[test]
    fn test_chunked_multiple_with_extension() {
        let input = b"HTTP/1.1 200 OK\r\n\r\na;name=value\r\n0123456789\r\n3\r\nabc\r\n0\r\n\r\n";
        let (response, _) = parse_all(input);
        assert_eq!(response.state(), ResponseState::Completed);
        assert_eq!(response.content_length(), 13);
    }

    #[test]
    fn test_http10_is_error() {
        let (response, _) = parse_all(b"HTTP/1.0 200 OK\r\nContent-Length: 0\r\n\r\n");
        assert_eq!(response.state(), ResponseState::Error);
        assert_eq!(
            response.error(),
            Some(&ProtocolError::InvalidVersion("HTTP/1.0".into()))
        );
    }

    #[test]
    fn test_version_rejected_before_line_complete() {
        let (response, _) = parse_all(b"HTTP/2 200");
        assert_eq!(response.state(), ResponseState::Error);
    }

    #[test]
    fn test_invalid_status_code() {
        let (response, _) = parse_all(b"HTTP/1.1 2x0 OK\r\n\r\n");
        assert_eq!(response.state(), ResponseState::Error);
        assert!(matches!(response.error(), Some(ProtocolError::InvalidStatusCode(_))));

        let (response, _) = parse_all(b"HTTP/1.1 +200 OK\r\n\r\n");
        assert_eq!(response.state(), ResponseState::Error);

        let (response, _) = parse_all(b"HTTP/1.1 70000 OK\r\n\r\n");
        assert_eq!(response.state(), ResponseState::Error);
    }

    #[test]
    fn test_status_line_without_reason() {
        let (response, _) = parse_all(b"HTTP/1.1 204\r\nContent-Length: 0\r\n\r\n");
        assert_eq!(response.state(), ResponseState::Completed);
        assert_eq!(response.status_code(), 204);
    }

    #[test]
    fn test_content_length_too_long() {
        let mut input = b"HTTP/1.1 200 OK\r\nContent-Length: ".to_vec();
        input.extend(std::iter::repeat(b'9').take(200));
        input.extend_from_slice(b"\r\n\r\n");

        let (response, _) = parse_all(&input);
        assert_eq!(response.state(), ResponseState::Error);
        assert!(matches!(response.error(), Some(ProtocolError::ContentLengthTooLong(_))));
    }

    #[test]
    fn test_content_length_overflow_is_error() {
        let (response, _) =
            parse_all(b"HTTP/1.1 200 OK\r\nContent-Length: 99999999999999999999999\r\n\r\n");
        assert_eq!(response.state(), ResponseState::Error);
        assert!(matches!(response.error(), Some(ProtocolError::InvalidContentLength(_))));
    }

    #[test]
    fn test_content_length_case_insensitive() {
        let (response, _) = parse_all(b"HTTP/1.1 200 OK\r\ncontent-length:  2 \r\n\r\nok");
        assert_eq!(response.state(), ResponseState::Completed);
        assert_eq!(response.content_length(), 2);
    }

    #[test]
    fn test_header_without_colon() {
        let (response, _) = parse_all(b"HTTP/1.1 200 OK\r\nBogus\r\n\r\n");
        assert_eq!(response.state(), ResponseState::Error);
        assert!(matches!(response.error(), Some(ProtocolError::InvalidHeaderLine(_))));
    }

    #[test]
    fn test_invalid_chunk_size() {
        let (response, _) = parse_all(b"HTTP/1.1 200 OK\r\n\r\nzz\r\nhello\r\n0\r\n\r\n");
        assert_eq!(response.state(), ResponseState::Error);
        assert!(matches!(response.error(), Some(ProtocolError::InvalidChunkSize(_))));
    }

    #[test]
    fn test_missing_chunk_terminator() {
        let (response, _) = parse_all(b"HTTP/1.1 200 OK\r\n\r\n5\r\nhelloX\r\n0\r\n\r\n");
        assert_eq!(response.state(), ResponseState::Error);
        assert_eq!(response.error(), Some(&ProtocolError::MissingChunkTerminator));
    }

    #[test]
    fn test_missing_final_terminator() {
        let (response, _) = parse_all(b"HTTP/1.1 200 OK\r\n\r\n0\r\nTrailer: x\r\n\r\n");
        assert_eq!(response.state(), ResponseState::Error);
        assert_eq!(response.error(), Some(&ProtocolError::MissingFinalTerminator));
    }

    #[test]
    fn test_line_too_long() {
        let mut input = b"HTTP/1.1 200 OK\r\nX-Big: ".to_vec();
        input.extend(std::iter::repeat(b'a').take(MAX_LINE_LENGTH + 1));

        let (response, _) = parse_all(&input);
        assert_eq!(response.state(), ResponseState::Error);
        assert_eq!(
            response.error(),
            Some(&ProtocolError::LineTooLong(MAX_LINE_LENGTH))
        );
    }

    #[test]
    fn test_partial_input_waits() {
        let (response, progress) = parse_all(b"HTTP/1.1 200 OK\r\nContent-Le");
        assert_eq!(response.state(), ResponseState::Headers);
        assert_eq!(progress.consumed, 17);
        assert_eq!(progress.examined, 27);
    }

    #[test]
    fn test_zero_chunk_waits_for_final_crlf() {
        let mut response = HttpResponse::new();
        response.state = ResponseState::ChunkedBody;

        let progress = parse(b"0\r\n", &mut response);
        assert_eq!(response.state(), ResponseState::ChunkedBody);
        assert_eq!(progress.consumed, 0);

        let progress = parse(b"0\r\n\r", &mut response);
        assert_eq!(response.state(), ResponseState::ChunkedBody);
        assert_eq!(progress.consumed, 0);

        let progress = parse(b"0\r\n\r\n", &mut response);
        assert_eq!(response.state(), ResponseState::Completed);
        assert_eq!(progress.consumed, 5);
    }

    #[test]
    fn test_response_parser_incremental() {
        let input = b"HTTP/1.1 200 OK\r\nServer: bench\r\nContent-Length: 4\r\n\r\nTest";
        let mut parser = ResponseParser::new();
        let mut response = HttpResponse::new();
        let mut pending = Vec::new();

        for piece in input.chunks(3) {
            pending.extend_from_slice(piece);
            let consumed = parser.parse(&pending, &mut response);
            pending.drain(..consumed);
            if response.state().is_terminal() {
                break;
            }
        }

        assert_eq!(response.state(), ResponseState::Completed);
        assert_eq!(response.content_length(), 4);
        assert!(pending.is_empty());
        assert_eq!(parser.scanned(), 0);
    }

    #[test]
    fn test_scanned_resumes_after_split_crlf() {
        let mut parser = ResponseParser::new();
        let mut response = HttpResponse::new();

        let consumed = parser.parse(b"HTTP/1.1 200 OK\r", &mut response);
        assert_eq!(consumed, 0);
        assert_eq!(parser.scanned(), 16);

        let consumed = parser.parse(b"HTTP/1.1 200 OK\r\n", &mut response);
        assert_eq!(consumed, 17);
        assert_eq!(response.state(), ResponseState::Headers);
    }

    #[test]
    fn test_find_crlf() {
        assert_eq!(find_crlf(b"Hello\r\nWorld"), Some(5));
        assert_eq!(find_crlf(b"NoEOL"), None);
        assert_eq!(find_crlf(b"\r\n"), Some(0));
    }

    #[test]
    fn test_parse_numbers() {
        assert_eq!(parse_decimal(b"0"), Some(0));
        assert_eq!(parse_decimal(b"1234"), Some(1234));
        assert_eq!(parse_decimal(b""), None);
        assert_eq!(parse_decimal(b"-1"), None);
        assert_eq!(parse_chunk_size(b"ff"), Some(255));
        assert_eq!(parse_chunk_size(b"1A ; ext"), Some(26));
        assert_eq!(parse_chunk_size(b"fffffffffffffffff"), None);
        assert_eq!(parse_chunk_size(b";ext"), None);
    }
}

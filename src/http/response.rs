/// Status codes the client distinguishes.
///
/// - `Ok` (200) and `PartialContent` (206) start a body
/// - `MovedPermanently` (301) is a redirect the caller may follow
/// - `NotFound` (404) and `RangeNotSatisfiable` (416) abort the response
/// - everything else is `Other` and aborts as a protocol error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 200 OK
    Ok,
    /// 206 Partial Content
    PartialContent,
    /// 301 Moved Permanently
    MovedPermanently,
    /// 404 Not Found
    NotFound,
    /// 416 Range Not Satisfiable
    RangeNotSatisfiable,
    /// Any other code
    Other(u16),
}

impl StatusCode {
    pub fn from_u16(code: u16) -> Self {
        match code {
            200 => StatusCode::Ok,
            206 => StatusCode::PartialContent,
            301 => StatusCode::MovedPermanently,
            404 => StatusCode::NotFound,
            416 => StatusCode::RangeNotSatisfiable,
            other => StatusCode::Other(other),
        }
    }

    /// Returns the numeric HTTP status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use pullhttp::http::response::StatusCode;
    /// assert_eq!(StatusCode::PartialContent.as_u16(), 206);
    /// assert_eq!(StatusCode::Other(503).as_u16(), 503);
    /// ```
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::PartialContent => 206,
            StatusCode::MovedPermanently => 301,
            StatusCode::NotFound => 404,
            StatusCode::RangeNotSatisfiable => 416,
            StatusCode::Other(code) => *code,
        }
    }
}

/// Outcome of the current (or last) response, kept on the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpResult {
    NotStarted,
    Done,
    /// The connection closed before the body was complete.
    NotCompleted,
    NotFound,
    OutOfRange,
    /// Status code outside the handled set.
    HttpError,
    /// Malformed or unsupported `Content-Range`.
    Unsupported,
}

/// Result of one receive call on the engine or the URL handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvResult {
    /// Body bytes were written to the front of the caller's buffer.
    Bytes(usize),
    WouldBlock,
    /// The response body is complete.
    Done,
    /// Transport failure or premature close.
    Closed,
    NotFound,
    /// Any other status or header error.
    ProtocolError,
}

impl RecvResult {
    /// True for every result after which no more body bytes will arrive.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RecvResult::Bytes(_) | RecvResult::WouldBlock)
    }
}

/// Metadata parsed from the response status line and headers.
///
/// Integer fields use `-1` for "absent", mirroring how the values appear
/// on the wire (a range start of 0 is meaningful).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    /// Numeric status of the last status line, 0 before one is seen.
    pub status: u16,
    /// Minor version from `HTTP/1.x`.
    pub http_minor: u8,
    pub content_length: i64,
    pub chunked: bool,
    /// Size of the chunk currently being read.
    pub chunk_size: i64,
    /// Bytes the body window was armed with when headers ended.
    pub data_size: i64,
    pub range_start: i64,
    pub range_end: i64,
    pub range_total: i64,
    pub partial: bool,
    pub keep_alive: bool,
    /// No `Content-Length` was declared.
    pub no_size: bool,
    pub is_redirect: bool,
    pub content_type: String,
    /// `Location` header value, if any.
    pub location: String,
}

impl ResponseHead {
    pub fn new() -> Self {
        Self {
            status: 0,
            http_minor: 1,
            content_length: -1,
            chunked: false,
            chunk_size: -1,
            data_size: -1,
            range_start: -1,
            range_end: -1,
            range_total: -1,
            partial: false,
            keep_alive: false,
            no_size: false,
            is_redirect: false,
            content_type: String::new(),
            location: String::new(),
        }
    }

    /// Whether a clean close of the connection ends an unchunked body
    /// successfully rather than truncating it.
    ///
    /// Holds for HTTP/1.0 responses without a `Content-Length`, and for
    /// any response that established neither a length nor a byte range.
    pub fn close_implies_done(&self) -> bool {
        if self.http_minor == 0 && self.content_length < 0 {
            return true;
        }
        self.content_length < 0 && self.range_total < 0
    }
}

impl Default for ResponseHead {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_known_codes() {
        for code in [200, 206, 301, 404, 416, 500] {
            assert_eq!(StatusCode::from_u16(code).as_u16(), code);
        }
        assert_eq!(StatusCode::from_u16(302), StatusCode::Other(302));
    }

    #[test]
    fn close_policy_boundaries() {
        let mut head = ResponseHead::new();
        assert!(head.close_implies_done());

        head.content_length = 10;
        assert!(!head.close_implies_done());

        head.content_length = -1;
        head.range_total = 100;
        assert!(!head.close_implies_done());

        head.http_minor = 0;
        assert!(head.close_implies_done());

        head.content_length = 0;
        assert!(!head.close_implies_done());
    }

    #[test]
    fn terminal_results() {
        assert!(!RecvResult::Bytes(3).is_terminal());
        assert!(!RecvResult::WouldBlock.is_terminal());
        assert!(RecvResult::Done.is_terminal());
        assert!(RecvResult::NotFound.is_terminal());
    }
}

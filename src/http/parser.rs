use crate::http::response::{HttpResult, ResponseHead, StatusCode};

/// Window armed for bodies that declare no size.
pub const NO_SIZE_WINDOW: i64 = i64::MAX;

/// Characters stripped from both ends of header lines and values.
const DELIMS: &[char] = &['\r', '\n', '\t', ' '];

/// What the engine does after one header line has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderStep {
    /// Keep reading header lines.
    Continue,
    /// The blank line was seen; the body follows.
    Complete,
    /// Give up on this response.
    Abort(HttpResult),
}

/// Strip line terminators and surrounding blanks.
pub fn strip_line(line: &str) -> &str {
    line.trim_matches(DELIMS)
}

/// Apply one header line (already stripped) to `head`.
pub fn parse_header_line(head: &mut ResponseHead, line: &str) -> HeaderStep {
    if let Some((minor, code)) = split_status_line(line) {
        return apply_status(head, minor, code);
    }

    if line.is_empty() {
        finish_headers(head);
        return HeaderStep::Complete;
    }

    let Some((name, value)) = line.split_once(':') else {
        return HeaderStep::Continue;
    };
    let name = name.trim_matches(DELIMS);
    let value = value.trim_matches(DELIMS);

    if name.eq_ignore_ascii_case("Content-Type") {
        head.content_type = value.to_string();
    } else if name.eq_ignore_ascii_case("Content-Length") {
        head.content_length = parse_int(value, 10);
    } else if name.eq_ignore_ascii_case("Content-Range") {
        return apply_content_range(head, value);
    } else if name.eq_ignore_ascii_case("Transfer-Encoding") {
        head.chunked = !value.eq_ignore_ascii_case("identity");
    } else if name.eq_ignore_ascii_case("Connection") {
        head.keep_alive = value.eq_ignore_ascii_case("Keep-Alive");
    } else if name.eq_ignore_ascii_case("Location") {
        head.location = value.to_string();
    }

    HeaderStep::Continue
}

/// Recognise `HTTP/1.<d> <code> ...`, returning the minor version and the
/// code token.
fn split_status_line(line: &str) -> Option<(u8, &str)> {
    let prefix = line.get(..7)?;
    if !prefix.eq_ignore_ascii_case("HTTP/1.") {
        return None;
    }

    let minor = line[7..]
        .chars()
        .next()
        .and_then(|c| c.to_digit(10))
        .unwrap_or(0) as u8;
    let code = line.split_whitespace().nth(1).unwrap_or("");

    Some((minor, code))
}

fn apply_status(head: &mut ResponseHead, minor: u8, code: &str) -> HeaderStep {
    let status = code
        .parse::<u16>()
        .map(StatusCode::from_u16)
        .unwrap_or(StatusCode::Other(0));
    head.status = status.as_u16();

    match status {
        StatusCode::NotFound => HeaderStep::Abort(HttpResult::NotFound),
        StatusCode::RangeNotSatisfiable => HeaderStep::Abort(HttpResult::OutOfRange),
        StatusCode::MovedPermanently => {
            reset_framing(head, 0);
            head.http_minor = minor;
            head.is_redirect = true;
            HeaderStep::Continue
        }
        StatusCode::Ok | StatusCode::PartialContent => {
            reset_framing(head, -1);
            head.partial = status == StatusCode::PartialContent;
            head.http_minor = minor;
            head.is_redirect = false;
            HeaderStep::Continue
        }
        StatusCode::Other(_) => HeaderStep::Abort(HttpResult::HttpError),
    }
}

fn reset_framing(head: &mut ResponseHead, size: i64) {
    head.chunked = false;
    head.content_length = size;
    head.chunk_size = size;
    head.data_size = size;
    head.range_start = -1;
    head.range_end = -1;
    head.range_total = -1;
    head.partial = false;
}

/// `bytes A-B/T`; the total is optional, the span is not.
fn apply_content_range(head: &mut ResponseHead, value: &str) -> HeaderStep {
    let is_bytes = value
        .get(..5)
        .is_some_and(|unit| unit.eq_ignore_ascii_case("bytes"));
    if !is_bytes {
        return HeaderStep::Abort(HttpResult::Unsupported);
    }

    let range = value[5..].trim_matches(DELIMS);
    let span = match range.split_once('/') {
        Some((span, total)) => {
            head.range_total = parse_int(total.trim_matches(DELIMS), 10);
            span
        }
        None => {
            head.range_total = -1;
            range
        }
    };

    match span.split_once('-') {
        Some((start, end)) => {
            head.range_start = parse_int(start, 10);
            head.range_end = parse_int(end, 10);
            HeaderStep::Continue
        }
        None => HeaderStep::Abort(HttpResult::Unsupported),
    }
}

fn finish_headers(head: &mut ResponseHead) {
    if head.range_total < 0 && head.content_length >= 0 {
        head.range_total = head.content_length;
        head.range_start = 0;
        head.range_end = head.content_length - 1;
    }
    head.no_size = head.content_length < 0;
    head.data_size = if head.content_length >= 0 {
        head.content_length
    } else {
        NO_SIZE_WINDOW
    };
}

/// Size from a chunk header line such as `1a3f; ext=1`.
///
/// Anything after the hex digits is ignored; a negative size reads as 0.
pub fn parse_chunk_size(line: &str) -> i64 {
    let line = strip_line(line);
    let digits = line.split(' ').next().unwrap_or("");
    parse_int(digits, 16).max(0)
}

/// Leading-integer parse in the manner of `strtoll`: optional sign, then
/// digits up to the first character that is not one. No digits yields 0.
pub fn parse_int(text: &str, radix: u32) -> i64 {
    let s = text.trim_start();
    let (negative, s) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let s = if radix == 16 {
        s.strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s)
    } else {
        s
    };

    let mut value: i64 = 0;
    for c in s.chars() {
        let Some(digit) = c.to_digit(radix) else {
            break;
        };
        value = value
            .saturating_mul(i64::from(radix))
            .saturating_add(i64::from(digit));
    }

    if negative { -value } else { value }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_int_stops_at_garbage() {
        assert_eq!(parse_int("  42abc", 10), 42);
        assert_eq!(parse_int("-7", 10), -7);
        assert_eq!(parse_int("xyz", 10), 0);
        assert_eq!(parse_int("0x1F", 16), 31);
        assert_eq!(parse_int("ff;name=v", 16), 255);
    }

    #[test]
    fn chunk_size_ignores_extensions() {
        assert_eq!(parse_chunk_size("1a ext\r\n"), 26);
        assert_eq!(parse_chunk_size("0\r\n"), 0);
        assert_eq!(parse_chunk_size("-5\r\n"), 0);
    }

    #[test]
    fn status_line_needs_http1_prefix() {
        assert_eq!(split_status_line("HTTP/1.1 200 OK"), Some((1, "200")));
        assert_eq!(split_status_line("http/1.0 404 Not Found"), Some((0, "404")));
        assert_eq!(split_status_line("HTTP/2 200"), None);
        assert_eq!(split_status_line("HTTP/1"), None);
    }
}

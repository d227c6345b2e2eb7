use crate::http::parser::strip_line;

/// Value sent in the `User-Agent` header of every request.
pub const USER_AGENT: &str = "Mozilla/4.0 (pullhttp)";

/// HTTP request methods.
///
/// Only the two methods the client issues are represented. GET never
/// carries a body; POST carries one either in full or streamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET - Retrieve a resource
    GET,
    /// POST - Submit data
    POST,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
        }
    }
}

/// Request body handed to [`crate::url::UrlHandle::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestBody<'a> {
    /// The whole body is known up front and sent with a `Content-Length`.
    Full(&'a [u8]),
    /// The body is supplied later through `write`; no `Content-Length`.
    Streamed,
}

/// Builder for the header lines of a request.
///
/// ```
/// # use pullhttp::http::request::{Method, RequestBuilder};
/// let lines = RequestBuilder::new(Method::GET)
///     .target("/index.html")
///     .host("example.com")
///     .build();
/// assert_eq!(lines[0], "GET /index.html HTTP/1.1");
/// assert_eq!(lines[1], "Host: example.com");
/// ```
pub struct RequestBuilder {
    method: Method,
    target: String,
    host: String,
    content_length: Option<usize>,
    extra_headers: String,
}

impl RequestBuilder {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            target: "/".to_string(),
            host: String::new(),
            content_length: None,
            extra_headers: String::new(),
        }
    }

    /// Request target: a path for direct requests, a full URL via a proxy.
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Declared body size. Ignored for GET.
    pub fn content_length(mut self, len: Option<usize>) -> Self {
        self.content_length = len;
        self
    }

    /// Raw header text appended after the generated headers.
    ///
    /// Surrounding whitespace and line breaks are stripped; interior CRLFs
    /// are kept so several headers can be passed at once.
    pub fn extra_headers(mut self, text: &str) -> Self {
        self.extra_headers = strip_line(text).to_string();
        self
    }

    /// Produces the header lines, without line terminators.
    pub fn build(self) -> Vec<String> {
        let mut lines = Vec::with_capacity(5);

        lines.push(format!("{} {} HTTP/1.1", self.method.as_str(), self.target));
        lines.push(format!("Host: {}", self.host));
        lines.push(format!("User-Agent: {}", USER_AGENT));

        if self.method == Method::POST {
            if let Some(len) = self.content_length {
                lines.push(format!("Content-Length: {}", len));
            }
        }

        if !self.extra_headers.is_empty() {
            lines.push(self.extra_headers);
        }

        lines
    }
}

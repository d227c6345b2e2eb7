use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Instant;

use crate::error::{Error, Result};
use crate::http::parser::{self, HeaderStep};
use crate::http::request::{Method, RequestBuilder};
use crate::http::response::{HttpResult, RecvResult, ResponseHead};
use crate::net::socket::{BlockRead, HttpSock, LineRead, SockState};
use crate::net::sys::Interest;

pub const DEFAULT_PORT: u16 = 80;

/// Wait budget meaning "block on this socket until something happens".
pub const WAIT_FOREVER: u64 = u64::MAX;

/// Scratch window used by [`Connection::getresponse`].
const RESPONSE_CHUNK: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Stopped,
    Connecting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    Waiting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvState {
    Waiting,
    ReadingHeader,
    ReadingData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    Head,
    Data,
    Tail,
    Done,
}

/// Outcome of reading one header line.
enum HeaderRead {
    Again,
    Line,
    Closed,
    Abort,
}

/// One HTTP/1.1 exchange driven over an [`HttpSock`].
///
/// Nothing here blocks: `recv` returns [`RecvResult::WouldBlock`] whenever
/// the socket has nothing more to give, and the caller decides how long to
/// wait through [`Connection::update`].
pub struct Connection {
    sock: HttpSock,
    state: ConnectionState,
    send_state: SendState,
    recv_state: RecvState,
    chunk_state: ChunkState,
    host: String,
    request_header: String,
    response_header: String,
    line: Vec<u8>,
    scratch: Vec<u8>,
    head: ResponseHead,
    result: HttpResult,
}

impl Connection {
    pub fn new() -> Self {
        Self::with_socket(HttpSock::new())
    }

    /// Build on a caller-supplied socket wrapper (e.g. one with a custom
    /// receive buffer size).
    pub fn with_socket(sock: HttpSock) -> Self {
        Self {
            sock,
            state: ConnectionState::Stopped,
            send_state: SendState::Waiting,
            recv_state: RecvState::Waiting,
            chunk_state: ChunkState::Head,
            host: String::new(),
            request_header: String::new(),
            response_header: String::new(),
            line: Vec::new(),
            scratch: Vec::new(),
            head: ResponseHead::new(),
            result: HttpResult::NotStarted,
        }
    }

    /// Resolve `host[:port]` and start connecting to it.
    ///
    /// The stored host text (sent in the `Host` header) keeps the port only
    /// when it differs from 80.
    pub fn open(&mut self, host: &str) -> Result<()> {
        self.close();

        let (name, port) = split_host_port(parser::strip_line(host))?;
        self.host = host_text(name, port);

        let remote = resolve_host(name, port)?;
        tracing::debug!(host = %self.host, remote = %remote, "Opening connection");
        self.sock.connect(remote)?;

        self.reset_exchange();
        Ok(())
    }

    /// Run the exchange over an already connected stream.
    pub fn open_stream(&mut self, stream: TcpStream, host: &str) -> Result<()> {
        self.close();

        let (name, port) = split_host_port(parser::strip_line(host))?;
        self.host = host_text(name, port);
        self.sock.assign(stream)?;

        self.reset_exchange();
        Ok(())
    }

    fn reset_exchange(&mut self) {
        self.state = ConnectionState::Connecting;
        self.send_state = SendState::Waiting;
        self.recv_state = RecvState::Waiting;
        self.head = ResponseHead::new();
    }

    pub fn close(&mut self) {
        self.sock.close();
        self.state = ConnectionState::Stopped;
    }

    /// Flush pending output and, with a positive budget, wait up to
    /// `wait_ms` for the socket to become ready.
    pub fn update(&mut self, wait_ms: u64) -> ConnectionState {
        if wait_ms > 0 {
            self.sock.update();
            let mut interest = Interest::READ | Interest::ERROR;
            if self.sock.pending() > 0 || self.sock.state() == SockState::Connecting {
                interest |= Interest::WRITE;
            }
            self.sock.poll(interest, poll_timeout(wait_ms));
        }
        self.sock.update();
        self.state
    }

    /// `update` with a budget, returning what is left of it afterwards.
    pub(crate) fn pump(&mut self, wait_ms: u64) -> u64 {
        let start = Instant::now();
        self.update(wait_ms);
        let elapsed = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        wait_ms - elapsed.min(wait_ms)
    }

    pub fn reset_headers(&mut self) {
        self.request_header.clear();
    }

    pub fn write_header_line(&mut self, line: &str) {
        self.request_header.push_str(line);
        self.request_header.push_str("\r\n");
    }

    /// Queue the accumulated request headers followed by the blank line.
    pub fn flush_headers(&mut self) -> Result<()> {
        self.sock.send(self.request_header.as_bytes())?;
        self.sock.send(b"\r\n")
    }

    /// Queue body bytes; returns how many bytes are still unsent.
    pub fn send(&mut self, data: &[u8]) -> Result<usize> {
        self.sock.send(data)?;
        Ok(self.sock.pending())
    }

    /// Build and queue a request.
    ///
    /// `body` is the complete body when its size is known; a POST without
    /// one streams its body through [`Connection::send`] afterwards.
    pub fn request(
        &mut self,
        method: Method,
        target: &str,
        body: Option<&[u8]>,
        extra_headers: Option<&str>,
    ) -> Result<()> {
        if method == Method::GET && body.is_some_and(|b| !b.is_empty()) {
            return Err(Error::BodyOnGet);
        }

        let lines = RequestBuilder::new(method)
            .target(target)
            .host(self.host.clone())
            .content_length(body.map(<[u8]>::len))
            .extra_headers(extra_headers.unwrap_or(""))
            .build();

        self.reset_headers();
        for line in &lines {
            self.write_header_line(line);
        }
        self.flush_headers()?;

        if method == Method::POST {
            if let Some(body) = body {
                self.sock.send(body)?;
            }
        }

        tracing::debug!(
            method = method.as_str(),
            target = %target,
            host = %self.host,
            "Request queued"
        );

        self.update(0);
        Ok(())
    }

    /// Receive the next piece of the response body into `data`.
    pub fn recv(&mut self, data: &mut [u8]) -> RecvResult {
        if self.sock.pending() > 0 {
            self.sock.update();
        }

        if self.recv_state == RecvState::Waiting {
            self.recv_state = RecvState::ReadingHeader;
            // The head is kept until the next status line resets its framing.
            self.result = HttpResult::NotStarted;
            self.line.clear();
            self.response_header.clear();
        }

        if self.recv_state == RecvState::ReadingHeader {
            loop {
                match self.read_header() {
                    HeaderRead::Again => return RecvResult::WouldBlock,
                    HeaderRead::Closed => {
                        self.recv_state = RecvState::Waiting;
                        return RecvResult::Closed;
                    }
                    HeaderRead::Abort => {
                        self.recv_state = RecvState::Waiting;
                        tracing::warn!(
                            host = %self.host,
                            status = self.head.status,
                            result = ?self.result,
                            "Response aborted"
                        );
                        self.close();
                        return match self.result {
                            HttpResult::NotFound => RecvResult::NotFound,
                            _ => RecvResult::ProtocolError,
                        };
                    }
                    HeaderRead::Line => {
                        if self.recv_state != RecvState::ReadingHeader {
                            tracing::debug!(
                                status = self.head.status,
                                content_length = self.head.content_length,
                                chunked = self.head.chunked,
                                "Response headers complete"
                            );
                            self.sock.set_window(self.head.data_size);
                            break;
                        }
                    }
                }
            }
        }

        let result = if self.head.chunked {
            self.read_chunked(data)
        } else {
            self.read_unchunked(data)
        };
        if result.is_terminal() {
            self.recv_state = RecvState::Waiting;
        }
        result
    }

    fn read_header(&mut self) -> HeaderRead {
        match self.sock.line(&mut self.line) {
            LineRead::WouldBlock => return HeaderRead::Again,
            LineRead::Closed => {
                self.result = HttpResult::NotCompleted;
                return HeaderRead::Closed;
            }
            LineRead::Complete => {}
        }

        let text = String::from_utf8_lossy(&self.line).into_owned();
        self.line.clear();
        let line = parser::strip_line(&text);

        self.response_header.push_str(line);
        self.response_header.push_str("\r\n");

        match parser::parse_header_line(&mut self.head, line) {
            HeaderStep::Continue => HeaderRead::Line,
            HeaderStep::Complete => {
                self.recv_state = RecvState::ReadingData;
                self.chunk_state = ChunkState::Head;
                HeaderRead::Line
            }
            HeaderStep::Abort(result) => {
                self.result = result;
                HeaderRead::Abort
            }
        }
    }

    fn read_unchunked(&mut self, data: &mut [u8]) -> RecvResult {
        match self.sock.bounded_recv(data) {
            BlockRead::Count(n) => RecvResult::Bytes(n),
            BlockRead::WouldBlock => RecvResult::WouldBlock,
            BlockRead::Done => {
                self.result = HttpResult::Done;
                RecvResult::Done
            }
            BlockRead::Closed => {
                self.state = ConnectionState::Stopped;
                self.recv_state = RecvState::Waiting;
                if !self.head.chunked
                    && self.sock.closed_cleanly()
                    && self.head.close_implies_done()
                {
                    self.result = HttpResult::Done;
                    return RecvResult::Done;
                }
                tracing::warn!(
                    host = %self.host,
                    received = self.sock.received(),
                    error = ?self.sock.last_error(),
                    "Connection closed before response completed"
                );
                self.result = HttpResult::NotCompleted;
                RecvResult::Closed
            }
        }
    }

    fn read_chunked(&mut self, data: &mut [u8]) -> RecvResult {
        loop {
            match self.chunk_state {
                ChunkState::Head => {
                    if let Some(result) = self.read_chunk_line() {
                        return result;
                    }
                    let size = parser::parse_chunk_size(&String::from_utf8_lossy(&self.line));
                    self.line.clear();
                    tracing::trace!(size, "Chunk");
                    self.head.chunk_size = size;
                    self.sock.set_window(size);
                    self.chunk_state = ChunkState::Data;
                }
                ChunkState::Data => match self.read_unchunked(data) {
                    RecvResult::Done => self.chunk_state = ChunkState::Tail,
                    other => return other,
                },
                ChunkState::Tail => {
                    if let Some(result) = self.read_chunk_line() {
                        return result;
                    }
                    self.line.clear();
                    self.chunk_state = if self.head.chunk_size == 0 {
                        ChunkState::Done
                    } else {
                        ChunkState::Head
                    };
                }
                ChunkState::Done => return RecvResult::Done,
            }
        }
    }

    /// Read one framing line; `Some` carries the result to hand back when
    /// the line is not complete yet.
    fn read_chunk_line(&mut self) -> Option<RecvResult> {
        match self.sock.line(&mut self.line) {
            LineRead::Complete => None,
            LineRead::WouldBlock => Some(RecvResult::WouldBlock),
            LineRead::Closed => {
                self.result = HttpResult::NotCompleted;
                Some(RecvResult::Closed)
            }
        }
    }

    /// Append response body bytes to `content` until the response ends,
    /// fails, or `wait_ms` of waiting has been spent.
    pub fn getresponse(&mut self, content: &mut Vec<u8>, wait_ms: u64) -> RecvResult {
        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.resize(RESPONSE_CHUNK, 0);

        let mut wait = wait_ms;
        let result = loop {
            match self.recv(&mut scratch) {
                RecvResult::Bytes(n) => content.extend_from_slice(&scratch[..n]),
                RecvResult::WouldBlock => {
                    if wait == 0 {
                        break RecvResult::WouldBlock;
                    }
                    wait = self.pump(wait);
                }
                other => break other,
            }
        };

        self.scratch = scratch;
        result
    }

    pub(crate) fn set_host(&mut self, host: &str) {
        self.host = host.to_string();
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn send_state(&self) -> SendState {
        self.send_state
    }

    pub fn recv_state(&self) -> RecvState {
        self.recv_state
    }

    pub fn chunk_state(&self) -> ChunkState {
        self.chunk_state
    }

    pub fn head(&self) -> &ResponseHead {
        &self.head
    }

    pub fn result(&self) -> HttpResult {
        self.result
    }

    /// Request header text as last queued, without the final blank line.
    pub fn request_header(&self) -> &str {
        &self.request_header
    }

    /// Header lines of the current response, CRLF-separated.
    pub fn response_header(&self) -> &str {
        &self.response_header
    }

    pub fn pending(&self) -> usize {
        self.sock.pending()
    }

    pub fn socket(&self) -> &HttpSock {
        &self.sock
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

fn poll_timeout(wait_ms: u64) -> i32 {
    i32::try_from(wait_ms).unwrap_or(-1)
}

fn split_host_port(host: &str) -> Result<(&str, u16)> {
    match host.rsplit_once(':') {
        Some((name, port)) => {
            let port = port
                .trim()
                .parse::<u16>()
                .map_err(|_| Error::InvalidPort(port.to_string()))?;
            Ok((name, port))
        }
        None => Ok((host, DEFAULT_PORT)),
    }
}

fn host_text(name: &str, port: u16) -> String {
    if port == DEFAULT_PORT {
        name.to_string()
    } else {
        format!("{}:{}", name, port)
    }
}

/// Resolve a host name, preferring an IPv4 address.
fn resolve_host(name: &str, port: u16) -> Result<SocketAddr> {
    let name = name.trim_start_matches('[').trim_end_matches(']');
    let addrs: Vec<SocketAddr> = (name, port)
        .to_socket_addrs()
        .map_err(|_| Error::Resolve(name.to_string()))?
        .collect();

    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| Error::Resolve(name.to_string()))
}

//! Pseudo-blocking reads over one non-blocking TCP socket.
//!
//! `HttpSock` owns the socket together with an outbound and an inbound
//! byte queue. Every read primitive performs at most one `recv` syscall, so
//! callers can interleave [`HttpSock::update`] and [`HttpSock::poll`] with
//! reads without ever stalling the thread.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::os::fd::AsRawFd;
use std::time::Instant;

use bytes::{Buf, BytesMut};

use crate::error::{Error, Result};
use crate::net::sys::{self, Interest};

/// Size of the scratch buffer used for a single `recv` syscall.
pub const DEFAULT_BUFFER_SIZE: usize = 0x4000;

/// Connection state of the wrapped socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SockState {
    Closed,
    Connecting,
    Connected,
}

/// Why the socket was last closed by the wrapper itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SockError {
    /// The peer shut down its side of the connection.
    Eof,
    /// The OS reported an error (raw errno, `-1` when unknown).
    Os(i32),
}

/// Result of [`HttpSock::recv`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvStatus {
    /// This many bytes were copied into the caller's buffer.
    Bytes(usize),
    /// Nothing available right now; the connection is still alive.
    WouldBlock,
    /// No more data will ever arrive.
    Closed,
}

/// Result of [`HttpSock::byte`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRead {
    Byte(u8),
    WouldBlock,
    Closed,
}

/// Result of [`HttpSock::line`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineRead {
    WouldBlock,
    /// A `'\n'` was appended to the accumulator.
    Complete,
    Closed,
}

/// Result of [`HttpSock::bounded_recv`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockRead {
    Count(usize),
    WouldBlock,
    /// The armed window is exhausted.
    Done,
    Closed,
}

pub struct HttpSock {
    state: SockState,
    stream: Option<TcpStream>,
    buffer: Vec<u8>,
    bufsize: usize,
    send_queue: BytesMut,
    recv_queue: BytesMut,
    window: i64,
    endless: bool,
    received: u64,
    error: Option<SockError>,
    remote: Option<SocketAddr>,
    connected_at: Option<Instant>,
}

impl HttpSock {
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    /// Create a wrapper whose receive buffer holds `bufsize` bytes.
    ///
    /// The buffer itself is allocated on the first `connect`/`assign`.
    pub fn with_buffer_size(bufsize: usize) -> Self {
        Self {
            state: SockState::Closed,
            stream: None,
            buffer: Vec::new(),
            bufsize: bufsize.max(1),
            send_queue: BytesMut::new(),
            recv_queue: BytesMut::new(),
            window: -1,
            endless: false,
            received: 0,
            error: None,
            remote: None,
            connected_at: None,
        }
    }

    /// Start a non-blocking connect to `remote`.
    ///
    /// Any previous socket is closed first. Only buffer allocation and
    /// socket creation can fail here; the handshake itself completes (or
    /// fails) later and is observed through [`HttpSock::update`].
    pub fn connect(&mut self, remote: SocketAddr) -> Result<()> {
        self.reset_for_new_socket()?;

        let stream = sys::open_stream(&remote)?;
        self.remote = Some(remote);

        match sys::start_connect(&stream, &remote) {
            Ok(()) => {
                tracing::debug!(remote = %remote, "Connecting");
                self.stream = Some(stream);
                self.state = SockState::Connecting;
            }
            Err(e) => {
                tracing::warn!(remote = %remote, error = %e, "Connect failed immediately");
                self.error = Some(os_error(&e));
            }
        }

        Ok(())
    }

    /// Adopt an already connected stream, e.g. one tunnelled through a proxy.
    pub fn assign(&mut self, stream: TcpStream) -> Result<()> {
        self.reset_for_new_socket()?;

        stream.set_nonblocking(true)?;
        self.remote = stream.peer_addr().ok();
        self.stream = Some(stream);
        self.state = SockState::Connected;
        self.connected_at = Some(Instant::now());

        Ok(())
    }

    fn reset_for_new_socket(&mut self) -> Result<()> {
        self.close();
        self.endless = false;
        self.received = 0;
        self.error = None;
        self.connected_at = None;
        self.ensure_buffer()?;
        self.send_queue.clear();
        self.recv_queue.clear();
        Ok(())
    }

    fn ensure_buffer(&mut self) -> Result<()> {
        if self.buffer.len() == self.bufsize {
            return Ok(());
        }
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(self.bufsize)
            .map_err(|_| Error::Alloc(self.bufsize))?;
        buffer.resize(self.bufsize, 0);
        self.buffer = buffer;
        Ok(())
    }

    /// Replace the receive buffer with one of `bufsize` bytes.
    ///
    /// On allocation failure the socket is closed and the previous buffer
    /// is kept, so the wrapper can still be reconnected.
    pub fn set_buffer_size(&mut self, bufsize: usize) -> Result<()> {
        let bufsize = bufsize.max(1);
        let mut buffer = Vec::new();
        if buffer.try_reserve_exact(bufsize).is_err() {
            self.close();
            return Err(Error::Alloc(bufsize));
        }
        buffer.resize(bufsize, 0);
        self.buffer = buffer;
        self.bufsize = bufsize;
        Ok(())
    }

    /// Release the descriptor. Queues and the receive buffer are kept.
    pub fn close(&mut self) {
        if self.stream.take().is_some() {
            tracing::trace!(remote = ?self.remote, "Socket closed");
        }
        self.state = SockState::Closed;
    }

    fn fail(&mut self, error: SockError) {
        tracing::debug!(remote = ?self.remote, error = ?error, "Connection lost");
        self.error = Some(error);
        self.close();
    }

    /// Advance the connection: finish a pending handshake, or drain the
    /// outbound queue until it is empty or the socket would block.
    pub fn update(&mut self) {
        match self.state {
            SockState::Closed => {}
            SockState::Connecting => self.try_connect(),
            SockState::Connected => self.try_send(),
        }
    }

    fn try_connect(&mut self) {
        let outcome = {
            let Some(stream) = self.stream.as_ref() else {
                return;
            };
            let ready = sys::poll_fd(stream.as_raw_fd(), Interest::WRITE | Interest::ERROR, 0);
            if ready.intersects(Interest::ERROR) {
                let code = match stream.take_error() {
                    Ok(Some(e)) => os_error(&e),
                    _ => SockError::Os(-1),
                };
                Some(Err(code))
            } else if ready.intersects(Interest::WRITE) {
                match stream.take_error() {
                    Ok(Some(e)) => Some(Err(os_error(&e))),
                    _ => Some(Ok(())),
                }
            } else {
                None
            }
        };

        match outcome {
            Some(Ok(())) => {
                tracing::debug!(remote = ?self.remote, "Connected");
                self.state = SockState::Connected;
                self.connected_at = Some(Instant::now());
            }
            Some(Err(error)) => self.fail(error),
            None => {}
        }
    }

    fn try_send(&mut self) {
        while self.state == SockState::Connected && !self.send_queue.is_empty() {
            let Some(stream) = self.stream.as_mut() else {
                break;
            };
            match stream.write(&self.send_queue) {
                Ok(0) => break,
                Ok(n) => {
                    tracing::trace!(bytes = n, "Sent");
                    self.send_queue.advance(n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.fail(os_error(&e));
                    break;
                }
            }
        }
    }

    /// One `recv` syscall into the inbound queue.
    fn try_recv(&mut self) {
        if self.state != SockState::Connected || self.buffer.is_empty() {
            return;
        }
        let Some(stream) = self.stream.as_mut() else {
            return;
        };
        match stream.read(&mut self.buffer) {
            Ok(0) => self.fail(SockError::Eof),
            Ok(n) => self.recv_queue.extend_from_slice(&self.buffer[..n]),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) => {}
            Err(e) => self.fail(os_error(&e)),
        }
    }

    fn drain_into(&mut self, data: &mut [u8]) -> usize {
        let n = self.recv_queue.len().min(data.len());
        if n > 0 {
            data[..n].copy_from_slice(&self.recv_queue[..n]);
            self.recv_queue.advance(n);
        }
        n
    }

    /// Move buffered (and at most one syscall's worth of fresh) data into
    /// `data`.
    pub fn recv(&mut self, data: &mut [u8]) -> RecvStatus {
        if data.is_empty() {
            return RecvStatus::WouldBlock;
        }

        let mut got = self.drain_into(data);
        if got < data.len() {
            self.try_recv();
            got += self.drain_into(&mut data[got..]);
        }

        if got > 0 {
            self.received += got as u64;
            return RecvStatus::Bytes(got);
        }

        match self.state {
            SockState::Closed => RecvStatus::Closed,
            SockState::Connecting | SockState::Connected => RecvStatus::WouldBlock,
        }
    }

    /// Queue `data` for sending. Fails (and drops the queue) once closed.
    pub fn send(&mut self, data: &[u8]) -> Result<()> {
        if self.state == SockState::Closed {
            self.send_queue.clear();
            return Err(Error::NotConnected);
        }
        self.send_queue.extend_from_slice(data);
        Ok(())
    }

    /// Wait up to `timeout_ms` for any of `interest` (negative waits forever).
    pub fn poll(&self, interest: Interest, timeout_ms: i32) -> Interest {
        match &self.stream {
            Some(stream) => sys::poll_fd(stream.as_raw_fd(), interest, timeout_ms),
            None => Interest::NONE,
        }
    }

    pub fn byte(&mut self) -> ByteRead {
        let mut ch = [0u8; 1];
        match self.recv(&mut ch) {
            RecvStatus::Bytes(_) => ByteRead::Byte(ch[0]),
            RecvStatus::WouldBlock => ByteRead::WouldBlock,
            RecvStatus::Closed => ByteRead::Closed,
        }
    }

    /// Append bytes to `line` until a `'\n'` has been appended.
    ///
    /// On `WouldBlock` the partial line stays in `line` and the next call
    /// continues it. On `Closed` the caller owns the leftover.
    pub fn line(&mut self, line: &mut Vec<u8>) -> LineRead {
        loop {
            match self.byte() {
                ByteRead::Byte(ch) => {
                    line.push(ch);
                    if ch == b'\n' {
                        return LineRead::Complete;
                    }
                }
                ByteRead::WouldBlock => return LineRead::WouldBlock,
                ByteRead::Closed => return LineRead::Closed,
            }
        }
    }

    /// Arm the bounded-read window. A negative size reads endlessly.
    pub fn set_window(&mut self, size: i64) {
        self.window = size;
        self.endless = size < 0;
    }

    /// Read within the armed window, reporting `Done` once it is used up.
    pub fn bounded_recv(&mut self, data: &mut [u8]) -> BlockRead {
        if self.window == 0 && !self.endless {
            self.window = -1;
            return BlockRead::Done;
        }

        if self.window < 0 && !self.endless {
            return match self.state {
                SockState::Closed => BlockRead::Closed,
                _ => BlockRead::Done,
            };
        }

        if data.is_empty() {
            return BlockRead::WouldBlock;
        }

        let size = if self.endless {
            data.len()
        } else {
            data.len().min(usize::try_from(self.window).unwrap_or(usize::MAX))
        };

        match self.recv(&mut data[..size]) {
            RecvStatus::WouldBlock => BlockRead::WouldBlock,
            RecvStatus::Closed => {
                self.window = -1;
                BlockRead::Closed
            }
            RecvStatus::Bytes(n) => {
                if !self.endless {
                    self.window -= n as i64;
                }
                BlockRead::Count(n)
            }
        }
    }

    pub fn state(&self) -> SockState {
        self.state
    }

    /// Bytes queued but not yet handed to the kernel.
    pub fn pending(&self) -> usize {
        self.send_queue.len()
    }

    /// Total payload bytes returned by `recv` since the last connect.
    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn last_error(&self) -> Option<SockError> {
        self.error
    }

    /// True when the peer ended the stream with an orderly shutdown.
    pub fn closed_cleanly(&self) -> bool {
        self.state == SockState::Closed && self.error == Some(SockError::Eof)
    }

    pub fn remote(&self) -> Option<SocketAddr> {
        self.remote
    }

    pub fn connected_at(&self) -> Option<Instant> {
        self.connected_at
    }

    pub fn buffer_size(&self) -> usize {
        self.bufsize
    }
}

impl Default for HttpSock {
    fn default() -> Self {
        Self::new()
    }
}

fn os_error(err: &io::Error) -> SockError {
    SockError::Os(err.raw_os_error().unwrap_or(-1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_socket_refuses_sends() {
        let mut sock = HttpSock::new();
        assert_eq!(sock.state(), SockState::Closed);
        assert!(matches!(sock.send(b"GET"), Err(Error::NotConnected)));
        assert_eq!(sock.pending(), 0);
    }

    #[test]
    fn closed_socket_reports_closed() {
        let mut sock = HttpSock::new();
        let mut buf = [0u8; 8];
        assert_eq!(sock.recv(&mut buf), RecvStatus::Closed);
        assert_eq!(sock.byte(), ByteRead::Closed);
        assert_eq!(sock.recv(&mut []), RecvStatus::WouldBlock);
    }

    #[test]
    fn zero_window_is_done_without_reading() {
        let mut sock = HttpSock::new();
        sock.set_window(0);
        let mut buf = [0u8; 8];
        assert_eq!(sock.bounded_recv(&mut buf), BlockRead::Done);
        // The window is now spent; a closed socket reports that instead.
        assert_eq!(sock.bounded_recv(&mut buf), BlockRead::Closed);
    }

    #[test]
    fn negative_window_selects_endless_mode() {
        let mut sock = HttpSock::new();
        sock.set_window(-1);
        let mut buf = [0u8; 8];
        assert_eq!(sock.bounded_recv(&mut buf), BlockRead::Closed);
    }

    #[test]
    fn buffer_resize_updates_size() {
        let mut sock = HttpSock::with_buffer_size(128);
        assert_eq!(sock.buffer_size(), 128);
        sock.set_buffer_size(4096).unwrap();
        assert_eq!(sock.buffer_size(), 4096);
        sock.set_buffer_size(0).unwrap();
        assert_eq!(sock.buffer_size(), 1);
    }
}

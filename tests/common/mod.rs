//! Loopback server and client drivers shared by the integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use pullhttp::{Connection, RecvResult, UrlHandle};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Upper bound on how long a client driver may spin before failing.
pub const DEADLINE: Duration = Duration::from_secs(5);

/// What the server sends back, and how.
pub struct Script {
    pub fragments: Vec<Vec<u8>>,
    pub delay: Duration,
    /// How long the connection stays open after the last write.
    pub linger: Duration,
    /// Request body size to wait for when no `Content-Length` is sent.
    pub body_len: Option<usize>,
}

impl Script {
    pub fn whole(response: impl Into<Vec<u8>>) -> Self {
        Self {
            fragments: vec![response.into()],
            delay: Duration::ZERO,
            linger: Duration::ZERO,
            body_len: None,
        }
    }

    /// Send `response` in pieces of `size` bytes, pausing before each.
    pub fn fragmented(response: &[u8], size: usize, delay: Duration) -> Self {
        Self {
            fragments: response.chunks(size).map(<[u8]>::to_vec).collect(),
            delay,
            linger: Duration::ZERO,
            body_len: None,
        }
    }

    pub fn linger(mut self, linger: Duration) -> Self {
        self.linger = linger;
        self
    }

    pub fn request_body(mut self, len: usize) -> Self {
        self.body_len = Some(len);
        self
    }
}

/// Accept one connection, read the request, play `script`, then close.
///
/// The join handle yields the raw request bytes.
pub async fn serve_once(script: Script) -> (SocketAddr, JoinHandle<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut socket, _peer) = listener.accept().await.unwrap();
        socket.set_nodelay(true).unwrap();

        let request = read_request(&mut socket, script.body_len).await;

        for fragment in &script.fragments {
            if !script.delay.is_zero() {
                tokio::time::sleep(script.delay).await;
            }
            if socket.write_all(fragment).await.is_err() {
                return request;
            }
            let _ = socket.flush().await;
        }

        tokio::time::sleep(script.linger).await;
        request
    });

    (addr, handle)
}

async fn read_request(socket: &mut tokio::net::TcpStream, body_len: Option<usize>) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut temp = [0u8; 1024];

    let header_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = socket.read(&mut temp).await.unwrap_or(0);
        if n == 0 {
            return buf;
        }
        buf.extend_from_slice(&temp[..n]);
    };

    let headers = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let body_len = body_len
        .or_else(|| content_length(&headers))
        .unwrap_or(0);

    while buf.len() < header_end + body_len {
        let n = socket.read(&mut temp).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&temp[..n]);
    }

    buf
}

fn content_length(headers: &str) -> Option<usize> {
    headers.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if name.trim().eq_ignore_ascii_case("Content-Length") {
            value.trim().parse().ok()
        } else {
            None
        }
    })
}

/// Pull the whole body out of `conn` using a caller buffer of `chunk` bytes.
pub fn drain_connection(conn: &mut Connection, chunk: usize) -> (Vec<u8>, RecvResult) {
    let start = Instant::now();
    let mut body = Vec::new();
    let mut buf = vec![0u8; chunk];

    loop {
        match conn.recv(&mut buf) {
            RecvResult::Bytes(n) => body.extend_from_slice(&buf[..n]),
            RecvResult::WouldBlock => {
                assert!(start.elapsed() < DEADLINE, "response did not finish in time");
                conn.update(50);
            }
            other => return (body, other),
        }
    }
}

/// Like [`drain_connection`], through the URL handle.
pub fn drain_handle(handle: &mut UrlHandle, chunk: usize) -> (Vec<u8>, RecvResult) {
    let start = Instant::now();
    let mut body = Vec::new();
    let mut buf = vec![0u8; chunk];

    loop {
        match handle.read(&mut buf, 50) {
            RecvResult::Bytes(n) => body.extend_from_slice(&buf[..n]),
            RecvResult::WouldBlock => {
                assert!(start.elapsed() < DEADLINE, "response did not finish in time");
            }
            other => return (body, other),
        }
    }
}

/// Deterministic test payload.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 31 + 7) % 251) as u8).collect()
}

/// Chunk-encode `data`, cycling through `sizes` for the chunk lengths.
pub fn chunk_encode(data: &[u8], sizes: &[usize]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut offset = 0;
    let mut sizes = sizes.iter().cycle();

    while offset < data.len() {
        let size = (*sizes.next().unwrap()).min(data.len() - offset).max(1);
        out.extend_from_slice(format!("{:x}\r\n", size).as_bytes());
        out.extend_from_slice(&data[offset..offset + size]);
        out.extend_from_slice(b"\r\n");
        offset += size;
    }

    out.extend_from_slice(b"0\r\n\r\n");
    out
}

//! Tests for the pseudo-blocking socket wrapper against a loopback server

mod common;

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use common::{DEADLINE, Script, payload, serve_once};
use pullhttp::Error;
use pullhttp::net::{BlockRead, HttpSock, Interest, LineRead, SockError, SockState};

fn wait(sock: &HttpSock) {
    let interest = match sock.state() {
        SockState::Connecting => Interest::WRITE,
        _ => Interest::READ,
    };
    sock.poll(interest, 20);
}

fn read_line(sock: &mut HttpSock) -> (Vec<u8>, LineRead) {
    let start = Instant::now();
    let mut line = Vec::new();
    loop {
        sock.update();
        match sock.line(&mut line) {
            LineRead::WouldBlock => {
                assert!(start.elapsed() < DEADLINE, "line did not arrive");
                wait(sock);
            }
            done => return (line, done),
        }
    }
}

fn read_window(sock: &mut HttpSock, size: i64, chunk: usize) -> (Vec<u8>, BlockRead) {
    let start = Instant::now();
    let mut out = Vec::new();
    let mut buf = vec![0u8; chunk];
    sock.set_window(size);
    loop {
        sock.update();
        match sock.bounded_recv(&mut buf) {
            BlockRead::Count(n) => out.extend_from_slice(&buf[..n]),
            BlockRead::WouldBlock => {
                assert!(start.elapsed() < DEADLINE, "window did not fill");
                wait(sock);
            }
            done => return (out, done),
        }
    }
}

/// Two lines, a 100 byte block, then whatever follows until close.
fn exchange(addr: SocketAddr, bufsize: usize) -> (Vec<Vec<u8>>, Vec<u8>, Vec<u8>, bool) {
    let mut sock = HttpSock::with_buffer_size(bufsize);
    sock.connect(addr).unwrap();
    sock.send(b"HELLO\r\n\r\n").unwrap();

    let (first, status) = read_line(&mut sock);
    assert_eq!(status, LineRead::Complete);
    let (second, status) = read_line(&mut sock);
    assert_eq!(status, LineRead::Complete);

    let (block, status) = read_window(&mut sock, 100, 7);
    assert_eq!(status, BlockRead::Done);

    let (rest, status) = read_window(&mut sock, -1, 64);
    assert_eq!(status, BlockRead::Closed);

    (vec![first, second], block, rest, sock.closed_cleanly())
}

fn stream_bytes() -> Vec<u8> {
    let mut bytes = b"first line\r\nsecond\n".to_vec();
    bytes.extend_from_slice(&payload(100));
    bytes.extend_from_slice(b"trailing bytes");
    bytes
}

#[tokio::test]
async fn test_line_and_window_reads() {
    let (addr, server) = serve_once(Script::whole(stream_bytes())).await;

    let (lines, block, rest, clean) =
        tokio::task::spawn_blocking(move || exchange(addr, 4096)).await.unwrap();

    assert_eq!(lines[0], b"first line\r\n");
    assert_eq!(lines[1], b"second\n");
    assert_eq!(block, payload(100));
    assert_eq!(rest, b"trailing bytes");
    assert!(clean);

    let request = server.await.unwrap();
    assert_eq!(request, b"HELLO\r\n\r\n");
}

#[tokio::test]
async fn test_reads_are_identical_under_fragmentation() {
    let (addr, _server) = serve_once(Script::whole(stream_bytes())).await;
    let whole = tokio::task::spawn_blocking(move || exchange(addr, 4096))
        .await
        .unwrap();

    for (fragment, bufsize) in [(1, 3), (3, 1), (5, 64), (64, 2)] {
        let script = Script::fragmented(&stream_bytes(), fragment, Duration::from_millis(1));
        let (addr, _server) = serve_once(script).await;
        let split = tokio::task::spawn_blocking(move || exchange(addr, bufsize))
            .await
            .unwrap();
        assert_eq!(split, whole, "fragment {} buffer {}", fragment, bufsize);
    }
}

#[tokio::test]
async fn test_received_counts_payload_bytes() {
    let (addr, _server) = serve_once(Script::whole(payload(300))).await;

    let received = tokio::task::spawn_blocking(move || {
        let mut sock = HttpSock::new();
        sock.connect(addr).unwrap();
        sock.send(b"\r\n\r\n").unwrap();
        let (data, status) = read_window(&mut sock, -1, 128);
        assert_eq!(status, BlockRead::Closed);
        assert_eq!(data.len(), 300);
        sock.received()
    })
    .await
    .unwrap();

    assert_eq!(received, 300);
}

#[tokio::test]
async fn test_assign_connected_stream() {
    let (addr, server) = serve_once(Script::whole(b"pong\n".to_vec())).await;

    let line = tokio::task::spawn_blocking(move || {
        let stream = std::net::TcpStream::connect(addr).unwrap();
        let mut sock = HttpSock::new();
        sock.assign(stream).unwrap();
        assert_eq!(sock.state(), SockState::Connected);
        assert_eq!(sock.remote(), Some(addr));
        assert!(sock.connected_at().is_some());

        sock.send(b"ping\r\n\r\n").unwrap();
        sock.update();
        let (line, status) = read_line(&mut sock);
        assert_eq!(status, LineRead::Complete);
        line
    })
    .await
    .unwrap();

    assert_eq!(line, b"pong\n");
    assert_eq!(server.await.unwrap(), b"ping\r\n\r\n");
}

#[tokio::test]
async fn test_connect_refused() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    tokio::task::spawn_blocking(move || {
        let mut sock = HttpSock::new();
        sock.connect(addr).unwrap();

        let start = Instant::now();
        while sock.state() != SockState::Closed {
            assert!(start.elapsed() < DEADLINE, "connect never failed");
            wait(&sock);
            sock.update();
        }

        assert!(matches!(sock.last_error(), Some(SockError::Os(_))));
        assert!(!sock.closed_cleanly());

        let mut buf = [0u8; 16];
        assert_eq!(sock.bounded_recv(&mut buf), BlockRead::Closed);
        assert!(matches!(sock.send(b"late"), Err(Error::NotConnected)));
        assert_eq!(sock.pending(), 0);
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_send_after_close_drops_queue() {
    let (addr, _server) = serve_once(Script::whole(Vec::new())).await;

    tokio::task::spawn_blocking(move || {
        let mut sock = HttpSock::new();
        sock.connect(addr).unwrap();
        sock.send(b"queued").unwrap();
        assert_eq!(sock.pending(), 6);

        sock.close();
        assert_eq!(sock.state(), SockState::Closed);
        assert!(matches!(sock.send(b"more"), Err(Error::NotConnected)));
        assert_eq!(sock.pending(), 0);
    })
    .await
    .unwrap();
}

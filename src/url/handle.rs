//! Open/read/write/close over one HTTP exchange.

use crate::error::{Error, Result};
use crate::http::connection::Connection;
use crate::http::request::{Method, RequestBody};
use crate::http::response::{HttpResult, RecvResult, ResponseHead};
use crate::url::split;

/// Ensures the caller sees the terminal `Done` exactly once, after the last
/// body bytes have been handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoneLatch {
    Active,
    /// The body ended during a read that also returned bytes.
    LastDeliveryPending,
    Reported,
}

impl DoneLatch {
    /// `Some(Done)` when completion is known and the engine must not be
    /// touched again.
    fn check(&mut self) -> Option<RecvResult> {
        match self {
            DoneLatch::Active => None,
            DoneLatch::LastDeliveryPending | DoneLatch::Reported => {
                *self = DoneLatch::Reported;
                Some(RecvResult::Done)
            }
        }
    }

    fn arm(&mut self) {
        if *self == DoneLatch::Active {
            *self = DoneLatch::LastDeliveryPending;
        }
    }

    fn report(&mut self) {
        *self = DoneLatch::Reported;
    }
}

/// A single request to an `http://` URL, optionally through a proxy.
pub struct UrlHandle {
    url: String,
    host: String,
    proxy: String,
    conn: Connection,
    done: DoneLatch,
}

impl UrlHandle {
    /// Open `url` and queue the request.
    ///
    /// A body makes the request a POST. `extra_headers` is raw CRLF-separated
    /// header text. With `proxy` (`host[:port]`) the connection goes to the
    /// proxy and the request line carries the full URL.
    pub fn open(
        url: &str,
        body: Option<RequestBody<'_>>,
        extra_headers: Option<&str>,
        proxy: Option<&str>,
    ) -> Result<Self> {
        Self::open_with(Connection::new(), url, body, extra_headers, proxy)
    }

    /// Like [`UrlHandle::open`], on a caller-supplied connection.
    pub fn open_with(
        mut conn: Connection,
        url: &str,
        body: Option<RequestBody<'_>>,
        extra_headers: Option<&str>,
        proxy: Option<&str>,
    ) -> Result<Self> {
        let parts = split(url);
        if !parts.protocol.eq_ignore_ascii_case("http") {
            return Err(Error::UnsupportedProtocol(parts.protocol));
        }

        let target = match proxy {
            Some(proxy) => {
                conn.open(proxy)?;
                conn.set_host(&parts.host);
                url.to_string()
            }
            None => {
                conn.open(&parts.host)?;
                parts.path.clone()
            }
        };

        let (method, body) = match body {
            Some(RequestBody::Full(bytes)) => (Method::POST, Some(bytes)),
            Some(RequestBody::Streamed) => (Method::POST, None),
            None => (Method::GET, None),
        };

        let mut headers = String::from("Connection: Close\r\n");
        if let Some(extra) = extra_headers {
            headers.push_str(extra);
        }

        conn.request(method, &target, body, Some(headers.as_str()))?;
        conn.update(0);

        tracing::debug!(url = %url, proxy = ?proxy, method = method.as_str(), "URL opened");

        Ok(Self {
            url: url.to_string(),
            host: parts.host,
            proxy: proxy.unwrap_or("").to_string(),
            conn,
            done: DoneLatch::Active,
        })
    }

    /// Read body bytes into `data`, waiting up to `wait_ms` in total.
    ///
    /// Returns `Bytes(n)` whenever anything was read; completion is then
    /// reported by the following call.
    pub fn read(&mut self, data: &mut [u8], wait_ms: u64) -> RecvResult {
        if self.conn.pending() > 0 {
            self.conn.update(0);
        }

        if let Some(done) = self.done.check() {
            return done;
        }

        let mut read = 0;
        let mut wait = wait_ms;
        let result = loop {
            if read == data.len() {
                break RecvResult::Bytes(read);
            }
            match self.conn.recv(&mut data[read..]) {
                RecvResult::Bytes(n) => read += n,
                RecvResult::WouldBlock => {
                    if wait == 0 {
                        break RecvResult::WouldBlock;
                    }
                    wait = self.conn.pump(wait);
                }
                RecvResult::Done => {
                    if read == 0 {
                        self.done.report();
                        return RecvResult::Done;
                    }
                    self.done.arm();
                    break RecvResult::Bytes(read);
                }
                other => break other,
            }
        };

        if read > 0 {
            RecvResult::Bytes(read)
        } else {
            result
        }
    }

    /// Queue more request body; returns the number of bytes still unsent.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.conn.send(data)?;
        self.conn.update(0);
        Ok(self.conn.pending())
    }

    /// Push queued bytes to the network without waiting.
    pub fn flush(&mut self) {
        self.conn.update(0);
    }

    pub fn close(mut self) {
        tracing::trace!(url = %self.url, "URL closed");
        self.conn.close();
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Proxy address, empty for direct connections.
    pub fn proxy(&self) -> &str {
        &self.proxy
    }

    pub fn head(&self) -> &ResponseHead {
        self.conn.head()
    }

    pub fn result(&self) -> HttpResult {
        self.conn.result()
    }

    pub fn latch(&self) -> DoneLatch {
        self.done
    }

    pub fn pending(&self) -> usize {
        self.conn.pending()
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

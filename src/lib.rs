//! pullhttp - non-blocking HTTP/1.1 client
//!
//! Connects, sends a request and receives the response without ever
//! blocking the calling thread; the caller drives progress with explicit
//! wait budgets.

pub mod config;
pub mod error;
pub mod http;
pub mod net;
pub mod url;

pub use error::{Error, Result};
pub use http::connection::{Connection, WAIT_FOREVER};
pub use http::request::{Method, RequestBody};
pub use http::response::{HttpResult, RecvResult, ResponseHead};
pub use url::UrlHandle;

//! HTTP protocol implementation.
//!
//! This module implements the client side of HTTP/1.1 on top of a
//! non-blocking [`crate::net::HttpSock`].
//!
//! # Architecture
//!
//! - **`connection`**: The engine driving request emission and the response state machine
//! - **`parser`**: Pure parsing of status lines, header fields and chunk sizes
//! - **`request`**: Request method, body kinds and header line builder
//! - **`response`**: Response metadata, result codes and receive results
//!
//! # Receive State Machine
//!
//! Each call to `Connection::recv` advances this machine as far as the
//! buffered input allows:
//!
//! ```text
//!        ┌─────────────┐
//!        │   Waiting   │ ← Reset header buffers
//!        └──────┬──────┘
//!               │
//!               ▼
//!        ┌──────────────────┐
//!        │  ReadingHeader   │ ← One line at a time; 404/416/other abort
//!        └──────┬───────────┘
//!               │ Blank line
//!               ▼
//!        ┌──────────────────┐
//!        │   ReadingData    │ ← Bounded window, or the chunk machine:
//!        └──────┬───────────┘   Head → Data → Tail → (Head | Done)
//!               │ Done
//!               └─ Waiting
//! ```
//!
//! # Example
//!
//! ```ignore
//! use pullhttp::http::connection::{Connection, WAIT_FOREVER};
//! use pullhttp::http::request::Method;
//!
//! let mut conn = Connection::new();
//! conn.open("example.com")?;
//! conn.request(Method::GET, "/", None, Some("Connection: Close"))?;
//!
//! let mut body = Vec::new();
//! let result = conn.getresponse(&mut body, WAIT_FOREVER);
//! ```

pub mod connection;
pub mod parser;
pub mod request;
pub mod response;

//! Socket layer: readiness polling and the pseudo-blocking socket wrapper.

pub mod socket;
pub mod sys;

pub use socket::{BlockRead, ByteRead, HttpSock, LineRead, RecvStatus, SockError, SockState};
pub use sys::Interest;

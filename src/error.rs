use std::io;

/// Errors returned by the synchronous parts of the client.
///
/// The data path never fails through this type: receive operations report
/// their outcome through the tri-state enums in [`crate::net`] and
/// [`crate::http`] instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The receive buffer could not be allocated.
    #[error("buffer allocation of {0} bytes failed")]
    Alloc(usize),

    /// Creating or configuring the socket failed.
    #[error("socket error: {0}")]
    Socket(#[from] io::Error),

    /// The host name did not resolve to any address.
    #[error("cannot resolve host: {0}")]
    Resolve(String),

    /// The `:port` suffix was not a valid port number.
    #[error("invalid port: {0}")]
    InvalidPort(String),

    /// Only plain `http` URLs are handled.
    #[error("unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    /// Data was queued on a socket that is closed.
    #[error("socket is not connected")]
    NotConnected,

    /// A GET request was given a body.
    #[error("GET requests cannot carry a body")]
    BodyOnGet,
}

pub type Result<T> = std::result::Result<T, Error>;

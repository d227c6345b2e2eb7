//! Readiness polling and non-blocking connect on raw descriptors.
//!
//! Everything here is a single syscall (or a short fixed sequence of them);
//! nothing loops or waits beyond the timeout handed in by the caller.

use std::io;
use std::net::{SocketAddr, TcpStream};
use std::ops::{BitAnd, BitOr, BitOrAssign};
use std::os::fd::{AsRawFd, FromRawFd, RawFd};

/// Readiness events for a single descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Interest(u8);

impl Interest {
    pub const NONE: Interest = Interest(0);
    pub const READ: Interest = Interest(0b001);
    pub const WRITE: Interest = Interest(0b010);
    pub const ERROR: Interest = Interest(0b100);

    /// True when any event in `other` is also set in `self`.
    pub fn intersects(self, other: Interest) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    fn to_poll_events(self) -> libc::c_short {
        let mut events = 0;
        if self.intersects(Interest::READ) {
            events |= libc::POLLIN;
        }
        if self.intersects(Interest::WRITE) {
            events |= libc::POLLOUT;
        }
        // POLLERR and POLLHUP are always reported by the kernel.
        events
    }

    fn from_poll_events(revents: libc::c_short) -> Interest {
        let mut ready = Interest::NONE;
        if revents & (libc::POLLIN | libc::POLLPRI) != 0 {
            ready |= Interest::READ;
        }
        if revents & libc::POLLOUT != 0 {
            ready |= Interest::WRITE;
        }
        if revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
            ready |= Interest::ERROR;
        }
        ready
    }
}

impl BitOr for Interest {
    type Output = Interest;

    fn bitor(self, rhs: Interest) -> Interest {
        Interest(self.0 | rhs.0)
    }
}

impl BitOrAssign for Interest {
    fn bitor_assign(&mut self, rhs: Interest) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Interest {
    type Output = Interest;

    fn bitand(self, rhs: Interest) -> Interest {
        Interest(self.0 & rhs.0)
    }
}

/// Poll one descriptor. A negative `timeout_ms` waits indefinitely.
///
/// Returns the events that are ready, masked by `interest` except for
/// `ERROR`, which is reported whenever the kernel flags it.
pub fn poll_fd(fd: RawFd, interest: Interest, timeout_ms: i32) -> Interest {
    let mut pfd = libc::pollfd {
        fd,
        events: interest.to_poll_events(),
        revents: 0,
    };
    let ret = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
    if ret <= 0 {
        // Timeout, or EINTR: either way nothing is known to be ready.
        return Interest::NONE;
    }
    Interest::from_poll_events(pfd.revents) & (interest | Interest::ERROR)
}

/// Create a non-blocking TCP socket suitable for `addr` with
/// `SO_REUSEADDR` enabled.
pub fn open_stream(addr: &SocketAddr) -> io::Result<TcpStream> {
    let domain = if addr.is_ipv4() {
        libc::AF_INET
    } else {
        libc::AF_INET6
    };

    let fd = unsafe { libc::socket(domain, libc::SOCK_STREAM, 0) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    // From here on the descriptor is owned and closed on drop.
    let stream = unsafe { TcpStream::from_raw_fd(fd) };
    stream.set_nonblocking(true)?;

    let optval: libc::c_int = 1;
    let ret = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            &optval as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(stream)
}

/// Issue a non-blocking connect. An in-progress handshake is `Ok`; the
/// final outcome is observed later through [`poll_fd`].
pub fn start_connect(stream: &TcpStream, addr: &SocketAddr) -> io::Result<()> {
    let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
    let len = socket_addr_to_sockaddr(addr, &mut storage);

    let ret = unsafe {
        libc::connect(
            stream.as_raw_fd(),
            &storage as *const _ as *const libc::sockaddr,
            len,
        )
    };
    if ret == 0 {
        return Ok(());
    }

    let err = io::Error::last_os_error();
    match err.raw_os_error() {
        Some(libc::EINPROGRESS) | Some(libc::EINTR) => Ok(()),
        _ => Err(err),
    }
}

/// Write a SocketAddr into a sockaddr_storage, return the address length.
fn socket_addr_to_sockaddr(
    addr: &SocketAddr,
    storage: &mut libc::sockaddr_storage,
) -> libc::socklen_t {
    match addr {
        SocketAddr::V4(v4) => {
            let sa = storage as *mut _ as *mut libc::sockaddr_in;
            unsafe {
                (*sa).sin_family = libc::AF_INET as libc::sa_family_t;
                (*sa).sin_port = v4.port().to_be();
                (*sa).sin_addr.s_addr = u32::from_ne_bytes(v4.ip().octets());
            }
            std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t
        }
        SocketAddr::V6(v6) => {
            let sa = storage as *mut _ as *mut libc::sockaddr_in6;
            unsafe {
                (*sa).sin6_family = libc::AF_INET6 as libc::sa_family_t;
                (*sa).sin6_port = v6.port().to_be();
                (*sa).sin6_flowinfo = v6.flowinfo();
                (*sa).sin6_addr.s6_addr = v6.ip().octets();
                (*sa).sin6_scope_id = v6.scope_id();
            }
            std::mem::size_of::<libc::sockaddr_in6>() as libc::socklen_t
        }
    }
}

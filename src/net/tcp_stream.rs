//! A narrow trait over the handful of `std`/`mio` TCP stream methods the rest of the crate needs,
//! so connection plumbing can stay generic over either and be driven by loopback pairs in tests.

use std::io::{Error, Result};
use std::net::{Shutdown, SocketAddr};

/// The subset of `std::net::TcpStream`'s inherent API this crate depends on.
pub trait TcpStream {
    /// Opens a new connection to `addr`.
    fn connect(addr: SocketAddr) -> Result<Self>
    where
        Self: Sized;

    /// The remote address this stream is connected to.
    fn peer_addr(&self) -> Result<SocketAddr>;

    /// The local address this stream is bound to.
    fn local_addr(&self) -> Result<SocketAddr>;

    /// Shuts down the read, write, or both halves of this connection.
    fn shutdown(&self, how: Shutdown) -> Result<()>;

    /// Sets the value of the `TCP_NODELAY` option.
    fn set_nodelay(&self, nodelay: bool) -> Result<()>;

    /// Gets the value of the `TCP_NODELAY` option.
    fn nodelay(&self) -> Result<bool>;

    /// Sets the IP time-to-live for this connection.
    fn set_ttl(&self, ttl: u32) -> Result<()>;

    /// Gets the IP time-to-live for this connection.
    fn ttl(&self) -> Result<u32>;

    /// Checks and clears this stream's pending socket error, used to distinguish a completed
    /// non-blocking connect from a failed one.
    fn take_error(&self) -> Result<Option<Error>>;

    /// Reads from the socket without consuming the data.
    fn peek(&self, buf: &mut [u8]) -> Result<usize>;
}

impl TcpStream for mio::net::TcpStream {
    #[inline]
    fn connect(addr: SocketAddr) -> Result<Self>
    where
        Self: Sized,
    {
        Self::connect(addr)
    }

    #[inline]
    fn peer_addr(&self) -> Result<SocketAddr> {
        Self::peer_addr(self)
    }

    #[inline]
    fn local_addr(&self) -> Result<SocketAddr> {
        Self::local_addr(self)
    }

    #[inline]
    fn shutdown(&self, how: Shutdown) -> Result<()> {
        Self::shutdown(self, how)
    }

    #[inline]
    fn set_nodelay(&self, nodelay: bool) -> Result<()> {
        Self::set_nodelay(self, nodelay)
    }

    #[inline]
    fn nodelay(&self) -> Result<bool> {
        Self::nodelay(self)
    }

    #[inline]
    fn set_ttl(&self, ttl: u32) -> Result<()> {
        Self::set_ttl(self, ttl)
    }

    #[inline]
    fn ttl(&self) -> Result<u32> {
        Self::ttl(self)
    }

    #[inline]
    fn take_error(&self) -> Result<Option<Error>> {
        Self::take_error(self)
    }

    #[inline]
    fn peek(&self, buf: &mut [u8]) -> Result<usize> {
        Self::peek(self, buf)
    }
}

impl TcpStream for std::net::TcpStream {
    #[inline]
    fn connect(addr: SocketAddr) -> Result<Self>
    where
        Self: Sized,
    {
        Self::connect(addr)
    }

    #[inline]
    fn peer_addr(&self) -> Result<SocketAddr> {
        Self::peer_addr(self)
    }

    #[inline]
    fn local_addr(&self) -> Result<SocketAddr> {
        Self::local_addr(self)
    }

    #[inline]
    fn shutdown(&self, how: Shutdown) -> Result<()> {
        Self::shutdown(self, how)
    }

    #[inline]
    fn set_nodelay(&self, nodelay: bool) -> Result<()> {
        Self::set_nodelay(self, nodelay)
    }

    #[inline]
    fn nodelay(&self) -> Result<bool> {
        Self::nodelay(self)
    }

    #[inline]
    fn set_ttl(&self, ttl: u32) -> Result<()> {
        Self::set_ttl(self, ttl)
    }

    #[inline]
    fn ttl(&self) -> Result<u32> {
        Self::ttl(self)
    }

    #[inline]
    fn take_error(&self) -> Result<Option<Error>> {
        Self::take_error(self)
    }

    #[inline]
    fn peek(&self, buf: &mut [u8]) -> Result<usize> {
        Self::peek(self, buf)
    }
}

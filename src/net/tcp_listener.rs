//! `TcpListener` trait, generalized from `rask::net::tcp_listener` so the acceptor pool can be
//! driven against either `mio`'s listener or a standard-library listener in tests.

use std::io::{Error, Result};
use std::net::SocketAddr;

use socket2::{Domain, Socket, Type};

use super::tcp_stream::TcpStream;

/// A bindable, non-blocking, acceptable TCP listener.
pub trait TcpListener<S: TcpStream> {
    /// Binds a new listener to `addr`.
    fn bind(addr: SocketAddr) -> Result<Self>
    where
        Self: Sized;

    /// Accepts a new incoming connection.
    fn accept(&self) -> Result<(S, SocketAddr)>;

    /// The local address this listener is bound to.
    fn local_addr(&self) -> Result<SocketAddr>;

    /// Sets the IP time-to-live for accepted connections.
    fn set_ttl(&self, ttl: u32) -> Result<()>;

    /// Gets the IP time-to-live for accepted connections.
    fn ttl(&self) -> Result<u32>;

    /// Checks and clears this listener's pending socket error.
    fn take_error(&self) -> Result<Option<Error>>;
}

/// Builds a `SO_REUSEADDR`, non-blocking listener socket with the given backlog. Mirrors
/// `proxy.py`'s `TcpSocketListener.listen`: reuseaddr, bind, `listen(backlog)`, then
/// non-blocking.
pub fn bind_nonblocking(addr: SocketAddr, backlog: i32) -> Result<mio::net::TcpListener> {
    let domain = if addr.is_ipv6() {
        Domain::IPV6
    } else {
        Domain::IPV4
    };
    let socket = Socket::new(domain, Type::STREAM, None)?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;
    socket.set_nonblocking(true)?;
    Ok(mio::net::TcpListener::from_std(socket.into()))
}

type MTcpListener = mio::net::TcpListener;
type MTcpStream = mio::net::TcpStream;

impl TcpListener<MTcpStream> for MTcpListener {
    #[inline]
    fn bind(addr: SocketAddr) -> Result<Self> {
        bind_nonblocking(addr, 1024)
    }

    #[inline]
    fn accept(&self) -> Result<(MTcpStream, SocketAddr)> {
        Self::accept(self)
    }

    #[inline]
    fn local_addr(&self) -> Result<SocketAddr> {
        Self::local_addr(self)
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
}

type STcpListener = std::net::TcpListener;
type STcpStream = std::net::TcpStream;

impl TcpListener<STcpStream> for STcpListener {
    #[inline]
    fn bind(addr: SocketAddr) -> Result<Self> {
        Self::bind(addr)
    }

    #[inline]
    fn accept(&self) -> Result<(STcpStream, SocketAddr)> {
        Self::accept(self)
    }

    #[inline]
    fn local_addr(&self) -> Result<SocketAddr> {
        Self::local_addr(self)
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
}

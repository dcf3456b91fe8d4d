//! Client and upstream connection state, generalized from `rask::connection`'s
//! `PlainConnection`/`TlsConnection` pair: same non-blocking TLS read/write idiom
//! (`read_tls`/`process_new_packets`/`wants_read`/`wants_write` driving `Interest`), but reshaped
//! around the data model's `{socket, peer_addr, recv_buffer, send_buffer, closed}` record instead
//! of owning a parser directly — `HttpProtocolHandler` (`work.rs`'s `HttpProtocolHandler`) drives
//! parsing against the bytes these connections hand back.

use std::collections::VecDeque;
use std::fmt;
use std::io::{self, ErrorKind, Read, Write};
use std::net::SocketAddr;

use mio::event::Source;
use mio::{Interest, Registry, Token};
use rustls::{ClientConnection as RustlsClientConnection, ServerConnection as RustlsServerConnection};

use crate::buffer::Buffer;
use crate::net::tcp_stream::TcpStream;

/// Either side's optional TLS wrapping. A client connection starts `Plain` and may gain a
/// `Server` wrapper mid-flow when CONNECT interception kicks in (§4.G); an upstream connection
/// gains a `Client` wrapper when dialing `https://` origins or a CONNECT target under MITM.
enum Tls {
    None,
    Server(Box<RustlsServerConnection>),
    Client(Box<RustlsClientConnection>),
}

impl Tls {
    fn wants_read(&self) -> bool {
        match self {
            Tls::None => false,
            Tls::Server(c) => c.wants_read(),
            Tls::Client(c) => c.wants_read(),
        }
    }

    fn wants_write(&self) -> bool {
        match self {
            Tls::None => false,
            Tls::Server(c) => c.wants_write(),
            Tls::Client(c) => c.wants_write(),
        }
    }
}

/// A socket plus its buffered bytes, shared shape between client and upstream connections
/// (§3 data model: `recv_buffer`, `send_buffer` FIFO, `closed`).
pub struct SocketIo<S> {
    socket: S,
    token: Token,
    peer_addr: SocketAddr,
    recv_buffer: Buffer,
    send_buffer: VecDeque<Vec<u8>>,
    closed: bool,
    tls: Tls,
}

impl<S> SocketIo<S>
where
    S: TcpStream + Read + Write + Source,
{
    fn new(socket: S, token: Token, peer_addr: SocketAddr) -> Self {
        SocketIo {
            socket,
            token,
            peer_addr,
            recv_buffer: Buffer::new(8 * 1024),
            send_buffer: VecDeque::new(),
            closed: false,
            tls: Tls::None,
        }
    }

    /// The bound mio token this socket is registered under.
    pub fn token(&self) -> Token {
        self.token
    }

    /// The remote address of this socket.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Whether this connection has been torn down and must not be read or written again.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Marks the connection closed; the executor will drop it at the next tick boundary.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Bytes received and not yet consumed by the HTTP parser driving this connection.
    pub fn recv_buffer(&self) -> &Buffer {
        &self.recv_buffer
    }

    /// Marks `amount` received bytes as consumed.
    pub fn consume(&mut self, amount: usize) {
        self.recv_buffer.mark_read(amount);
    }

    /// Queues `bytes` to be written; writable iff the queue is non-empty (§3 invariant).
    pub fn queue_write(&mut self, bytes: Vec<u8>) {
        if !bytes.is_empty() {
            self.send_buffer.push_back(bytes);
        }
    }

    /// Whether there is anything buffered to write, plaintext or still inside the TLS engine.
    pub fn is_writable(&self) -> bool {
        !self.send_buffer.is_empty() || self.tls.wants_write()
    }

    /// Wraps this connection in server-side TLS (used for MITM'd client connections once the
    /// synthesized leaf certificate is ready).
    pub fn upgrade_server_tls(&mut self, conn: RustlsServerConnection) {
        self.tls = Tls::Server(Box::new(conn));
    }

    /// Wraps this connection in client-side TLS (used when dialing an `https://` upstream).
    pub fn upgrade_client_tls(&mut self, conn: RustlsClientConnection) {
        self.tls = Tls::Client(Box::new(conn));
    }

    /// Whether this socket has been wrapped in TLS, either role.
    pub fn tls_wrapped(&self) -> bool {
        !matches!(self.tls, Tls::None)
    }

    /// Reads whatever is available into `recv_buffer`, decrypting through the TLS engine if
    /// wrapped. Returns `Ok(0)` on EOF (caller should close), `Err(WouldBlock)` if nothing was
    /// ready, propagates other I/O errors.
    pub fn recv(&mut self) -> io::Result<usize> {
        match &mut self.tls {
            Tls::None => {
                let mut buf = [0u8; 8192];
                match self.socket.read(&mut buf) {
                    Ok(0) => {
                        self.closed = true;
                        Ok(0)
                    }
                    Ok(n) => {
                        self.recv_buffer.extend(&buf[..n]);
                        Ok(n)
                    }
                    Err(e) => Err(e),
                }
            }
            Tls::Server(tls) => {
                let read = read_tls_record(tls.as_mut(), &mut self.socket)?;
                if read == 0 {
                    self.closed = true;
                    return Ok(0);
                }
                let io_state = tls
                    .process_new_packets()
                    .map_err(|e| io::Error::new(ErrorKind::InvalidData, e))?;
                let available = io_state.plaintext_bytes_to_read();
                if available > 0 {
                    let mut plain = vec![0u8; available];
                    tls.reader().read_exact(&mut plain)?;
                    self.recv_buffer.extend(&plain);
                }
                Ok(read)
            }
            Tls::Client(tls) => {
                let read = read_tls_record(tls.as_mut(), &mut self.socket)?;
                if read == 0 {
                    self.closed = true;
                    return Ok(0);
                }
                let io_state = tls
                    .process_new_packets()
                    .map_err(|e| io::Error::new(ErrorKind::InvalidData, e))?;
                let available = io_state.plaintext_bytes_to_read();
                if available > 0 {
                    let mut plain = vec![0u8; available];
                    tls.reader().read_exact(&mut plain)?;
                    self.recv_buffer.extend(&plain);
                }
                Ok(read)
            }
        }
    }

    /// Drains as much of `send_buffer` as the socket accepts, encrypting through the TLS engine
    /// if wrapped. Returns the number of plaintext (pre-encryption) bytes handed off.
    pub fn flush_writes(&mut self) -> io::Result<usize> {
        let mut total = 0;
        match &mut self.tls {
            Tls::None => {
                while let Some(front) = self.send_buffer.front_mut() {
                    match self.socket.write(front) {
                        Ok(0) => break,
                        Ok(n) => {
                            total += n;
                            if n == front.len() {
                                self.send_buffer.pop_front();
                            } else {
                                front.drain(..n);
                                break;
                            }
                        }
                        Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                        Err(e) => return Err(e),
                    }
                }
                Ok(total)
            }
            Tls::Server(tls) => {
                while let Some(front) = self.send_buffer.pop_front() {
                    tls.writer().write_all(&front)?;
                    total += front.len();
                }
                tls.write_tls(&mut self.socket)?;
                Ok(total)
            }
            Tls::Client(tls) => {
                while let Some(front) = self.send_buffer.pop_front() {
                    tls.writer().write_all(&front)?;
                    total += front.len();
                }
                tls.write_tls(&mut self.socket)?;
                Ok(total)
            }
        }
    }

    /// The `mio::Interest` this socket currently wants registered.
    pub fn interest(&self) -> Interest {
        if self.tls.wants_read() || matches!(self.tls, Tls::None) {
            if self.is_writable() {
                Interest::READABLE | Interest::WRITABLE
            } else {
                Interest::READABLE
            }
        } else {
            Interest::WRITABLE
        }
    }

    /// Registers this socket with `registry` under its token.
    pub fn register(&mut self, registry: &Registry) -> io::Result<()> {
        registry.register(&mut self.socket, self.token, self.interest())
    }

    /// Re-registers this socket, e.g. after its interest set changed.
    pub fn reregister(&mut self, registry: &Registry) -> io::Result<()> {
        registry.reregister(&mut self.socket, self.token, self.interest())
    }

    /// Deregisters this socket ahead of teardown.
    pub fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        registry.deregister(&mut self.socket)
    }

    /// Checks and clears the socket's pending error, used right after a non-blocking `connect()`
    /// becomes writable to distinguish "connected" from "connect failed".
    pub fn take_socket_error(&self) -> io::Result<()> {
        match self.socket.take_error()? {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl<S> SocketIo<S>
where
    S: TcpStream + Read + Write + Source + std::os::fd::AsRawFd,
{
    /// The raw fd backing this socket, for the threadless executor's fd-keyed readiness map.
    pub fn raw_fd(&self) -> std::os::fd::RawFd {
        self.socket.as_raw_fd()
    }
}

impl<S> fmt::Debug for SocketIo<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketIo")
            .field("token", &self.token)
            .field("peer_addr", &self.peer_addr)
            .field("closed", &self.closed)
            .field("tls_wrapped", &!matches!(self.tls, Tls::None))
            .finish_non_exhaustive()
    }
}

fn read_tls_record<C, S>(conn: &mut C, socket: &mut S) -> io::Result<usize>
where
    C: ReadTls,
    S: Read,
{
    let mut total = 0;
    loop {
        match conn.read_tls(socket) {
            Ok(0) => return Ok(total),
            Ok(n) => total += n,
            Err(e) => match e.kind() {
                ErrorKind::WouldBlock => return Ok(total),
                ErrorKind::Interrupted => continue,
                _ => return Err(e),
            },
        }
    }
}

/// Narrows `rustls::ServerConnection`/`ClientConnection` to the one method `read_tls_record`
/// needs, so it can drive either role identically.
trait ReadTls {
    fn read_tls(&mut self, rd: &mut dyn io::Read) -> io::Result<usize>;
}

impl ReadTls for RustlsServerConnection {
    fn read_tls(&mut self, rd: &mut dyn io::Read) -> io::Result<usize> {
        RustlsServerConnection::read_tls(self, rd)
    }
}

impl ReadTls for RustlsClientConnection {
    fn read_tls(&mut self, rd: &mut dyn io::Read) -> io::Result<usize> {
        RustlsClientConnection::read_tls(self, rd)
    }
}

/// The client-facing half of a connection (§3 `Client connection`).
pub struct ClientConnection<S> {
    io: SocketIo<S>,
}

impl<S> ClientConnection<S>
where
    S: TcpStream + Read + Write + Source,
{
    /// Wraps a freshly-accepted client socket.
    pub fn new(socket: S, token: Token, peer_addr: SocketAddr) -> Self {
        ClientConnection {
            io: SocketIo::new(socket, token, peer_addr),
        }
    }

    /// The underlying socket I/O state.
    pub fn io(&self) -> &SocketIo<S> {
        &self.io
    }

    /// The underlying socket I/O state, mutably.
    pub fn io_mut(&mut self) -> &mut SocketIo<S> {
        &mut self.io
    }
}

impl<S> fmt::Debug for ClientConnection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConnection").field("io", &self.io).finish()
    }
}

/// The upstream half of a connection (§3 `Upstream connection`), owned by the HTTP protocol
/// handler once it dials out.
pub struct UpstreamConnection<S> {
    io: SocketIo<S>,
    host_port: String,
}

impl<S> UpstreamConnection<S>
where
    S: TcpStream + Read + Write + Source,
{
    /// Wraps a freshly-dialed upstream socket bound for `host_port`.
    pub fn new(socket: S, token: Token, peer_addr: SocketAddr, host_port: String) -> Self {
        UpstreamConnection {
            io: SocketIo::new(socket, token, peer_addr),
            host_port,
        }
    }

    /// The `host:port` this connection was dialed for, used to key keep-alive reuse and the
    /// certificate cache.
    pub fn host_port(&self) -> &str {
        &self.host_port
    }

    /// The underlying socket I/O state.
    pub fn io(&self) -> &SocketIo<S> {
        &self.io
    }

    /// The underlying socket I/O state, mutably.
    pub fn io_mut(&mut self) -> &mut SocketIo<S> {
        &mut self.io
    }
}

impl<S> fmt::Debug for UpstreamConnection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConnection")
            .field("io", &self.io)
            .field("host_port", &self.host_port)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener as StdTcpListener, TcpStream as StdTcpStream};

    fn loopback_pair() -> (mio::net::TcpStream, mio::net::TcpStream) {
        let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = StdTcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        server.set_nonblocking(true).unwrap();
        client.set_nonblocking(true).unwrap();
        (
            mio::net::TcpStream::from_std(server),
            mio::net::TcpStream::from_std(client),
        )
    }

    #[test]
    fn plain_roundtrip_through_recv_buffer() {
        let (server, mut client) = loopback_pair();
        client.write_all(b"hello").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));

        let mut conn = ClientConnection::new(server, Token(0), "127.0.0.1:0".parse().unwrap());
        let _ = conn.io_mut().recv();
        assert_eq!(conn.io().recv_buffer().as_slice(), b"hello");
    }

    #[test]
    fn queue_write_marks_writable() {
        let (server, _client) = loopback_pair();
        let mut conn = ClientConnection::new(server, Token(0), "127.0.0.1:0".parse().unwrap());
        assert!(!conn.io().is_writable());
        conn.io_mut().queue_write(b"data".to_vec());
        assert!(conn.io().is_writable());
    }
}

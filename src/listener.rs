//! Listener pool (§4.C): binds every configured TCP `(host, port)` pair plus an optional Unix
//! socket, and reports back the realized ports so the ephemeral-port collaborator (port file,
//! `--port 0`) can read them once, before acceptors start.
//!
//! Generalized from the teacher's `Listener<T, S>`, which bound exactly one socket and ran its
//! own accept loop inline. Binding is pulled out on its own here because the acceptor pool (§4.D)
//! needs the raw fds shared across forked workers before any accept loop runs.

use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::path::Path;

use crate::config::{HostPort, ProxyConfig};
use crate::net::tcp_listener::bind_nonblocking;

/// One bound listener: either a TCP socket or, at index 0 when configured, a Unix domain socket.
pub enum BoundListener {
    /// A bound, non-blocking TCP listener.
    Tcp(mio::net::TcpListener),
    /// A bound, non-blocking Unix domain listener.
    Unix(mio::net::UnixListener),
}

impl std::fmt::Debug for BoundListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BoundListener::Tcp(_) => f.debug_struct("BoundListener::Tcp").field("port", &self.port()).finish(),
            BoundListener::Unix(_) => f.debug_struct("BoundListener::Unix").finish(),
        }
    }
}

impl BoundListener {
    /// The raw fd backing this listener, for sharing with forked acceptor workers.
    pub fn as_raw_fd(&self) -> RawFd {
        match self {
            BoundListener::Tcp(l) => l.as_raw_fd(),
            BoundListener::Unix(l) => l.as_raw_fd(),
        }
    }

    /// The realized TCP port, or `None` for a Unix listener.
    pub fn port(&self) -> Option<u16> {
        match self {
            BoundListener::Tcp(l) => l.local_addr().ok().map(|a| a.port()),
            BoundListener::Unix(_) => None,
        }
    }
}

/// An ordered set of bound listeners. The Unix socket, if configured, is always at index 0
/// (§4.C). Shutdown closes in reverse order.
pub struct ListenerPool {
    listeners: Vec<BoundListener>,
}

impl std::fmt::Debug for ListenerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerPool").field("listeners", &self.listeners).finish()
    }
}

impl ListenerPool {
    /// Binds every listener named by `config`: the Unix socket first if configured, then the
    /// primary `hostname:port`, then every additional `hostnames × ports` combination.
    pub fn bind(config: &ProxyConfig) -> io::Result<Self> {
        let mut listeners = Vec::new();

        if let Some(path) = &config.unix_socket_path {
            listeners.push(BoundListener::Unix(bind_unix_nonblocking(path)?));
        }

        for target in config.listener_targets() {
            listeners.push(BoundListener::Tcp(bind_tcp(target, config.backlog)?));
        }

        Ok(ListenerPool { listeners })
    }

    /// The bound listeners, in bind order.
    pub fn listeners(&self) -> &[BoundListener] {
        &self.listeners
    }

    /// The realized TCP ports, in bind order, skipping the Unix socket if present.
    pub fn realized_ports(&self) -> Vec<u16> {
        self.listeners.iter().filter_map(BoundListener::port).collect()
    }

    /// Closes every listener in reverse bind order (§4.C: "Shutdown closes in reverse order").
    pub fn shutdown(mut self) {
        while self.listeners.pop().is_some() {
            // drop order runs the close; the loop just makes the reverse order explicit.
        }
    }
}

fn bind_tcp(target: HostPort, backlog: i32) -> io::Result<mio::net::TcpListener> {
    bind_nonblocking(std::net::SocketAddr::new(target.host, target.port), backlog)
}

fn bind_unix_nonblocking(path: &Path) -> io::Result<mio::net::UnixListener> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    let listener = std::os::unix::net::UnixListener::bind(path)?;
    listener.set_nonblocking(true)?;
    Ok(mio::net::UnixListener::from_std(listener))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;

    #[test]
    fn binds_primary_target_and_reports_ephemeral_port() {
        let config = ProxyConfig {
            hostname: IpAddr::from([127, 0, 0, 1]),
            port: 0,
            ..Default::default()
        };
        let pool = ListenerPool::bind(&config).unwrap();
        let ports = pool.realized_ports();
        assert_eq!(ports.len(), 1);
        assert_ne!(ports[0], 0);
    }

    #[test]
    fn binds_additional_hostnames_and_ports() {
        let config = ProxyConfig {
            hostname: IpAddr::from([127, 0, 0, 1]),
            port: 0,
            ports: vec![0, 0],
            ..Default::default()
        };
        let pool = ListenerPool::bind(&config).unwrap();
        assert_eq!(pool.realized_ports().len(), 3);
    }
}

//! `ProxyConfig` carries what the out-of-scope CLI/flag-parser collaborator would otherwise hand
//! the engine. It is constructed once, before the acceptor pool forks, and is treated as
//! immutable afterwards: a mutation in a forked child is only ever visible to that child
//! (`§9 Design Notes`, "Cross-process shared state").

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

/// A single `(host, port)` pair to bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostPort {
    /// Bind address.
    pub host: IpAddr,
    /// Bind port. `0` requests an ephemeral port.
    pub port: u16,
}

impl HostPort {
    /// Convenience constructor.
    pub fn new(host: IpAddr, port: u16) -> Self {
        Self { host, port }
    }
}

/// TLS CA material used to sign synthesized MITM leaf certificates.
#[derive(Debug, Clone)]
pub struct CaMaterial {
    /// PEM-encoded CA certificate path.
    pub cert_path: PathBuf,
    /// PEM-encoded CA private key path.
    pub key_path: PathBuf,
}

/// Optional PAC (proxy auto-config) content to serve at `/` on a plain HTTP request.
#[derive(Debug, Clone)]
pub enum PacFile {
    /// Literal PAC script bytes.
    Literal(Vec<u8>),
    /// Path to a PAC script on disk, read at startup.
    Path(PathBuf),
}

/// Immutable configuration snapshot for one engine instance.
///
/// Mirrors the fields named in `spec.md §6`'s CLI surface, minus the parsing itself.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Primary listen host.
    pub hostname: IpAddr,
    /// Additional listen hosts.
    pub hostnames: Vec<IpAddr>,
    /// Primary listen port. `0` for ephemeral.
    pub port: u16,
    /// Additional listen ports.
    pub ports: Vec<u16>,
    /// Optional Unix domain socket path; always listener index 0 when set.
    pub unix_socket_path: Option<PathBuf>,
    /// Where to write the realized port(s), one per line.
    pub port_file: Option<PathBuf>,
    /// Where to write the parent process id.
    pub pid_file: Option<PathBuf>,
    /// Listen backlog.
    pub backlog: i32,
    /// Whether to run in threadless (multi-process executor) mode.
    pub threadless: bool,
    /// Number of acceptor worker processes. `None` means "CPU count".
    pub num_workers: Option<usize>,
    /// Number of threadless executor processes. `0` (with `threadless = true`) means
    /// "acceptors spawn a companion thread per connection" (`local_executor` mode).
    pub local_executor: usize,
    /// `user:password` basic-auth credential, if enabled.
    pub basic_auth: Option<String>,
    /// CA material for TLS interception; `None` disables MITM (CONNECT is relayed opaquely).
    pub ca: Option<CaMaterial>,
    /// Byte/sec budget applied to each direction of every connection.
    pub rate_limit_bytes_per_sec: u64,
    /// Idle-connection timeout. Default 30s (`§9`, Open Questions).
    pub idle_timeout: Duration,
    /// Whether the cross-process event queue is enabled.
    pub enable_events: bool,
    /// Optional PAC content served at `/`.
    pub pac_file: Option<PacFile>,
    /// Maximum open files/connections this process targets.
    pub open_file_limit: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            hostname: IpAddr::from([127, 0, 0, 1]),
            hostnames: Vec::new(),
            port: 8899,
            ports: Vec::new(),
            unix_socket_path: None,
            port_file: None,
            pid_file: None,
            backlog: 1024,
            threadless: true,
            num_workers: None,
            local_executor: 1,
            basic_auth: None,
            ca: None,
            rate_limit_bytes_per_sec: u64::MAX,
            idle_timeout: Duration::from_secs(30),
            enable_events: false,
            pac_file: None,
            open_file_limit: 1024,
        }
    }
}

impl ProxyConfig {
    /// All configured listener addresses in bind order: unix socket (if any) first, then
    /// `hostname:port`, then every `hostnames x ports` combination — mirroring
    /// `ListenerPool`'s expectations in `§4.C`.
    pub fn listener_targets(&self) -> Vec<HostPort> {
        let mut targets = vec![HostPort::new(self.hostname, self.port)];
        for host in &self.hostnames {
            targets.push(HostPort::new(*host, self.port));
        }
        for port in &self.ports {
            targets.push(HostPort::new(self.hostname, *port));
        }
        targets
    }

    /// Number of acceptor worker processes to spawn.
    pub fn worker_count(&self) -> usize {
        self.num_workers
            .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, |n| n.get()))
    }
}

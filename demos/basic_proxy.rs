//! Minimal CLI wrapper around the engine: parses a handful of flags with `clap`, builds a
//! [`ProxyConfig`], and drives it to completion. Stands in for the out-of-scope CLI/flag-parsing
//! collaborator described in the external interfaces section — this binary, not the library, is
//! the only place `clap` is a dependency.
//!
//! Runs a single accept thread feeding a single [`ThreadlessExecutor`] in-process; the
//! multi-process acceptor pool (`AcceptorPool`) is exercised by its own unit tests rather than
//! wired up here, since forking a CLI example would complicate the one thing this binary exists
//! to show off.

use std::cell::RefCell;
use std::net::IpAddr;
use std::os::fd::{FromRawFd, IntoRawFd};
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use crossbeam_channel::unbounded;
use mio::Token;
use nix::sys::signal::{self, SigHandler, Signal};

use interceptproxy::config::{CaMaterial, ProxyConfig};
use interceptproxy::events::EventDispatcher;
use interceptproxy::executor::{InboundConnection, ThreadlessExecutor};
use interceptproxy::http_handler::{HandlerContext, HttpProtocolHandler};
use interceptproxy::listener::{BoundListener, ListenerPool};
use interceptproxy::plugin::PluginChain;
use interceptproxy::tls::{CertificateAuthority, CertificateCache};
use interceptproxy::work::Work;

/// A pluggable, TLS-interception-capable HTTP/HTTPS proxy.
#[derive(Parser, Debug)]
#[command(name = "basic_proxy", version, about)]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1")]
    hostname: IpAddr,

    /// Port to listen on. 0 picks an ephemeral port.
    #[arg(long, default_value_t = 8899)]
    port: u16,

    /// Listen backlog.
    #[arg(long, default_value_t = 1024)]
    backlog: i32,

    /// PEM-encoded CA certificate used to sign MITM leaf certificates. Omit to relay CONNECT
    /// tunnels opaquely instead of intercepting them.
    #[arg(long, requires = "ca_key")]
    ca_cert: Option<PathBuf>,

    /// PEM-encoded CA private key paired with `--ca-cert`.
    #[arg(long, requires = "ca_cert")]
    ca_key: Option<PathBuf>,

    /// Per-direction byte/sec budget applied to every connection.
    #[arg(long, default_value_t = u64::MAX)]
    rate_limit_bytes_per_sec: u64,

    /// Idle connection timeout, in seconds.
    #[arg(long, default_value_t = 30)]
    idle_timeout_secs: u64,

    /// Enables the cross-process lifecycle event bus.
    #[arg(long)]
    enable_events: bool,
}

impl Args {
    fn into_config(self) -> ProxyConfig {
        let mut config = ProxyConfig {
            hostname: self.hostname,
            port: self.port,
            backlog: self.backlog,
            rate_limit_bytes_per_sec: self.rate_limit_bytes_per_sec,
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            enable_events: self.enable_events,
            ..ProxyConfig::default()
        };
        if let (Some(cert_path), Some(key_path)) = (self.ca_cert, self.ca_key) {
            config.ca = Some(CaMaterial { cert_path, key_path });
        }
        config
    }
}

/// Runs a blocking accept loop over every bound listener, handing each accepted connection's fd
/// off to `tx` as an [`InboundConnection`]. Mirrors `acceptor::run_acceptor_loop`'s accept/sleep
/// shape, minus the flock coarse-lock (there is exactly one acceptor here) and the fd-over-socket
/// handoff (the executor lives in this same process).
fn accept_loop(listeners: Arc<ListenerPool>, tx: crossbeam_channel::Sender<InboundConnection>, shutdown: Arc<AtomicBool>) {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            return;
        }
        for bound in listeners.listeners() {
            let accepted = match bound {
                BoundListener::Tcp(listener) => listener.accept().ok(),
                BoundListener::Unix(_) => None,
            };
            let Some((stream, peer_addr)) = accepted else {
                continue;
            };
            let fd = stream.into_raw_fd();
            if tx.send(InboundConnection { fd, peer_addr }).is_err() {
                return;
            }
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = args.into_config();

    let ca = config
        .ca
        .as_ref()
        .map(CertificateAuthority::load)
        .transpose()?
        .map(Arc::new);

    let listeners = Arc::new(ListenerPool::bind(&config)?);
    tracing::info!(ports = ?listeners.realized_ports(), "listening");

    let events = config.enable_events.then(|| Rc::new(EventDispatcher::spawn(0)));
    let ctx = Rc::new(HandlerContext {
        ca,
        cert_cache: Rc::new(RefCell::new(CertificateCache::new())),
        rate_limit_bytes_per_sec: config.rate_limit_bytes_per_sec,
        idle_timeout: config.idle_timeout,
        events,
    });

    let shutdown = Arc::new(AtomicBool::new(false));
    let (tx, rx) = unbounded();

    let accept_shutdown = shutdown.clone();
    let accept_listeners = listeners.clone();
    let accept_handle = std::thread::spawn(move || accept_loop(accept_listeners, tx, accept_shutdown));

    let mut executor = ThreadlessExecutor::new(
        rx,
        move |inbound: InboundConnection| -> Box<dyn Work> {
            // SAFETY: `accept_loop` handed off this fd via `into_raw_fd`, so ownership transfers
            // here exactly once.
            let socket = unsafe { mio::net::TcpStream::from_raw_fd(inbound.fd) };
            let handler = HttpProtocolHandler::new(
                socket,
                Token(inbound.fd as usize),
                inbound.peer_addr,
                PluginChain::empty(),
                ctx.clone(),
            );
            Box::new(handler)
        },
        shutdown.clone(),
    )?;

    ctrlc_shutdown(shutdown.clone());
    executor.run()?;

    accept_handle.join().expect("accept thread panicked");
    Ok(())
}

static SIGINT_RECEIVED: AtomicBool = AtomicBool::new(false);

extern "C" fn record_sigint(_: std::os::raw::c_int) {
    SIGINT_RECEIVED.store(true, Ordering::SeqCst);
}

/// Arms the shutdown flag when the process receives `SIGINT`, so both the accept loop and the
/// executor tear down cleanly instead of being killed mid-request. Installs a real handler via
/// `nix::sys::signal` rather than polling stdin.
fn ctrlc_shutdown(shutdown: Arc<AtomicBool>) {
    // SAFETY: `record_sigint` only stores to a static `AtomicBool`, which is async-signal-safe.
    unsafe {
        signal::signal(Signal::SIGINT, SigHandler::Handler(record_sigint)).expect("installing SIGINT handler");
    }
    let _ = std::thread::Builder::new().name("sigint-watch".into()).spawn(move || {
        while !SIGINT_RECEIVED.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(50));
        }
        shutdown.store(true, Ordering::SeqCst);
    });
}

//! The HTTP protocol handler (§4.G): the central [`crate::work::Work`] implementation.
//!
//! Generalized from `rask::connection::Connection`'s `{read, parse, prepare_response, write}`
//! cycle into the full per-connection state machine the spec describes: request parsing with
//! plugin hooks, upstream dialing, optional TLS-MITM by synthesized leaf certificate, response
//! relaying with per-chunk plugin dispatch, keep-alive, and the two leaky buckets gating each
//! flow direction.
//!
//! Concrete over `mio::net::TcpStream` rather than generic over `net::tcp_stream::TcpStream` —
//! unlike `connection.rs`'s building blocks, which stay generic for testability, the handler
//! itself always dials real upstream sockets, so there is nothing to gain from genericity here.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{self, ErrorKind};
use std::os::fd::RawFd;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use mio::Token;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, ClientConnection as RustlsClientConnection, ServerConnection as RustlsServerConnection};

use crate::connection::{ClientConnection, UpstreamConnection};
use crate::error::ProxyError;
use crate::events::{EventDispatcher, EventName};
use crate::parser::{HttpMessage, Method, ParserState};
use crate::plugin::{HookOutcome, PluginChain};
use crate::rate_limiter::LeakyBucket;
use crate::tls::{CertificateAuthority, CertificateCache};
use crate::work::{EventMask, ReadyEvents, Work};

type Socket = mio::net::TcpStream;

const READ_PROBE_SIZE: u64 = 8192;

/// Per-connection state (§4.G).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    /// Reading and parsing the client's request.
    ReadingRequest,
    /// Dialing the upstream origin, waiting for the connect to complete.
    UpstreamConnecting,
    /// Performing the upstream TLS handshake, then issuing the client-facing MITM leaf.
    TlsHandshake,
    /// Re-running the request state machine against the decrypted inner stream of a MITM'd
    /// CONNECT tunnel.
    MitmReadingInner,
    /// Shuttling opaque bytes between client and upstream (non-intercepted CONNECT tunnel).
    Relaying,
    /// Reading the upstream response and streaming it to the client.
    WritingResponse,
    /// Torn down; the next `handle_events` call reports finished.
    Closing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectIntent {
    Forward,
    OpaqueTunnel,
    MitmTunnel,
}

/// Fixed, per-process collaborators every handler needs, shared across connections.
pub struct HandlerContext {
    /// CA material for MITM leaf issuance; `None` disables interception.
    pub ca: Option<Arc<CertificateAuthority>>,
    /// Per-process host→leaf cert cache.
    pub cert_cache: Rc<RefCell<CertificateCache>>,
    /// Byte/sec budget applied to each flow direction.
    pub rate_limit_bytes_per_sec: u64,
    /// Idle-connection timeout.
    pub idle_timeout: Duration,
    /// Optional event bus for `WORK_STARTED`/`WORK_FINISHED`/`REQUEST_COMPLETE`/... events.
    pub events: Option<Rc<EventDispatcher>>,
}

impl std::fmt::Debug for HandlerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerContext")
            .field("mitm_enabled", &self.ca.is_some())
            .field("rate_limit_bytes_per_sec", &self.rate_limit_bytes_per_sec)
            .field("idle_timeout", &self.idle_timeout)
            .field("events_enabled", &self.events.is_some())
            .finish()
    }
}

/// The central Work: one per client connection.
pub struct HttpProtocolHandler {
    client: ClientConnection<Socket>,
    upstream: Option<UpstreamConnection<Socket>>,
    request: HttpMessage,
    response: HttpMessage,
    state: HandlerState,
    plugins: PluginChain,
    ctx: Rc<HandlerContext>,
    c2u_rate: LeakyBucket,
    u2c_rate: LeakyBucket,
    headers_hook_fired: bool,
    request_hook_fired: bool,
    response_headers_forwarded: bool,
    connect_intent: Option<ConnectIntent>,
    pending_connect_host: Option<String>,
    last_activity: Instant,
}

impl std::fmt::Debug for HttpProtocolHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProtocolHandler")
            .field("state", &self.state)
            .field("client", &self.client)
            .field("upstream", &self.upstream)
            .finish_non_exhaustive()
    }
}

impl HttpProtocolHandler {
    /// Wraps a freshly-accepted client socket in a new handler.
    pub fn new(
        socket: Socket,
        token: Token,
        peer_addr: std::net::SocketAddr,
        plugins: PluginChain,
        ctx: Rc<HandlerContext>,
    ) -> Self {
        let rate = ctx.rate_limit_bytes_per_sec;
        HttpProtocolHandler {
            client: ClientConnection::new(socket, token, peer_addr),
            upstream: None,
            request: HttpMessage::request(),
            response: HttpMessage::response(),
            state: HandlerState::ReadingRequest,
            plugins,
            ctx,
            c2u_rate: LeakyBucket::new(rate),
            u2c_rate: LeakyBucket::new(rate),
            headers_hook_fired: false,
            request_hook_fired: false,
            response_headers_forwarded: false,
            connect_intent: None,
            pending_connect_host: None,
            last_activity: Instant::now(),
        }
    }

    fn publish(&self, name: EventName) {
        if let Some(bus) = &self.ctx.events {
            bus.publish(0, name, HashMap::new());
        }
    }

    /// §7 failure policy: silent-close kinds just tear down; everything else gets a synthetic
    /// response first.
    fn fail(&mut self, err: ProxyError) {
        if !err.closes_silently() {
            let (code, reason) = match &err {
                ProxyError::Parse(_) => (400, "Bad Request"),
                ProxyError::Connect(_) => (502, "Bad Gateway"),
                _ => (500, "Internal Server Error"),
            };
            let body = format!("{code} {reason}\n");
            self.client
                .io_mut()
                .queue_write(simple_response(code, reason, body.as_bytes()));
        }
        self.state = HandlerState::Closing;
    }

    fn reset_for_next_request(&mut self) {
        self.request = HttpMessage::request();
        self.response = HttpMessage::response();
        self.headers_hook_fired = false;
        self.request_hook_fired = false;
        self.response_headers_forwarded = false;
        self.connect_intent = None;
        self.state = HandlerState::ReadingRequest;
    }

    /// Replaces the in-flight response with a plugin-synthesized one and queues it verbatim
    /// (§4.G step 1: "substitute message, handled as a synthetic response").
    fn respond_synthetic(&mut self, mut msg: HttpMessage) {
        self.plugins.on_response_headers_complete(&mut msg);
        let bytes = msg.build();
        self.client.io_mut().queue_write(bytes);
        self.response = msg;
        self.response_headers_forwarded = true;
        self.state = HandlerState::WritingResponse;
    }

    /// Drives as much forward progress as is available without blocking. Returns `true` once the
    /// connection should be torn down.
    fn tick(&mut self) -> bool {
        loop {
            let progressed = match self.state {
                HandlerState::ReadingRequest | HandlerState::MitmReadingInner => self.step_reading_request(),
                HandlerState::UpstreamConnecting => self.step_upstream_connecting(),
                HandlerState::TlsHandshake => self.step_tls_handshake(),
                HandlerState::Relaying => self.step_relaying(),
                HandlerState::WritingResponse => self.step_writing_response(),
                HandlerState::Closing => return true,
            };
            if !progressed {
                break;
            }
        }
        self.state == HandlerState::Closing
    }

    fn step_reading_request(&mut self) -> bool {
        let granted = self.c2u_rate.consume(READ_PROBE_SIZE);
        if granted == 0 {
            return false;
        }
        match self.client.io_mut().recv() {
            Ok(0) => {
                self.state = HandlerState::Closing;
                true
            }
            Ok(n) => {
                if (n as u64) < granted {
                    let _ = self.c2u_rate.release(granted - n as u64);
                }
                if n == 0 {
                    return false;
                }
                self.last_activity = Instant::now();
                let raw = self.client.io().recv_buffer().as_slice().to_vec();
                self.client.io_mut().consume(raw.len());
                let Some(rewritten) = self.plugins.handle_client_data(&raw) else {
                    self.state = HandlerState::Closing;
                    return true;
                };
                if let Err(e) = self.request.parse(&rewritten) {
                    self.fail(ProxyError::Parse(e));
                    return true;
                }
                self.drive_request_hooks();
                true
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                let _ = self.c2u_rate.release(granted);
                false
            }
            Err(e) => {
                self.fail(ProxyError::Io(e));
                true
            }
        }
    }

    fn drive_request_hooks(&mut self) {
        if !self.headers_hook_fired && !matches!(self.request.state(), ParserState::Initialized | ParserState::LineRcvd) {
            self.headers_hook_fired = true;
            match self.plugins.before_upstream_connection(&mut self.request) {
                HookOutcome::Continue => {}
                HookOutcome::Respond(msg) => {
                    self.respond_synthetic(msg);
                    return;
                }
                HookOutcome::Drop => {
                    self.state = HandlerState::Closing;
                    return;
                }
            }
        }

        if self.request.state() == ParserState::Complete && !self.request_hook_fired {
            self.request_hook_fired = true;
            self.publish(EventName::RequestComplete);
            match self.plugins.handle_client_request(&mut self.request) {
                HookOutcome::Continue => {}
                HookOutcome::Respond(msg) => {
                    self.respond_synthetic(msg);
                    return;
                }
                HookOutcome::Drop => {
                    self.state = HandlerState::Closing;
                    return;
                }
            }
            self.begin_upstream_phase();
        }
    }

    fn begin_upstream_phase(&mut self) {
        let is_connect = self.request.method() == Some(Method::Connect);
        let Some(host_port) = target_host_port(&self.request) else {
            self.fail(ProxyError::Connect("missing request target".into()));
            return;
        };

        self.connect_intent = Some(if is_connect {
            if self.ctx.ca.is_some() {
                ConnectIntent::MitmTunnel
            } else {
                ConnectIntent::OpaqueTunnel
            }
        } else {
            ConnectIntent::Forward
        });
        self.pending_connect_host = Some(host_port.clone());

        if let Some(upstream) = &self.upstream {
            if upstream.host_port() == host_port && !upstream.io().is_closed() {
                self.dispatch_upstream_request();
                return;
            }
        }
        if let Some(mut stale) = self.upstream.take() {
            stale.io_mut().close();
        }

        match dial(&host_port) {
            Ok(socket) => {
                let peer_addr = socket.peer_addr().unwrap_or_else(|_| "0.0.0.0:0".parse().unwrap());
                self.upstream = Some(UpstreamConnection::new(socket, Token(1), peer_addr, host_port));
                self.state = HandlerState::UpstreamConnecting;
            }
            Err(e) => self.fail(ProxyError::Connect(e.to_string())),
        }
    }

    fn step_upstream_connecting(&mut self) -> bool {
        let connect_result = match &self.upstream {
            Some(upstream) => upstream.io().take_socket_error(),
            None => {
                self.state = HandlerState::Closing;
                return true;
            }
        };
        if let Err(e) = connect_result {
            self.fail(ProxyError::Connect(e.to_string()));
            return true;
        }

        match self.connect_intent {
            Some(ConnectIntent::MitmTunnel) => self.begin_upstream_tls(),
            Some(ConnectIntent::OpaqueTunnel) => {
                self.client
                    .io_mut()
                    .queue_write(b"HTTP/1.1 200 Connection Established\r\n\r\n".to_vec());
                self.state = HandlerState::Relaying;
            }
            Some(ConnectIntent::Forward) | None => self.dispatch_upstream_request(),
        }
        true
    }

    fn begin_upstream_tls(&mut self) {
        let Some(host_port) = self.pending_connect_host.clone() else {
            self.fail(ProxyError::Connect("missing CONNECT host".into()));
            return;
        };
        let host = host_port.split(':').next().unwrap_or(&host_port).to_string();

        let config = Arc::new(
            ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert))
                .with_no_client_auth(),
        );
        let Ok(server_name) = ServerName::try_from(host.clone()) else {
            self.fail(ProxyError::Tls(format!("invalid upstream SNI name: {host}")));
            return;
        };
        match RustlsClientConnection::new(config, server_name) {
            Ok(conn) => {
                if let Some(upstream) = &mut self.upstream {
                    upstream.io_mut().upgrade_client_tls(conn);
                }
                self.state = HandlerState::TlsHandshake;
            }
            Err(e) => self.fail(ProxyError::Tls(e.to_string())),
        }
    }

    /// Synthesizes the MITM leaf certificate and upgrades the client socket to server-side TLS.
    /// The upstream handshake itself completes through the ordinary recv/flush_writes path, so by
    /// the time this runs both legs are ready to drive their handshakes independently.
    fn step_tls_handshake(&mut self) -> bool {
        let Some(host_port) = self.pending_connect_host.clone() else {
            self.fail(ProxyError::Tls("missing CONNECT host".into()));
            return true;
        };
        let host = host_port.split(':').next().unwrap_or(&host_port).to_string();

        let Some(ca) = self.ctx.ca.clone() else {
            self.fail(ProxyError::Tls("interception requested with no CA configured".into()));
            return true;
        };
        let leaf_config = self.ctx.cert_cache.borrow_mut().get_or_issue(&ca, &host);
        match leaf_config {
            Ok(server_config) => match RustlsServerConnection::new(server_config) {
                Ok(server_conn) => {
                    self.client
                        .io_mut()
                        .queue_write(b"HTTP/1.1 200 Connection Established\r\n\r\n".to_vec());
                    self.client.io_mut().upgrade_server_tls(server_conn);
                    self.reset_for_next_request();
                    self.state = HandlerState::MitmReadingInner;
                }
                Err(e) => self.fail(ProxyError::Tls(e.to_string())),
            },
            Err(e) => self.fail(e),
        }
        true
    }

    fn dispatch_upstream_request(&mut self) {
        let bytes = self.request.build();
        if let Some(upstream) = &mut self.upstream {
            upstream.io_mut().queue_write(bytes);
        }
        self.response = HttpMessage::response();
        self.response_headers_forwarded = false;
        self.state = HandlerState::WritingResponse;
    }

    fn step_relaying(&mut self) -> bool {
        let mut progressed = false;

        let granted = self.c2u_rate.consume(READ_PROBE_SIZE);
        if granted > 0 {
            match self.client.io_mut().recv() {
                Ok(0) => {
                    self.state = HandlerState::Closing;
                    return true;
                }
                Ok(n) => {
                    if (n as u64) < granted {
                        let _ = self.c2u_rate.release(granted - n as u64);
                    }
                    if n > 0 {
                        let raw = self.client.io().recv_buffer().as_slice().to_vec();
                        self.client.io_mut().consume(raw.len());
                        if let Some(upstream) = &mut self.upstream {
                            upstream.io_mut().queue_write(raw);
                        }
                        progressed = true;
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    let _ = self.c2u_rate.release(granted);
                }
                Err(_) => {
                    self.state = HandlerState::Closing;
                    return true;
                }
            }
        }

        let granted = self.u2c_rate.consume(READ_PROBE_SIZE);
        if granted > 0 {
            if let Some(upstream) = &mut self.upstream {
                match upstream.io_mut().recv() {
                    Ok(0) => {
                        self.state = HandlerState::Closing;
                        return true;
                    }
                    Ok(n) => {
                        if (n as u64) < granted {
                            let _ = self.u2c_rate.release(granted - n as u64);
                        }
                        if n > 0 {
                            let raw = upstream.io().recv_buffer().as_slice().to_vec();
                            upstream.io_mut().consume(raw.len());
                            self.client.io_mut().queue_write(raw);
                            progressed = true;
                        }
                    }
                    Err(e) if e.kind() == ErrorKind::WouldBlock => {
                        let _ = self.u2c_rate.release(granted);
                    }
                    Err(_) => {
                        self.state = HandlerState::Closing;
                        return true;
                    }
                }
            }
        }

        if self.client.io_mut().flush_writes().is_err() {
            self.state = HandlerState::Closing;
            return true;
        }
        if let Some(upstream) = &mut self.upstream {
            if upstream.io_mut().flush_writes().is_err() {
                self.state = HandlerState::Closing;
                return true;
            }
        }

        progressed
    }

    fn step_writing_response(&mut self) -> bool {
        let mut raw_chunk: Option<Vec<u8>> = None;
        let mut io_error: Option<io::Error> = None;
        let mut upstream_closed_incomplete = false;

        if let Some(upstream) = &mut self.upstream {
            let granted = self.u2c_rate.consume(READ_PROBE_SIZE);
            if granted > 0 {
                match upstream.io_mut().recv() {
                    Ok(0) => {
                        if self.response.state() != ParserState::Complete {
                            upstream_closed_incomplete = true;
                        }
                    }
                    Ok(n) => {
                        if (n as u64) < granted {
                            let _ = self.u2c_rate.release(granted - n as u64);
                        }
                        if n > 0 {
                            let raw = upstream.io().recv_buffer().as_slice().to_vec();
                            upstream.io_mut().consume(raw.len());
                            raw_chunk = Some(raw);
                        }
                    }
                    Err(e) if e.kind() == ErrorKind::WouldBlock => {
                        let _ = self.u2c_rate.release(granted);
                    }
                    Err(e) => io_error = Some(e),
                }
            }
        }

        if upstream_closed_incomplete {
            self.fail(ProxyError::Connect("upstream closed before response completed".into()));
            return true;
        }
        if let Some(e) = io_error {
            self.fail(ProxyError::Io(e));
            return true;
        }

        let mut progressed = false;
        if let Some(raw) = raw_chunk {
            self.feed_response(&raw);
            progressed = true;
        }

        if self.client.io_mut().flush_writes().is_err() {
            self.state = HandlerState::Closing;
            return true;
        }

        if self.response.state() == ParserState::Complete {
            return self.finish_response();
        }

        progressed
    }

    fn feed_response(&mut self, raw: &[u8]) {
        let body_before = self.response.body().len();
        let headers_before = self.response.state();
        if let Err(e) = self.response.parse(raw) {
            self.fail(ProxyError::Parse(e));
            return;
        }

        if !self.response_headers_forwarded
            && headers_before != ParserState::Complete
            && !matches!(self.response.state(), ParserState::Initialized | ParserState::LineRcvd)
        {
            self.response_headers_forwarded = true;
            self.plugins.on_response_headers_complete(&mut self.response);
            self.client.io_mut().queue_write(status_line_and_headers(&self.response));
        }

        let body_after = self.response.body().len();
        if body_after > body_before {
            let chunk = self.response.body()[body_before..body_after].to_vec();
            let rewritten = self.plugins.handle_upstream_chunk(chunk);
            self.plugins.on_response_chunk(&rewritten);
            self.client.io_mut().queue_write(rewritten);
        }
    }

    fn finish_response(&mut self) -> bool {
        self.plugins.on_response_complete();
        self.publish(EventName::ResponseComplete);

        let reuse = self.upstream.is_some() && self.request.keep_alive() && self.response.keep_alive();
        if reuse {
            self.reset_for_next_request();
        } else {
            self.state = HandlerState::Closing;
        }
        true
    }
}

impl Work for HttpProtocolHandler {
    fn initialize(&mut self) -> io::Result<()> {
        self.publish(EventName::WorkStarted);
        Ok(())
    }

    fn get_events(&self) -> HashMap<RawFd, EventMask> {
        let mut map = HashMap::new();
        if !self.client.io().is_closed() {
            map.insert(
                self.client.io().raw_fd(),
                EventMask {
                    read: true,
                    write: self.client.io().is_writable(),
                },
            );
        }
        if let Some(upstream) = &self.upstream {
            if !upstream.io().is_closed() {
                map.insert(
                    upstream.io().raw_fd(),
                    EventMask {
                        read: true,
                        write: upstream.io().is_writable(),
                    },
                );
            }
        }
        for fd in self.plugins.get_descriptors() {
            map.insert(fd, EventMask::BOTH);
        }
        map
    }

    fn handle_events(&mut self, events: &ReadyEvents) -> bool {
        let plugin_fds = self.plugins.get_descriptors();
        if !plugin_fds.is_empty() {
            let readable: Vec<RawFd> =
                events.readables.iter().copied().filter(|fd| plugin_fds.contains(fd)).collect();
            let writable: Vec<RawFd> =
                events.writables.iter().copied().filter(|fd| plugin_fds.contains(fd)).collect();
            if !readable.is_empty() {
                self.plugins.read_from_descriptors(&readable);
            }
            if !writable.is_empty() {
                self.plugins.write_to_descriptors(&writable);
            }
        }
        self.tick()
    }

    fn is_inactive(&self) -> bool {
        self.last_activity.elapsed() > self.ctx.idle_timeout
    }

    fn shutdown(&mut self) {
        self.plugins.on_client_connection_close();
        self.client.io_mut().close();
        if let Some(upstream) = &mut self.upstream {
            upstream.io_mut().close();
        }
        self.publish(EventName::WorkFinished);
    }
}

fn target_host_port(request: &HttpMessage) -> Option<String> {
    let url = request.url()?;
    if request.method() == Some(Method::Connect) {
        return Some(String::from_utf8_lossy(url).into_owned());
    }
    let text = String::from_utf8_lossy(url);
    if let Some(rest) = text.strip_prefix("http://").or_else(|| text.strip_prefix("https://")) {
        let authority = rest.split('/').next().unwrap_or(rest);
        return Some(default_port(authority));
    }
    let host = request.header("host")?;
    Some(default_port(&String::from_utf8_lossy(host)))
}

fn default_port(authority: &str) -> String {
    if authority.contains(':') {
        authority.to_string()
    } else {
        format!("{authority}:80")
    }
}

fn dial(host_port: &str) -> io::Result<Socket> {
    use std::net::ToSocketAddrs;
    let mut addrs = host_port.to_socket_addrs()?;
    let addr = addrs
        .next()
        .ok_or_else(|| io::Error::new(ErrorKind::NotFound, "no address resolved"))?;
    let stream = Socket::connect(addr)?;
    let _ = stream.set_nodelay(true);
    Ok(stream)
}

fn simple_response(code: u16, reason: &str, body: &[u8]) -> Vec<u8> {
    let mut out = format!(
        "HTTP/1.1 {code} {reason}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    )
    .into_bytes();
    out.extend_from_slice(body);
    out
}

fn status_line_and_headers(response: &HttpMessage) -> Vec<u8> {
    let mut out = Vec::with_capacity(256);
    let version = response.version().unwrap_or(crate::parser::Version::H1_1);
    let code = response.code().unwrap_or(200);
    let reason = response
        .reason()
        .map(|r| String::from_utf8_lossy(r).into_owned())
        .unwrap_or_default();
    out.extend_from_slice(format!("{version} {code} {reason}\r\n").as_bytes());
    response.headers().write_to(&mut out);
    out.extend_from_slice(b"\r\n");
    out
}

/// Accepts any upstream certificate. MITM proxies terminate trust at the edge (the client trusts
/// the proxy's own CA, not the upstream's); pinning the upstream leg to a bundled root store is a
/// real hardening option but pulls in a dependency this workspace doesn't otherwise need.
#[derive(Debug)]
struct AcceptAnyServerCert;

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_host_port_from_absolute_form() {
        let mut req = HttpMessage::request();
        req.parse(b"GET http://example.com/a HTTP/1.1\r\nHost: example.com\r\n\r\n")
            .unwrap();
        assert_eq!(target_host_port(&req), Some("example.com:80".to_string()));
    }

    #[test]
    fn target_host_port_from_host_header() {
        let mut req = HttpMessage::request();
        req.parse(b"GET /a HTTP/1.1\r\nHost: example.com:8080\r\n\r\n").unwrap();
        assert_eq!(target_host_port(&req), Some("example.com:8080".to_string()));
    }

    #[test]
    fn target_host_port_from_connect() {
        let mut req = HttpMessage::request();
        req.parse(b"CONNECT example.com:443 HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(target_host_port(&req), Some("example.com:443".to_string()));
    }
}

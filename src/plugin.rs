//! Plugin dispatch (§4.H): a fixed capability-set trait with short-circuit, ordered invocation.
//!
//! Grounded in `original_source`'s `GroutClientBasePlugin` ABC — one abstract method with a
//! documented contract — generalized from a single required override to many optional hooks via
//! trait default methods, the idiomatic Rust equivalent of an ABC with mostly-concrete methods.

use std::os::fd::RawFd;

use crate::parser::HttpMessage;

/// The terminal outcome of a hook that can short-circuit the remaining plugin chain.
#[derive(Debug)]
pub enum HookOutcome {
    /// Continue to the next plugin / default engine behavior.
    Continue,
    /// Replace the in-flight message and jump straight to `WRITING_RESPONSE` (§4.G step 1).
    Respond(HttpMessage),
    /// Drop the connection without a response.
    Drop,
}

/// A fixed capability set a plugin may implement. Every hook defaults to a no-op / `Continue`, so
/// concrete plugins override only what they need (§4.H: "dispatch is by presence").
///
/// Contract: plugins are constructed fresh per connection and are stateless across connections
/// unless they explicitly share state via the event bus (`events.rs`). They may mutate passed
/// messages in place; the engine uses the returned value, not the passed-in reference.
pub trait ProxyPlugin: Send {
    /// Called once, right after construction, before any hook below.
    fn initialize(&mut self) {}

    /// Extra file descriptors this plugin owns and wants the engine to poll alongside the
    /// client/upstream sockets (§4.H), e.g. a notification pipe or an auxiliary control socket.
    /// The default is no extra descriptors.
    fn get_descriptors(&self) -> Vec<RawFd> {
        Vec::new()
    }

    /// Called with the subset of this plugin's own descriptors (from [`Self::get_descriptors`])
    /// that became writable on this tick.
    fn write_to_descriptors(&mut self, writables: &[RawFd]) {
        let _ = writables;
    }

    /// Called with the subset of this plugin's own descriptors (from [`Self::get_descriptors`])
    /// that became readable on this tick.
    fn read_from_descriptors(&mut self, readables: &[RawFd]) {
        let _ = readables;
    }

    /// Called once per raw chunk of client bytes, before parsing. Returns a substitute chunk
    /// (the default passes `raw` through unchanged) or `None` to drop the connection.
    fn handle_client_data(&mut self, raw: &[u8]) -> Option<Vec<u8>> {
        Some(raw.to_vec())
    }

    /// Called when the request's headers are complete, before an upstream connection is opened.
    fn before_upstream_connection(&mut self, request: &mut HttpMessage) -> HookOutcome {
        let _ = request;
        HookOutcome::Continue
    }

    /// Called when the full request is parsed.
    fn handle_client_request(&mut self, request: &mut HttpMessage) -> HookOutcome {
        let _ = request;
        HookOutcome::Continue
    }

    /// Called once per chunk of upstream response bytes before it is relayed to the client.
    fn handle_upstream_chunk(&mut self, chunk: Vec<u8>) -> Vec<u8> {
        chunk
    }

    /// Called once the response's headers are complete.
    fn on_response_headers_complete(&mut self, response: &mut HttpMessage) {
        let _ = response;
    }

    /// Called once per chunk of the response body as it is consumed.
    fn on_response_chunk(&mut self, chunk: &[u8]) {
        let _ = chunk;
    }

    /// Called when the full response has been relayed.
    fn on_response_complete(&mut self) {}

    /// Called once at the end of the connection, with whatever access-log context the engine
    /// assembled (method, target, status, byte counts — left as a free-form map so built-in
    /// plugins beyond this crate's scope can add fields).
    fn on_access_log(&mut self, context: &[(String, String)]) {
        let _ = context;
    }

    /// Called unconditionally at connection close, even if this plugin short-circuited the
    /// chain at an earlier hook (§4.G: "remaining plugins at that hook are skipped, but
    /// `on_client_connection_close` is always called on every plugin that was `initialize()`d").
    fn on_client_connection_close(&mut self) {}
}

/// An ordered collection of plugins, dispatched per §4.G/§4.H: hooks fire in configured order;
/// the first plugin returning a terminal [`HookOutcome`] wins and the rest are skipped for that
/// hook, but every initialized plugin still receives `on_client_connection_close`.
pub struct PluginChain {
    plugins: Vec<Box<dyn ProxyPlugin>>,
    initialized: Vec<bool>,
}

impl std::fmt::Debug for PluginChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginChain").field("len", &self.plugins.len()).finish()
    }
}

impl PluginChain {
    /// Builds a chain from `plugins`, in dispatch order, and calls `initialize()` on each.
    pub fn new(mut plugins: Vec<Box<dyn ProxyPlugin>>) -> Self {
        for plugin in &mut plugins {
            plugin.initialize();
        }
        let initialized = vec![true; plugins.len()];
        PluginChain {
            plugins,
            initialized,
        }
    }

    /// An empty chain — every hook is a no-op.
    pub fn empty() -> Self {
        PluginChain {
            plugins: Vec::new(),
            initialized: Vec::new(),
        }
    }

    /// Number of plugins in the chain.
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Whether the chain has no plugins.
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Collects `get_descriptors()` across every plugin in the chain.
    pub fn get_descriptors(&self) -> Vec<RawFd> {
        self.plugins.iter().flat_map(|plugin| plugin.get_descriptors()).collect()
    }

    /// Dispatches `write_to_descriptors` to every plugin, passing the full `writables` slice;
    /// each plugin ignores entries it doesn't recognize as its own.
    pub fn write_to_descriptors(&mut self, writables: &[RawFd]) {
        for plugin in &mut self.plugins {
            plugin.write_to_descriptors(writables);
        }
    }

    /// Dispatches `read_from_descriptors` to every plugin, passing the full `readables` slice;
    /// each plugin ignores entries it doesn't recognize as its own.
    pub fn read_from_descriptors(&mut self, readables: &[RawFd]) {
        for plugin in &mut self.plugins {
            plugin.read_from_descriptors(readables);
        }
    }

    /// Dispatches `before_upstream_connection` in order, stopping at the first terminal outcome.
    pub fn before_upstream_connection(&mut self, request: &mut HttpMessage) -> HookOutcome {
        for plugin in &mut self.plugins {
            match plugin.before_upstream_connection(request) {
                HookOutcome::Continue => continue,
                terminal => return terminal,
            }
        }
        HookOutcome::Continue
    }

    /// Dispatches `handle_client_request` in order, stopping at the first terminal outcome.
    pub fn handle_client_request(&mut self, request: &mut HttpMessage) -> HookOutcome {
        for plugin in &mut self.plugins {
            match plugin.handle_client_request(request) {
                HookOutcome::Continue => continue,
                terminal => return terminal,
            }
        }
        HookOutcome::Continue
    }

    /// Dispatches `handle_client_data` in order, each plugin seeing the previous plugin's
    /// (possibly rewritten) output. The first plugin to return `None` drops the connection;
    /// remaining plugins are skipped for this hook.
    pub fn handle_client_data(&mut self, raw: &[u8]) -> Option<Vec<u8>> {
        let mut current = raw.to_vec();
        for plugin in &mut self.plugins {
            current = plugin.handle_client_data(&current)?;
        }
        Some(current)
    }

    /// Dispatches `handle_upstream_chunk` through every plugin in order, each seeing the
    /// previous plugin's output.
    pub fn handle_upstream_chunk(&mut self, chunk: Vec<u8>) -> Vec<u8> {
        let mut current = chunk;
        for plugin in &mut self.plugins {
            current = plugin.handle_upstream_chunk(current);
        }
        current
    }

    /// Dispatches `on_response_headers_complete` to every plugin.
    pub fn on_response_headers_complete(&mut self, response: &mut HttpMessage) {
        for plugin in &mut self.plugins {
            plugin.on_response_headers_complete(response);
        }
    }

    /// Dispatches `on_response_chunk` to every plugin.
    pub fn on_response_chunk(&mut self, chunk: &[u8]) {
        for plugin in &mut self.plugins {
            plugin.on_response_chunk(chunk);
        }
    }

    /// Dispatches `on_response_complete` to every plugin.
    pub fn on_response_complete(&mut self) {
        for plugin in &mut self.plugins {
            plugin.on_response_complete();
        }
    }

    /// Dispatches `on_access_log` to every plugin.
    pub fn on_access_log(&mut self, context: &[(String, String)]) {
        for plugin in &mut self.plugins {
            plugin.on_access_log(context);
        }
    }

    /// Dispatches `on_client_connection_close` to every plugin that was initialized, regardless
    /// of whether it short-circuited earlier hooks.
    pub fn on_client_connection_close(&mut self) {
        for (plugin, was_initialized) in self.plugins.iter_mut().zip(self.initialized.iter()) {
            if *was_initialized {
                plugin.on_client_connection_close();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Terminator {
        calls: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    }

    impl ProxyPlugin for Terminator {
        fn handle_client_request(&mut self, _request: &mut HttpMessage) -> HookOutcome {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            HookOutcome::Drop
        }

        fn on_client_connection_close(&mut self) {
            self.calls.fetch_add(100, std::sync::atomic::Ordering::SeqCst);
        }
    }

    struct Counter {
        calls: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    }

    impl ProxyPlugin for Counter {
        fn handle_client_request(&mut self, _request: &mut HttpMessage) -> HookOutcome {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            HookOutcome::Continue
        }

        fn on_client_connection_close(&mut self) {
            self.calls.fetch_add(100, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[test]
    fn short_circuit_skips_remaining_plugins_but_not_close() {
        let first_calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let second_calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let mut chain = PluginChain::new(vec![
            Box::new(Terminator {
                calls: first_calls.clone(),
            }),
            Box::new(Counter {
                calls: second_calls.clone(),
            }),
        ]);

        let mut request = HttpMessage::request();
        let outcome = chain.handle_client_request(&mut request);
        assert!(matches!(outcome, HookOutcome::Drop));
        assert_eq!(first_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(std::sync::atomic::Ordering::SeqCst), 0);

        chain.on_client_connection_close();
        assert_eq!(first_calls.load(std::sync::atomic::Ordering::SeqCst), 101);
        assert_eq!(second_calls.load(std::sync::atomic::Ordering::SeqCst), 100);
    }
}

//! The threadless executor (§4.E): a single-threaded cooperative readiness loop, one per worker
//! process, that multiplexes many [`Work`] values over a `mio::Poll` selector.
//!
//! Generalized directly from `rask`'s `Listener`/`MultiListener` event loop shape (`Poll` +
//! `Events` + `Slab`, a dedicated accept/wake token, `poll(timeout)` in a `loop`) — but where the
//! teacher hardcodes one connection type per loop, this drives arbitrary `Work` trait objects
//! registered dynamically per tick, matching the selector-reconciliation design called out in
//! `§9`: "collect desired events from all Works each tick and diff against the selector's current
//! registration set; do not rely on Works to register/unregister themselves."

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Receiver;
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};
use slab::Slab;

use crate::work::{EventMask, ReadyEvents, Work};

/// The default per-tick `select(timeout)` bound (§4.E step 3: "a bounded timeout (default ~1 ms)
/// so new inbox items and timers are serviced promptly").
pub const DEFAULT_TICK: Duration = Duration::from_millis(1);

/// A fd handed off by an acceptor, paired with the peer address it accepted from.
#[derive(Debug)]
pub struct InboundConnection {
    /// The raw fd to drive; ownership transfers to the executor.
    pub fd: RawFd,
    /// The address the acceptor accepted this connection from.
    pub peer_addr: SocketAddr,
}

fn to_interest(mask: EventMask) -> Option<Interest> {
    match (mask.read, mask.write) {
        (true, true) => Some(Interest::READABLE | Interest::WRITABLE),
        (true, false) => Some(Interest::READABLE),
        (false, true) => Some(Interest::WRITABLE),
        (false, false) => None,
    }
}

/// Single-threaded cooperative executor driving an arbitrary set of [`Work`]s via readiness
/// polling. `F` constructs a Work from an inbound fd — the "configured factory" of §4.E step 1.
pub struct ThreadlessExecutor<F>
where
    F: FnMut(InboundConnection) -> Box<dyn Work>,
{
    inbox: Receiver<InboundConnection>,
    works: Slab<Box<dyn Work>>,
    poll: Poll,
    registered: HashMap<(usize, RawFd), Token>,
    token_owner: HashMap<Token, (usize, RawFd)>,
    next_token: usize,
    work_factory: F,
    shutdown: Arc<AtomicBool>,
    tick_timeout: Duration,
}

impl<F> std::fmt::Debug for ThreadlessExecutor<F>
where
    F: FnMut(InboundConnection) -> Box<dyn Work>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadlessExecutor")
            .field("work_count", &self.works.len())
            .field("tick_timeout", &self.tick_timeout)
            .finish_non_exhaustive()
    }
}

impl<F> ThreadlessExecutor<F>
where
    F: FnMut(InboundConnection) -> Box<dyn Work>,
{
    /// Builds an executor draining `inbox` for new connections, constructing Works via
    /// `work_factory`, and stopping once `shutdown` is observed set.
    pub fn new(inbox: Receiver<InboundConnection>, work_factory: F, shutdown: Arc<AtomicBool>) -> io::Result<Self> {
        Ok(ThreadlessExecutor {
            inbox,
            works: Slab::new(),
            poll: Poll::new()?,
            registered: HashMap::new(),
            token_owner: HashMap::new(),
            next_token: 0,
            work_factory,
            shutdown,
            tick_timeout: DEFAULT_TICK,
        })
    }

    /// Overrides the per-tick poll timeout (default [`DEFAULT_TICK`]); mainly useful in tests
    /// that want the loop to spin faster or slower than production.
    pub fn with_tick_timeout(mut self, timeout: Duration) -> Self {
        self.tick_timeout = timeout;
        self
    }

    /// Number of Works currently owned by this executor.
    pub fn work_count(&self) -> usize {
        self.works.len()
    }

    /// Runs the executor loop until the shutdown flag is observed, tearing down every Work on
    /// the way out (§4.E: "Cancellation: a per-executor shutdown flag checked every tick; on
    /// set, all Works are torn down and the loop exits.").
    pub fn run(&mut self) -> io::Result<()> {
        let mut events = Events::with_capacity(1024);
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                self.teardown_all();
                return Ok(());
            }

            self.drain_inbox();
            self.reconcile_selector()?;

            match self.poll.poll(&mut events, Some(self.tick_timeout)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }

            self.dispatch_events(&events);
            self.reap_inactive();
        }
    }

    /// Runs exactly one tick, for deterministic testing.
    pub fn tick(&mut self) -> io::Result<()> {
        self.drain_inbox();
        self.reconcile_selector()?;
        let mut events = Events::with_capacity(1024);
        match self.poll.poll(&mut events, Some(self.tick_timeout)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
        self.dispatch_events(&events);
        self.reap_inactive();
        Ok(())
    }

    fn drain_inbox(&mut self) {
        while let Ok(inbound) = self.inbox.try_recv() {
            let mut work = (self.work_factory)(inbound);
            if work.initialize().is_ok() {
                self.works.insert(work);
            }
        }
    }

    /// The only place selector state changes (§4.E step 2): collects `get_events()` from every
    /// Work, then diffs against the current registration set, adding, modifying, or removing as
    /// needed.
    fn reconcile_selector(&mut self) -> io::Result<()> {
        let mut desired: HashMap<(usize, RawFd), EventMask> = HashMap::new();
        for (work_id, work) in self.works.iter() {
            for (fd, mask) in work.get_events() {
                desired.insert((work_id, fd), mask);
            }
        }

        let stale: Vec<(usize, RawFd)> = self
            .registered
            .keys()
            .filter(|key| !desired.contains_key(key))
            .copied()
            .collect();
        for key in stale {
            if let Some(token) = self.registered.remove(&key) {
                let _ = self.poll.registry().deregister(&mut SourceFd(&key.1));
                self.token_owner.remove(&token);
            }
        }

        for (key, mask) in &desired {
            let Some(interest) = to_interest(*mask) else {
                continue;
            };
            if let Some(token) = self.registered.get(key) {
                self.poll
                    .registry()
                    .reregister(&mut SourceFd(&key.1), *token, interest)?;
            } else {
                let token = Token(self.next_token);
                self.next_token += 1;
                self.poll.registry().register(&mut SourceFd(&key.1), token, interest)?;
                self.registered.insert(*key, token);
                self.token_owner.insert(token, *key);
            }
        }

        Ok(())
    }

    fn dispatch_events(&mut self, events: &Events) {
        let mut per_work: HashMap<usize, ReadyEvents> = HashMap::new();
        for event in events.iter() {
            let Some((work_id, fd)) = self.token_owner.get(&event.token()) else {
                continue;
            };
            let entry = per_work.entry(*work_id).or_default();
            if event.is_readable() {
                entry.readables.push(*fd);
            }
            if event.is_writable() {
                entry.writables.push(*fd);
            }
        }

        let mut finished = Vec::new();
        for (work_id, ready) in &per_work {
            if let Some(work) = self.works.get_mut(*work_id) {
                if work.handle_events(ready) {
                    finished.push(*work_id);
                }
            }
        }
        for work_id in finished {
            self.teardown_work(work_id);
        }
    }

    fn reap_inactive(&mut self) {
        let inactive: Vec<usize> = self
            .works
            .iter()
            .filter(|(_, work)| work.is_inactive())
            .map(|(id, _)| id)
            .collect();
        for work_id in inactive {
            self.teardown_work(work_id);
        }
    }

    fn teardown_work(&mut self, work_id: usize) {
        if let Some(mut work) = self.works.try_remove(work_id) {
            work.shutdown();
        }
        let stale_keys: Vec<(usize, RawFd)> = self
            .registered
            .keys()
            .filter(|(id, _)| *id == work_id)
            .copied()
            .collect();
        for key in stale_keys {
            if let Some(token) = self.registered.remove(&key) {
                let _ = self.poll.registry().deregister(&mut SourceFd(&key.1));
                self.token_owner.remove(&token);
            }
        }
    }

    fn teardown_all(&mut self) {
        let ids: Vec<usize> = self.works.iter().map(|(id, _)| id).collect();
        for id in ids {
            self.teardown_work(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingWork {
        fd: RawFd,
        ticks: Arc<AtomicUsize>,
        done_after: usize,
    }

    impl Work for CountingWork {
        fn initialize(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn get_events(&self) -> HashMap<RawFd, EventMask> {
            let mut map = HashMap::new();
            map.insert(self.fd, EventMask::READ);
            map
        }

        fn handle_events(&mut self, _events: &ReadyEvents) -> bool {
            let n = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
            n >= self.done_after
        }

        fn is_inactive(&self) -> bool {
            false
        }

        fn shutdown(&mut self) {}
    }

    #[test]
    fn inbound_connections_become_works() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let ticks = Arc::new(AtomicUsize::new(0));
        let ticks_for_factory = ticks.clone();
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut executor = ThreadlessExecutor::new(
            rx,
            move |inbound: InboundConnection| -> Box<dyn Work> {
                Box::new(CountingWork {
                    fd: inbound.fd,
                    ticks: ticks_for_factory.clone(),
                    done_after: usize::MAX,
                })
            },
            shutdown,
        )
        .unwrap();

        tx.send(InboundConnection {
            fd: 0,
            peer_addr: "127.0.0.1:0".parse().unwrap(),
        })
        .unwrap();

        executor.drain_inbox();
        assert_eq!(executor.work_count(), 1);
    }
}

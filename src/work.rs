//! The `Work` contract driven by the threadless executor (§4.F), generalized from
//! `rask::connection::Connection`'s `{read, write, parse, prepare_response, is_closed, token,
//! register/reregister/deregister}` shape into the spec's `{initialize, get_events,
//! handle_events, is_inactive, shutdown}` polymorphism over arbitrary connection-bound tasks.

use std::collections::HashMap;
use std::io;
use std::os::fd::RawFd;

/// The readiness an executor should arm for a given fd.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventMask {
    /// Whether this fd should be polled for readability.
    pub read: bool,
    /// Whether this fd should be polled for writability.
    pub write: bool,
}

impl EventMask {
    /// Neither readable nor writable; a Work reporting this for every fd is idle.
    pub const NONE: EventMask = EventMask {
        read: false,
        write: false,
    };

    /// Readable only.
    pub const READ: EventMask = EventMask {
        read: true,
        write: false,
    };

    /// Writable only.
    pub const WRITE: EventMask = EventMask {
        read: false,
        write: true,
    };

    /// Both readable and writable.
    pub const BOTH: EventMask = EventMask {
        read: true,
        write: true,
    };
}

/// The fds ready for reading and writing at a given tick, partitioned per `get_events`'s mask,
/// handed to `handle_events`. A fd may appear in both sets.
#[derive(Debug, Default)]
pub struct ReadyEvents {
    /// Fds whose readiness included `READABLE`.
    pub readables: Vec<RawFd>,
    /// Fds whose readiness included `WRITABLE`.
    pub writables: Vec<RawFd>,
}

/// A connection-bound cooperative task driven by the threadless executor. Minimum capabilities
/// per §4.F: non-blocking setup, desired readiness reporting, readiness handling, idle
/// reportability, and teardown. Implementors must be safe to drop at any tick boundary — no
/// partial state may be left that a subsequent `handle_events` call (which will never come)
/// was relied upon to clean up.
pub trait Work {
    /// Non-blocking setup performed once, right after the Work is constructed from an inbound fd.
    fn initialize(&mut self) -> io::Result<()>;

    /// The fds this Work currently owns and the readiness mask desired for each. Called once per
    /// tick before the selector is reconciled (§4.E step 2); this is the only place the executor
    /// learns what a Work wants.
    fn get_events(&self) -> HashMap<RawFd, EventMask>;

    /// Drives the Work with this tick's readiness. Returns `true` if the Work is finished and
    /// should be torn down (fds closed, deregistered, dropped).
    fn handle_events(&mut self, events: &ReadyEvents) -> bool;

    /// Whether this Work has been idle (no reads, no writes, no pending work) long enough that
    /// the executor's idle reaper should tear it down regardless of readiness.
    fn is_inactive(&self) -> bool;

    /// Synchronous best-effort teardown: flush what can be flushed without blocking, close fds,
    /// notify plugins. Called exactly once, either because `handle_events` returned `true` or
    /// because the executor is shutting down.
    fn shutdown(&mut self);
}

//! Cross-process event queue (§4.I), optional. Grounded in `original_source/proxy/proxy.py`'s
//! `EventManager`/`event_queue` wiring — a multi-producer queue with one dispatcher thread per
//! process relaying to subscribers. `EventManager`'s own implementation was filtered out of the
//! retrieved source, so the wire shape below is the `Event` struct's field list from the data
//! model (§3) implemented directly.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

use crossbeam_channel::{unbounded, Receiver, Sender};

/// A well-known or custom event name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventName {
    /// Acknowledges a successful `subscribe`.
    Subscribed,
    /// Acknowledges a successful `unsubscribe`.
    Unsubscribed,
    /// A Work was constructed and initialized.
    WorkStarted,
    /// A Work tore itself down.
    WorkFinished,
    /// The client request reached `COMPLETE`.
    RequestComplete,
    /// The upstream response's headers reached `HEADERS_COMPLETE`.
    ResponseHeadersComplete,
    /// The upstream response reached `COMPLETE`.
    ResponseComplete,
    /// Any plugin- or collaborator-defined event name.
    Custom(String),
}

/// A published or delivered event record, matching §4.I's exact field list.
#[derive(Debug, Clone)]
pub struct Event {
    /// Correlates a request/response pair, or a subscribe/unsubscribe request to its ack.
    pub request_id: u64,
    /// The event's name.
    pub event_name: EventName,
    /// Free-form payload, left as a string map (the engine core imposes no schema on it).
    pub event_payload: HashMap<String, String>,
    /// Opaque id of whoever published this event.
    pub publisher_id: u64,
    /// OS process id of the publisher.
    pub process_id: u32,
    /// OS-reported identifier of the publishing thread.
    pub thread_id: u64,
    /// Wall-clock time the event was published, as a Unix timestamp in seconds.
    pub event_timestamp: f64,
}

fn now_unix() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

fn current_thread_id() -> u64 {
    // `std::thread::ThreadId` has no stable numeric conversion; hash it instead, which is stable
    // enough for a diagnostic/event field (never used as a real OS tid).
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    thread::current().id().hash(&mut hasher);
    hasher.finish()
}

struct Subscriber {
    channel: Sender<Event>,
}

/// Cross-process multi-producer queue with one dispatcher thread per process relaying to
/// subscribers (§4.I). A broken subscriber channel is removed silently; shutdown drains the
/// queue then closes all channels so subscribers observe end-of-stream.
pub struct EventDispatcher {
    publish_tx: Sender<Event>,
    subscribers: Arc<Mutex<HashMap<u64, Subscriber>>>,
    publisher_id: u64,
    next_request_id: Mutex<u64>,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("publisher_id", &self.publisher_id)
            .field("subscriber_count", &self.subscriber_count())
            .finish_non_exhaustive()
    }
}

impl EventDispatcher {
    /// Spawns the dispatcher thread and returns a handle to it. `publisher_id` identifies this
    /// process/worker's events to subscribers.
    pub fn spawn(publisher_id: u64) -> Self {
        let (publish_tx, publish_rx): (Sender<Event>, Receiver<Event>) = unbounded();
        let subscribers: Arc<Mutex<HashMap<u64, Subscriber>>> = Arc::new(Mutex::new(HashMap::new()));

        let dispatch_subscribers = subscribers.clone();
        thread::spawn(move || {
            while let Ok(event) = publish_rx.recv() {
                let mut subs = dispatch_subscribers.lock().unwrap();
                subs.retain(|_, sub| sub.channel.send(event.clone()).is_ok());
            }
            // publish_tx dropped (shutdown): remaining subscriber channels drop with `subs`,
            // which signals end-of-stream to each.
        });

        EventDispatcher {
            publish_tx,
            subscribers,
            publisher_id,
            next_request_id: Mutex::new(1),
        }
    }

    fn next_request_id(&self) -> u64 {
        let mut guard = self.next_request_id.lock().unwrap();
        let id = *guard;
        *guard += 1;
        id
    }

    /// Registers a new subscriber and immediately delivers a `SUBSCRIBED` ack on its own
    /// channel (§8 scenario 6).
    pub fn subscribe(&self, sub_id: u64) -> Receiver<Event> {
        let (tx, rx) = unbounded();
        let ack = Event {
            request_id: self.next_request_id(),
            event_name: EventName::Subscribed,
            event_payload: HashMap::new(),
            publisher_id: self.publisher_id,
            process_id: std::process::id(),
            thread_id: current_thread_id(),
            event_timestamp: now_unix(),
        };
        let _ = tx.send(ack);

        self.subscribers
            .lock()
            .unwrap()
            .insert(sub_id, Subscriber { channel: tx });
        rx
    }

    /// Removes a subscriber; further publishes produce no delivery to it. The caller is
    /// expected to have observed the `UNSUBSCRIBED` ack it sends here before the channel
    /// disappears from the subscriber map.
    pub fn unsubscribe(&self, sub_id: u64) {
        let mut subs = self.subscribers.lock().unwrap();
        if let Some(sub) = subs.remove(&sub_id) {
            let ack = Event {
                request_id: self.next_request_id(),
                event_name: EventName::Unsubscribed,
                event_payload: HashMap::new(),
                publisher_id: self.publisher_id,
                process_id: std::process::id(),
                thread_id: current_thread_id(),
                event_timestamp: now_unix(),
            };
            let _ = sub.channel.send(ack);
        }
    }

    /// Broadcasts `event_name`/`event_payload` to every current subscriber, stamped with
    /// process/thread/timestamp fields.
    pub fn publish(&self, request_id: u64, event_name: EventName, event_payload: HashMap<String, String>) {
        let event = Event {
            request_id,
            event_name,
            event_payload,
            publisher_id: self.publisher_id,
            process_id: std::process::id(),
            thread_id: current_thread_id(),
            event_timestamp: now_unix(),
        };
        // The channel only disconnects once every Sender (including this one) is dropped, so
        // this send cannot fail in practice; ignore the Result rather than panic on shutdown
        // races.
        let _ = self.publish_tx.send(event);
    }

    /// The number of currently-registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn subscribe_publish_unsubscribe_fan_out() {
        let dispatcher = EventDispatcher::spawn(1);
        let rx = dispatcher.subscribe(1234);

        let ack = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(ack.event_name, EventName::Subscribed);

        let mut payload = HashMap::new();
        payload.insert("hello".to_string(), "events".to_string());
        dispatcher.publish(1, EventName::WorkStarted, payload);

        let published = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(published.event_name, EventName::WorkStarted);
        assert_eq!(published.event_payload.get("hello"), Some(&"events".to_string()));
        assert!(published.process_id > 0);

        dispatcher.unsubscribe(1234);
        let unsub_ack = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(unsub_ack.event_name, EventName::Unsubscribed);

        dispatcher.publish(2, EventName::WorkFinished, HashMap::new());
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn publish_count_matches_exactly() {
        let dispatcher = EventDispatcher::spawn(7);
        let rx = dispatcher.subscribe(1);
        let _ = rx.recv_timeout(Duration::from_secs(1)).unwrap(); // ack

        for i in 0..5 {
            dispatcher.publish(i, EventName::Custom("tick".into()), HashMap::new());
        }

        for i in 0..5 {
            let event = rx.recv_timeout(Duration::from_secs(1)).unwrap();
            assert_eq!(event.request_id, i);
        }
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }
}

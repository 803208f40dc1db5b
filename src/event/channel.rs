//! Bounded event channel with pull-by-id access and async listener fan-out.

use super::Event;
use crate::error::panic_message;
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tracing::{error, trace, warn};

/// Receives every event pushed to a channel it is registered on.
///
/// Called from a blocking worker of the dispatch runtime, never from the
/// pushing thread. Delivery order across events is not guaranteed.
pub trait EventListener: Send + Sync {
    fn notify(&self, event: &Arc<Event>);
}

/// Runs listener callbacks on a tokio runtime's blocking pool
#[derive(Clone, Debug)]
pub struct Dispatcher {
    handle: Handle,
}

impl Dispatcher {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Dispatcher for the runtime the caller is running in, if any
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }

    fn dispatch(&self, channel: &str, listener: Arc<dyn EventListener>, event: Arc<Event>) {
        let channel = channel.to_string();
        self.handle.spawn_blocking(move || {
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| listener.notify(&event)));
            if let Err(payload) = result {
                error!(
                    channel = %channel,
                    event = %event.name,
                    "Event listener panicked: {}",
                    panic_message(payload.as_ref())
                );
            }
        });
    }
}

struct Queue {
    events: VecDeque<Arc<Event>>,
    next_id: u64,
    closed: bool,
}

/// Bounded FIFO of events owned by the producing component
pub struct EventChannel {
    name: String,
    capacity: usize,
    queue: Mutex<Queue>,
    cond: Condvar,
    listeners: RwLock<Vec<Arc<dyn EventListener>>>,
    dispatcher: Dispatcher,
}

impl EventChannel {
    pub fn new(name: impl Into<String>, capacity: usize, dispatcher: Dispatcher) -> Self {
        Self {
            name: name.into(),
            capacity: capacity.max(1),
            queue: Mutex::new(Queue {
                events: VecDeque::new(),
                next_id: 0,
                closed: false,
            }),
            cond: Condvar::new(),
            listeners: RwLock::new(Vec::new()),
            dispatcher,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn add_listener(&self, listener: Arc<dyn EventListener>) {
        self.listeners.write().push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Assign the next id, append, evict the oldest past capacity and
    /// notify listeners. Returns the assigned id.
    pub fn push_event(&self, mut event: Event) -> u64 {
        let event = {
            let mut queue = self.queue.lock();
            event.id = queue.next_id;
            queue.next_id += 1;
            let event = Arc::new(event);
            queue.events.push_back(Arc::clone(&event));
            while queue.events.len() > self.capacity {
                queue.events.pop_front();
            }
            event
        };
        self.cond.notify_all();
        trace!(channel = %self.name, id = event.id, event = %event.name, "Pushed event");

        for listener in self.listeners.read().iter() {
            self.dispatcher
                .dispatch(&self.name, Arc::clone(listener), Arc::clone(&event));
        }
        event.id
    }

    /// Event with `id`; the oldest retained one if `id` was already evicted.
    /// When `blocking`, waits for the id to be pushed or the channel to close.
    pub fn get_event(&self, id: u64, blocking: bool) -> Option<Arc<Event>> {
        let mut queue = self.queue.lock();
        loop {
            if let Some(event) = self.lookup(&queue, id) {
                return Some(event);
            }
            if queue.closed || !blocking {
                return None;
            }
            self.cond.wait(&mut queue);
        }
    }

    /// Like a blocking [`get_event`](Self::get_event) that gives up after `timeout`
    pub fn get_event_timeout(&self, id: u64, timeout: Duration) -> Option<Arc<Event>> {
        let deadline = Instant::now() + timeout;
        let mut queue = self.queue.lock();
        loop {
            if let Some(event) = self.lookup(&queue, id) {
                return Some(event);
            }
            if queue.closed || self.cond.wait_until(&mut queue, deadline).timed_out() {
                return self.lookup(&queue, id);
            }
        }
    }

    fn lookup(&self, queue: &Queue, id: u64) -> Option<Arc<Event>> {
        let first = queue.events.front()?;
        if id < first.id {
            warn!(
                channel = %self.name,
                requested = id,
                oldest = first.id,
                "Event already evicted, returning oldest retained"
            );
            return Some(Arc::clone(first));
        }
        // Retained ids are contiguous.
        queue.events.get((id - first.id) as usize).cloned()
    }

    /// Id of the newest event, if any was pushed since the last reset
    pub fn last_event_id(&self) -> Option<u64> {
        let queue = self.queue.lock();
        queue.next_id.checked_sub(1)
    }

    pub fn len(&self) -> usize {
        self.queue.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all events, restart ids at 0 and reopen the channel
    pub fn reset(&self) {
        let mut queue = self.queue.lock();
        queue.events.clear();
        queue.next_id = 0;
        queue.closed = false;
        drop(queue);
        self.cond.notify_all();
    }

    /// Wake every blocked reader; pending waits return `None`
    pub fn close(&self) {
        self.queue.lock().closed = true;
        self.cond.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.queue.lock().closed
    }
}

impl std::fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventChannel")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::thread;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap()
    }

    fn channel(rt: &tokio::runtime::Runtime, capacity: usize) -> EventChannel {
        EventChannel::new("test", capacity, Dispatcher::new(rt.handle().clone()))
    }

    #[test]
    fn test_ids_are_assigned_in_order() {
        let rt = runtime();
        let chan = channel(&rt, 10);
        assert_eq!(chan.last_event_id(), None);
        assert_eq!(chan.push_event(Event::new("a", 0)), 0);
        assert_eq!(chan.push_event(Event::new("b", 0)), 1);
        assert_eq!(chan.last_event_id(), Some(1));
        assert_eq!(chan.get_event(1, false).unwrap().name, "b");
        assert!(chan.get_event(2, false).is_none());
    }

    #[test]
    fn test_overflow_evicts_oldest() {
        let rt = runtime();
        let chan = channel(&rt, 3);
        for i in 0..5 {
            chan.push_event(Event::new(format!("e{}", i), i));
        }
        assert_eq!(chan.len(), 3);
        // Evicted id falls back to the oldest retained event.
        let oldest = chan.get_event(0, false).unwrap();
        assert_eq!(oldest.id, 2);
        assert_eq!(chan.get_event(4, false).unwrap().name, "e4");
    }

    #[test]
    fn test_blocking_get_wakes_on_push() {
        let rt = runtime();
        let chan = Arc::new(channel(&rt, 10));
        let reader = Arc::clone(&chan);
        let handle = thread::spawn(move || reader.get_event(0, true));
        thread::sleep(Duration::from_millis(20));
        chan.push_event(Event::new("late", 5));
        assert_eq!(handle.join().unwrap().unwrap().name, "late");
    }

    #[test]
    fn test_close_releases_blocked_reader() {
        let rt = runtime();
        let chan = Arc::new(channel(&rt, 10));
        let reader = Arc::clone(&chan);
        let handle = thread::spawn(move || reader.get_event(0, true));
        thread::sleep(Duration::from_millis(20));
        chan.close();
        assert!(handle.join().unwrap().is_none());
    }

    #[test]
    fn test_timeout_returns_none() {
        let rt = runtime();
        let chan = channel(&rt, 10);
        let start = Instant::now();
        assert!(chan.get_event_timeout(0, Duration::from_millis(20)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    struct Forward(crossbeam_channel::Sender<u64>);

    impl EventListener for Forward {
        fn notify(&self, event: &Arc<Event>) {
            let _ = self.0.send(event.id);
        }
    }

    struct Panics;

    impl EventListener for Panics {
        fn notify(&self, _event: &Arc<Event>) {
            panic!("listener failure");
        }
    }

    #[test]
    fn test_listeners_are_notified_asynchronously() {
        let rt = runtime();
        let chan = channel(&rt, 10);
        let (tx, rx) = unbounded();
        chan.add_listener(Arc::new(Panics));
        chan.add_listener(Arc::new(Forward(tx)));
        chan.push_event(Event::new("a", 0));
        chan.push_event(Event::new("b", 0));

        let mut ids: Vec<u64> = (0..2)
            .map(|_| rx.recv_timeout(Duration::from_secs(2)).unwrap())
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn test_reset_restarts_ids() {
        let rt = runtime();
        let chan = channel(&rt, 10);
        chan.push_event(Event::new("a", 0));
        chan.close();
        chan.reset();
        assert!(!chan.is_closed());
        assert!(chan.is_empty());
        assert_eq!(chan.push_event(Event::new("b", 0)), 0);
    }
}

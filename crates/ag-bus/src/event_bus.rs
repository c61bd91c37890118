use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use ag_store::Store;
use ag_types::{Event, EventKind};
use uuid::Uuid;

use crate::{Error, Result};

/// Something that wants to see every event it's subscribed to, in order.
/// Implementations must not block the bus for long: they run concurrently
/// with every other subscriber, but a slow handler still delays the
/// `publish` call that's waiting on all of them.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &Event);
}

impl<F: Fn(&Event) + Send + Sync> EventHandler for F {
    fn handle(&self, event: &Event) {
        self(event)
    }
}

pub type SubscriptionId = u64;

struct Subscribers {
    next_id: SubscriptionId,
    global: Vec<(SubscriptionId, Box<dyn EventHandler>)>,
    by_kind: HashMap<EventKind, Vec<(SubscriptionId, Box<dyn EventHandler>)>>,
}

impl Subscribers {
    fn new() -> Self {
        Self { next_id: 0, global: Vec::new(), by_kind: HashMap::new() }
    }
}

/// Per-run sequencing, persist-before-dispatch, and in-process pub/sub.
///
/// `publish` assigns the next sequence number for the event's run and
/// persists it while holding `state`; subscriber dispatch happens after the
/// lock is released, so a slow or wedged subscriber can never stall another
/// publisher.
pub struct EventBus {
    state: Mutex<BusState>,
    subscribers: Mutex<Subscribers>,
}

struct BusState {
    store: Store,
    sequences: HashMap<Uuid, AtomicU64>,
}

impl EventBus {
    pub fn new(store: Store) -> Self {
        Self {
            state: Mutex::new(BusState { store, sequences: HashMap::new() }),
            subscribers: Mutex::new(Subscribers::new()),
        }
    }

    /// Assign the next sequence number, persist, then fan out to subscribers.
    /// Returns the event as actually persisted (with its assigned sequence).
    pub fn publish(&self, mut event: Event) -> Result<Event> {
        {
            let mut state = self.state.lock().unwrap();
            let next = next_sequence(&mut state, event.run_id)?;
            event.sequence = next;
            state.store.append_event(&event)?;
        }
        self.dispatch(&event);
        Ok(event)
    }

    /// Permitted only before the first `publish` for this run; resets the
    /// in-memory counter so the next `publish` starts sequencing from zero
    /// again (used when a branch wants a fresh event log for its new run id
    /// before anything has been written to it).
    pub fn reset_sequence(&self, run_id: Uuid) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.sequences.contains_key(&run_id) {
            return Err(Error::SequenceAlreadyStarted(run_id));
        }
        state.sequences.insert(run_id, AtomicU64::new(0));
        Ok(())
    }

    /// Reach the store this bus persists through for anything beyond
    /// publish/replay/reset — session and pattern bookkeeping shares the
    /// same lock `publish` uses rather than opening a second handle onto
    /// the same database.
    pub fn with_store<R>(&self, f: impl FnOnce(&Store) -> R) -> R {
        let state = self.state.lock().unwrap();
        f(&state.store)
    }

    pub fn replay(&self, run_id: Uuid, from_sequence: u64, to_sequence: Option<u64>) -> Result<Vec<Event>> {
        let state = self.state.lock().unwrap();
        let events = state.store.get_events_for_run(run_id, from_sequence)?;
        Ok(match to_sequence {
            Some(to) => events.into_iter().filter(|e| e.sequence <= to).collect(),
            None => events,
        })
    }

    /// Subscribe to every event regardless of kind. Returns an id suitable
    /// for `unsubscribe`; there's no persistent subscription table, so this
    /// id is only meaningful for the lifetime of this `EventBus`.
    pub fn subscribe_all(&self, handler: impl EventHandler + 'static) -> SubscriptionId {
        let mut subs = self.subscribers.lock().unwrap();
        let id = subs.next_id;
        subs.next_id += 1;
        subs.global.push((id, Box::new(handler)));
        id
    }

    pub fn subscribe(&self, kind: EventKind, handler: impl EventHandler + 'static) -> SubscriptionId {
        let mut subs = self.subscribers.lock().unwrap();
        let id = subs.next_id;
        subs.next_id += 1;
        subs.by_kind.entry(kind).or_default().push((id, Box::new(handler)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut subs = self.subscribers.lock().unwrap();
        subs.global.retain(|(sid, _)| *sid != id);
        for handlers in subs.by_kind.values_mut() {
            handlers.retain(|(sid, _)| *sid != id);
        }
    }

    /// Runs every matching subscriber concurrently rather than one after the
    /// other: each gets its own thread, scoped so `dispatch` still only
    /// returns once they've all run, but a slow subscriber no longer delays
    /// the others from starting.
    fn dispatch(&self, event: &Event) {
        let subs = self.subscribers.lock().unwrap();
        std::thread::scope(|scope| {
            for (id, handler) in subs.global.iter() {
                let handler = handler.as_ref();
                scope.spawn(move || invoke(*id, handler, event));
            }
            if let Some(handlers) = subs.by_kind.get(&event.kind) {
                for (id, handler) in handlers {
                    let handler = handler.as_ref();
                    scope.spawn(move || invoke(*id, handler, event));
                }
            }
        });
    }
}

fn next_sequence(state: &mut BusState, run_id: Uuid) -> Result<u64> {
    if !state.sequences.contains_key(&run_id) {
        let starting_at = state.store.get_last_sequence(run_id)?;
        state.sequences.insert(run_id, AtomicU64::new(starting_at));
    }
    let counter = state.sequences.get(&run_id).expect("just inserted");
    Ok(counter.fetch_add(1, Ordering::SeqCst))
}

/// A handler that panics must never take down the publisher or its
/// siblings; catch, log, and move on.
fn invoke(id: SubscriptionId, handler: &dyn EventHandler, event: &Event) {
    let result = std::panic::catch_unwind(AssertUnwindSafe(|| handler.handle(event)));
    if let Err(panic) = result {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        tracing::error!(subscription_id = id, %message, "event subscriber panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ag_types::Payload;
    use serde_json::json;
    use std::sync::Arc;

    fn bus() -> EventBus {
        EventBus::new(Store::open_in_memory().unwrap())
    }

    fn sample_event(run_id: Uuid, kind: EventKind) -> Event {
        Event::new(Uuid::new_v4(), run_id, kind, Payload::Generic(json!({})))
    }

    #[test]
    fn publish_assigns_strictly_increasing_sequence_per_run() {
        let bus = bus();
        let run_id = Uuid::new_v4();
        let first = bus.publish(sample_event(run_id, EventKind::RunStarted)).unwrap();
        let second = bus.publish(sample_event(run_id, EventKind::StreamAssistant)).unwrap();
        assert_eq!(first.sequence, 0);
        assert_eq!(second.sequence, 1);
    }

    #[test]
    fn different_runs_sequence_independently() {
        let bus = bus();
        let a = bus.publish(sample_event(Uuid::new_v4(), EventKind::RunStarted)).unwrap();
        let b = bus.publish(sample_event(Uuid::new_v4(), EventKind::RunStarted)).unwrap();
        assert_eq!(a.sequence, 0);
        assert_eq!(b.sequence, 0);
    }

    #[test]
    fn reset_sequence_fails_once_a_run_has_published() {
        let bus = bus();
        let run_id = Uuid::new_v4();
        bus.publish(sample_event(run_id, EventKind::RunStarted)).unwrap();
        assert!(bus.reset_sequence(run_id).is_err());
    }

    #[test]
    fn reset_sequence_succeeds_before_any_publish() {
        let bus = bus();
        assert!(bus.reset_sequence(Uuid::new_v4()).is_ok());
    }

    #[test]
    fn replay_returns_events_in_sequence_order_within_bounds() {
        let bus = bus();
        let run_id = Uuid::new_v4();
        for _ in 0..5 {
            bus.publish(sample_event(run_id, EventKind::StreamAssistant)).unwrap();
        }
        let replayed = bus.replay(run_id, 1, Some(3)).unwrap();
        let sequences: Vec<u64> = replayed.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }

    #[test]
    fn global_and_kind_subscribers_both_see_a_matching_event() {
        let bus = bus();
        let global_hits = Arc::new(Mutex::new(0));
        let kind_hits = Arc::new(Mutex::new(0));
        let g = global_hits.clone();
        let k = kind_hits.clone();
        bus.subscribe_all(move |_: &Event| *g.lock().unwrap() += 1);
        bus.subscribe(EventKind::RunStarted, move |_: &Event| *k.lock().unwrap() += 1);

        bus.publish(sample_event(Uuid::new_v4(), EventKind::RunStarted)).unwrap();
        bus.publish(sample_event(Uuid::new_v4(), EventKind::StreamAssistant)).unwrap();

        assert_eq!(*global_hits.lock().unwrap(), 2);
        assert_eq!(*kind_hits.lock().unwrap(), 1);
    }

    #[test]
    fn a_panicking_subscriber_does_not_stop_others_or_the_publisher() {
        let bus = bus();
        let hits = Arc::new(Mutex::new(0));
        let h = hits.clone();
        bus.subscribe_all(|_: &Event| panic!("boom"));
        bus.subscribe_all(move |_: &Event| *h.lock().unwrap() += 1);

        let published = bus.publish(sample_event(Uuid::new_v4(), EventKind::RunStarted));
        assert!(published.is_ok());
        assert_eq!(*hits.lock().unwrap(), 1);
    }

    #[test]
    fn unsubscribe_stops_further_delivery() {
        let bus = bus();
        let hits = Arc::new(Mutex::new(0));
        let h = hits.clone();
        let id = bus.subscribe_all(move |_: &Event| *h.lock().unwrap() += 1);
        bus.publish(sample_event(Uuid::new_v4(), EventKind::RunStarted)).unwrap();
        bus.unsubscribe(id);
        bus.publish(sample_event(Uuid::new_v4(), EventKind::RunStarted)).unwrap();
        assert_eq!(*hits.lock().unwrap(), 1);
    }
}

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ag_types::Event;
use uuid::Uuid;

pub type ConnectionId = u64;

/// One outbound connection. `send_event`/`send_pong` report whether the send
/// succeeded; a `false` return evicts the connection from every bucket it's
/// in. This crate has no opinion on the transport — a real server plugs in
/// whatever wraps its WebSocket write half.
pub trait Connection: Send + Sync {
    fn send_event(&self, event: &Event) -> bool;
    fn send_pong(&self) -> bool;
}

/// A control message sent over an established connection, distinct from the
/// events flowing the other way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    Ping,
    Subscribe { run_id: Uuid },
}

/// Which bucket a connection currently belongs to: global connections see
/// every event; a per-run bucket sees only that run's events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bucket {
    Global,
    Run(Uuid),
}

struct RegistryState<C> {
    connections: HashMap<ConnectionId, Arc<C>>,
    buckets: HashMap<ConnectionId, Bucket>,
    next_id: ConnectionId,
}

/// The global + per-run connection registry described for the WebSocket
/// fan-out surface. Sends happen outside the registry lock: a slow or dead
/// connection's write should never stall registration/eviction of others.
pub struct ConnectionRegistry<C> {
    state: Mutex<RegistryState<C>>,
}

impl<C: Connection> ConnectionRegistry<C> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState {
                connections: HashMap::new(),
                buckets: HashMap::new(),
                next_id: 0,
            }),
        }
    }

    pub fn register_global(&self, connection: Arc<C>) -> ConnectionId {
        self.register(connection, Bucket::Global)
    }

    pub fn register_for_run(&self, connection: Arc<C>, run_id: Uuid) -> ConnectionId {
        self.register(connection, Bucket::Run(run_id))
    }

    fn register(&self, connection: Arc<C>, bucket: Bucket) -> ConnectionId {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id;
        state.next_id += 1;
        state.connections.insert(id, connection);
        state.buckets.insert(id, bucket);
        id
    }

    pub fn evict(&self, id: ConnectionId) {
        let mut state = self.state.lock().unwrap();
        state.connections.remove(&id);
        state.buckets.remove(&id);
    }

    pub fn handle_control_message(&self, id: ConnectionId, message: ControlMessage) {
        match message {
            ControlMessage::Ping => {
                let connection = {
                    let state = self.state.lock().unwrap();
                    state.connections.get(&id).cloned()
                };
                if let Some(connection) = connection {
                    if !connection.send_pong() {
                        self.evict(id);
                    }
                }
            }
            ControlMessage::Subscribe { run_id } => {
                let mut state = self.state.lock().unwrap();
                if state.connections.contains_key(&id) {
                    state.buckets.insert(id, Bucket::Run(run_id));
                }
            }
        }
    }

    /// Send `event` to every global connection plus every connection
    /// subscribed to `event.run_id`. Connections whose send fails are
    /// evicted from the registry.
    pub fn broadcast_event(&self, event: &Event) {
        let targets: Vec<(ConnectionId, Arc<C>)> = {
            let state = self.state.lock().unwrap();
            state
                .buckets
                .iter()
                .filter(|(_, bucket)| matches!(bucket, Bucket::Global) || **bucket == Bucket::Run(event.run_id))
                .filter_map(|(id, _)| state.connections.get(id).map(|c| (*id, c.clone())))
                .collect()
        };

        let mut dead = Vec::new();
        for (id, connection) in targets {
            if !connection.send_event(event) {
                dead.push(id);
            }
        }
        for id in dead {
            self.evict(id);
        }
    }

    pub fn connection_count(&self) -> usize {
        self.state.lock().unwrap().connections.len()
    }
}

impl<C: Connection> Default for ConnectionRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ag_types::{EventKind, Payload};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct RecordingConnection {
        received: AtomicUsize,
        pongs: AtomicUsize,
        alive: AtomicBool,
    }

    impl RecordingConnection {
        fn new() -> Self {
            Self { received: AtomicUsize::new(0), pongs: AtomicUsize::new(0), alive: AtomicBool::new(true) }
        }

        fn dead() -> Self {
            let c = Self::new();
            c.alive.store(false, Ordering::SeqCst);
            c
        }
    }

    impl Connection for RecordingConnection {
        fn send_event(&self, _event: &Event) -> bool {
            if self.alive.load(Ordering::SeqCst) {
                self.received.fetch_add(1, Ordering::SeqCst);
                true
            } else {
                false
            }
        }

        fn send_pong(&self) -> bool {
            self.pongs.fetch_add(1, Ordering::SeqCst);
            self.alive.load(Ordering::SeqCst)
        }
    }

    fn event(run_id: Uuid) -> Event {
        Event::new(Uuid::new_v4(), run_id, EventKind::StreamAssistant, Payload::Generic(json!({})))
    }

    #[test]
    fn global_connections_receive_every_runs_events() {
        let registry = ConnectionRegistry::new();
        let conn = Arc::new(RecordingConnection::new());
        registry.register_global(conn.clone());

        registry.broadcast_event(&event(Uuid::new_v4()));
        registry.broadcast_event(&event(Uuid::new_v4()));

        assert_eq!(conn.received.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn run_scoped_connections_only_receive_their_run() {
        let registry = ConnectionRegistry::new();
        let run_id = Uuid::new_v4();
        let conn = Arc::new(RecordingConnection::new());
        registry.register_for_run(conn.clone(), run_id);

        registry.broadcast_event(&event(run_id));
        registry.broadcast_event(&event(Uuid::new_v4()));

        assert_eq!(conn.received.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn subscribe_control_message_moves_connection_to_run_bucket() {
        let registry = ConnectionRegistry::new();
        let conn = Arc::new(RecordingConnection::new());
        let id = registry.register_global(conn.clone());
        let run_id = Uuid::new_v4();

        registry.handle_control_message(id, ControlMessage::Subscribe { run_id });

        registry.broadcast_event(&event(run_id));
        registry.broadcast_event(&event(Uuid::new_v4()));

        assert_eq!(conn.received.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_send_evicts_connection_from_registry() {
        let registry = ConnectionRegistry::new();
        let conn = Arc::new(RecordingConnection::dead());
        registry.register_global(conn.clone());
        assert_eq!(registry.connection_count(), 1);

        registry.broadcast_event(&event(Uuid::new_v4()));

        assert_eq!(registry.connection_count(), 0);
    }

    #[test]
    fn ping_sends_pong_and_evicts_if_dead() {
        let registry = ConnectionRegistry::new();
        let conn = Arc::new(RecordingConnection::dead());
        let id = registry.register_global(conn.clone());

        registry.handle_control_message(id, ControlMessage::Ping);

        assert_eq!(conn.pongs.load(Ordering::SeqCst), 1);
        assert_eq!(registry.connection_count(), 0);
    }
}

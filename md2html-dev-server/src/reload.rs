use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::{Stream, StreamExt};

pub const RELOAD_EVENT: &str = "reload";
pub const PING_EVENT: &str = "ping";

/// Encode one event-stream message. Multi-line data becomes one `data:` line
/// per line.
pub fn format_event(event: &str, data: &str) -> String {
    let mut payload = format!("event: {event}\n");
    if data.is_empty() {
        payload.push_str("data:\n");
    } else {
        for line in data.lines() {
            payload.push_str("data: ");
            payload.push_str(line);
            payload.push('\n');
        }
    }
    payload.push('\n');
    payload
}

pub fn timestamp() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or_default()
        .to_string()
}

#[derive(Debug, Default)]
struct Clients {
    next_id: u64,
    queues: HashMap<u64, UnboundedSender<String>>,
}

/// Fans live-reload events out to every connected browser.
#[derive(Debug, Clone, Default)]
pub struct ReloadBroadcaster {
    clients: Arc<Mutex<Clients>>,
}

impl ReloadBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Clients> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a client queue. The client is greeted with a `ping`.
    pub fn register(&self) -> (u64, UnboundedReceiver<String>) {
        let (tx, rx) = unbounded_channel();
        let _ = tx.send(format_event(PING_EVENT, &timestamp()));

        let mut clients = self.lock();
        let id = clients.next_id;
        clients.next_id += 1;
        clients.queues.insert(id, tx);
        tracing::debug!(client = id, "Live reload client connected");
        (id, rx)
    }

    pub fn unregister(&self, id: u64) {
        if self.lock().queues.remove(&id).is_some() {
            tracing::debug!(client = id, "Live reload client disconnected");
        }
    }

    /// Event stream for one client; dropping it unregisters the client.
    pub fn subscribe(&self) -> impl Stream<Item = Result<String, Infallible>> + Send + 'static {
        let (id, rx) = self.register();
        let guard = ClientGuard {
            id,
            broadcaster: self.clone(),
        };
        UnboundedReceiverStream::new(rx).map(move |payload| {
            let _connected = &guard;
            Ok(payload)
        })
    }

    pub fn broadcast(&self, event: &str, data: &str) {
        let payload = format_event(event, data);
        let mut clients = self.lock();
        clients
            .queues
            .retain(|_, queue| queue.send(payload.clone()).is_ok());
    }

    pub fn reload(&self) {
        self.broadcast(RELOAD_EVENT, &timestamp());
    }

    pub fn ping(&self) {
        self.broadcast(PING_EVENT, &timestamp());
    }

    pub fn client_count(&self) -> usize {
        self.lock().queues.len()
    }

    /// Drop every client queue, ending all open streams.
    pub fn close(&self) {
        self.lock().queues.clear();
    }
}

struct ClientGuard {
    id: u64,
    broadcaster: ReloadBroadcaster,
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        self.broadcaster.unregister(self.id);
    }
}

//! Push fan-out: one writer, many SSE subscribers.
//!
//! A single writer task owns the broadcast order: `/notify` handlers post
//! onto a bounded command channel and the writer distributes to per-client
//! bounded buffers. A client that stops draining its buffer gets dropped;
//! one stuck reader can never stall the fan-out. The latest payload is
//! cached in memory so new connections do not re-read disk.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::constants::{BROADCAST_CHANNEL_CAPACITY, CLIENT_BUFFER_EVENTS};

/// Payloads are shared verbatim with every subscriber.
pub type Payload = Arc<str>;

enum Command {
    Broadcast(Payload),
    Shutdown { payload: Payload, ack: oneshot::Sender<()> },
}

/// Client registry and latest-payload cache, shared with the writer task.
struct Inner {
    clients: DashMap<Uuid, mpsc::Sender<Payload>>,
    latest: RwLock<Option<Payload>>,
}

impl Inner {
    /// Distributes one payload, dropping clients that are gone or too far
    /// behind to accept it.
    fn distribute(&self, payload: &Payload) {
        *self.latest.write() = Some(Arc::clone(payload));

        let mut dropped = Vec::new();
        for entry in self.clients.iter() {
            match entry.value().try_send(Arc::clone(payload)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    log::warn!("[Fanout] dropping slow client {}", entry.key());
                    dropped.push(*entry.key());
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    dropped.push(*entry.key());
                }
            }
        }
        for id in dropped {
            self.clients.remove(&id);
        }
    }
}

/// Handle for subscribing and posting broadcasts.
#[derive(Clone)]
pub struct Broadcaster {
    inner: Arc<Inner>,
    commands: mpsc::Sender<Command>,
}

impl Broadcaster {
    /// Creates the broadcaster and spawns its writer task.
    pub fn new() -> Self {
        let inner = Arc::new(Inner {
            clients: DashMap::new(),
            latest: RwLock::new(None),
        });
        let (commands, mut rx) = mpsc::channel::<Command>(BROADCAST_CHANNEL_CAPACITY);

        let writer_inner = Arc::clone(&inner);
        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    Command::Broadcast(payload) => writer_inner.distribute(&payload),
                    Command::Shutdown { payload, ack } => {
                        writer_inner.distribute(&payload);
                        // Dropping the senders ends every client stream.
                        writer_inner.clients.clear();
                        let _ = ack.send(());
                        return;
                    }
                }
            }
        });

        Self { inner, commands }
    }

    /// Registers a new client.
    ///
    /// Returns the client id, its event receiver, and the cached latest
    /// payload (to send immediately on connect).
    pub fn subscribe(&self) -> (Uuid, mpsc::Receiver<Payload>, Option<Payload>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(CLIENT_BUFFER_EVENTS);
        self.inner.clients.insert(id, tx);
        let latest = self.inner.latest.read().clone();
        log::info!(
            "[Fanout] client {id} connected (total: {})",
            self.inner.clients.len()
        );
        (id, rx, latest)
    }

    /// Removes a client explicitly (normal disconnect).
    pub fn unsubscribe(&self, id: &Uuid) {
        if self.inner.clients.remove(id).is_some() {
            log::info!(
                "[Fanout] client {id} disconnected (remaining: {})",
                self.inner.clients.len()
            );
        }
    }

    /// Posts a payload for broadcast. Returns `false` when the writer's
    /// command channel is saturated and the payload was discarded.
    pub fn broadcast(&self, payload: String) -> bool {
        match self.commands.try_send(Command::Broadcast(Payload::from(payload))) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("[Fanout] broadcast channel saturated; payload dropped: {e}");
                false
            }
        }
    }

    /// Primes the latest-payload cache without broadcasting (startup).
    pub fn prime(&self, payload: String) {
        let mut latest = self.inner.latest.write();
        if latest.is_none() {
            *latest = Some(Payload::from(payload));
        }
    }

    /// Number of connected clients.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.inner.clients.len()
    }

    /// Broadcasts a terminal "restarting" payload and closes every client
    /// connection. Called exactly once, on shutdown.
    pub async fn shutdown(&self, message: &str) {
        let payload = restarting_payload(message);
        let (ack, done) = oneshot::channel();
        if self
            .commands
            .send(Command::Shutdown {
                payload: Payload::from(payload),
                ack,
            })
            .await
            .is_ok()
        {
            let _ = done.await;
        }
        log::info!("[Fanout] shutdown broadcast delivered");
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// The payload clients see while the station restarts.
#[must_use]
pub fn restarting_payload(message: &str) -> String {
    json!({
        "system_status": "restarting",
        "message": message,
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_reaches_every_subscriber() {
        let fanout = Broadcaster::new();
        let (_id1, mut rx1, initial1) = fanout.subscribe();
        let (_id2, mut rx2, _) = fanout.subscribe();
        assert!(initial1.is_none(), "no payload cached yet");

        assert!(fanout.broadcast("{\"n\":1}".to_string()));
        assert_eq!(&*rx1.recv().await.unwrap(), "{\"n\":1}");
        assert_eq!(&*rx2.recv().await.unwrap(), "{\"n\":1}");
    }

    #[tokio::test]
    async fn late_subscriber_gets_cached_latest() {
        let fanout = Broadcaster::new();
        fanout.broadcast("{\"n\":7}".to_string());

        // Let the writer process the command.
        tokio::task::yield_now().await;
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(1);
        loop {
            let (_id, _rx, latest) = fanout.subscribe();
            if let Some(latest) = latest {
                assert_eq!(&*latest, "{\"n\":7}");
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "latest never cached");
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn slow_client_is_dropped_not_waited_on() {
        let fanout = Broadcaster::new();
        let (_id, rx, _) = fanout.subscribe();
        // Never drain rx: the buffer fills, then one more broadcast drops us.
        for i in 0..=CLIENT_BUFFER_EVENTS {
            fanout.broadcast(format!("{{\"n\":{i}}}"));
        }

        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(1);
        while fanout.client_count() > 0 {
            assert!(tokio::time::Instant::now() < deadline, "slow client never dropped");
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        drop(rx);
    }

    #[tokio::test]
    async fn shutdown_delivers_restarting_then_closes() {
        let fanout = Broadcaster::new();
        let (_id, mut rx, _) = fanout.subscribe();

        fanout.shutdown("deploy in progress").await;

        let last = rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&last).unwrap();
        assert_eq!(value["system_status"], "restarting");
        assert_eq!(value["message"], "deploy in progress");

        // Stream is closed afterwards.
        assert!(rx.recv().await.is_none());
        assert_eq!(fanout.client_count(), 0);
    }

    #[tokio::test]
    async fn unsubscribe_removes_client() {
        let fanout = Broadcaster::new();
        let (id, _rx, _) = fanout.subscribe();
        assert_eq!(fanout.client_count(), 1);
        fanout.unsubscribe(&id);
        assert_eq!(fanout.client_count(), 0);
    }
}

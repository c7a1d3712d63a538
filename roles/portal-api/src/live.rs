//! Registry of open `live_stats` subscribers and the broadcast that pushes
//! each new snapshot to them.

use bytes::Bytes;
use futures::Stream;
use parking_lot::RwLock;
use rand::Rng;
use std::{
    collections::HashMap,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Write half of a subscriber connection. Sending fails once the peer's side
/// has been dropped.
pub type LiveConnection = mpsc::UnboundedSender<Bytes>;

/// Frame written when a subscription opens, confirming the stream is live.
pub const OPEN_FRAME: &[u8] = b"\n";

pub struct LiveBroadcastRegistry {
    connections: RwLock<HashMap<String, LiveConnection>>,
}

impl LiveBroadcastRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            connections: RwLock::new(HashMap::new()),
        })
    }

    /// Register `connection` under a fresh random id and return the id.
    ///
    /// The open frame is written first; a connection that is already closed
    /// is not registered.
    pub fn subscribe(&self, connection: LiveConnection) -> String {
        let mut connections = self.connections.write();
        let id = loop {
            let candidate = format!("{:016x}", rand::thread_rng().gen::<u64>());
            if !connections.contains_key(&candidate) {
                break candidate;
            }
        };

        if connection.send(Bytes::from_static(OPEN_FRAME)).is_err() {
            debug!("Live subscriber {} closed before registration", id);
            return id;
        }

        connections.insert(id.clone(), connection);
        info!("Live subscriber {} connected ({} open)", id, connections.len());
        id
    }

    /// Open a subscription whose feed unsubscribes itself when dropped, i.e.
    /// when the HTTP connection carrying it goes away.
    pub fn open(self: &Arc<Self>) -> LiveFeed {
        let (connection, receiver) = mpsc::unbounded_channel();
        let id = self.subscribe(connection);
        LiveFeed {
            id,
            receiver,
            registry: Arc::clone(self),
        }
    }

    pub fn unsubscribe(&self, id: &str) -> bool {
        let mut connections = self.connections.write();
        let removed = connections.remove(id).is_some();
        if removed {
            info!("Live subscriber {} disconnected ({} open)", id, connections.len());
        }
        removed
    }

    /// Push `payload` as one event-stream frame to every subscriber registered
    /// at call time. Subscribers whose connection has closed are dropped from
    /// the registry without affecting delivery to the rest.
    ///
    /// Returns the number of subscribers the frame was delivered to.
    pub fn broadcast(&self, payload: &str) -> usize {
        let frame = Bytes::from(format!("data: {}\n\n", payload));
        let targets: Vec<(String, LiveConnection)> = self
            .connections
            .read()
            .iter()
            .map(|(id, connection)| (id.clone(), connection.clone()))
            .collect();

        let mut delivered = 0;
        let mut closed = Vec::new();
        for (id, connection) in targets {
            match connection.send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    warn!("Dropping live subscriber {}: connection closed", id);
                    closed.push(id);
                }
            }
        }

        if !closed.is_empty() {
            let mut connections = self.connections.write();
            for id in &closed {
                connections.remove(id);
            }
        }

        debug!("Broadcast {} bytes to {} live subscribers", frame.len(), delivered);
        delivered
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }
}

/// Read half of a subscription, streamed out as the response body.
pub struct LiveFeed {
    id: String,
    receiver: mpsc::UnboundedReceiver<Bytes>,
    registry: Arc<LiveBroadcastRegistry>,
}

impl LiveFeed {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Stream for LiveFeed {
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Bytes>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for LiveFeed {
    fn drop(&mut self) {
        self.registry.unsubscribe(&self.id);
    }
}

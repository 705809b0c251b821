//! In-process connector for tests and offline demos.
//!
//! [`memory_connector`] returns a connector and the listener that sees the
//! other end of every connection it opens. Each accepted [`MemoryPeer`]
//! plays the server: it reads what the client sent and pushes replies.
//!
//! ```text
//! client task ── MemoryConnector::connect ──► MemoryListener::accept ──► MemoryPeer
//!             ◄──────────── WireMessage channel pair ─────────────►
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::{Connection, ConnectionId, Connector, TransportError, WireMessage};

type Tx = mpsc::UnboundedSender<WireMessage>;
type Rx = mpsc::UnboundedReceiver<WireMessage>;

/// Creates a connected connector/listener pair.
pub fn memory_connector() -> (MemoryConnector, MemoryListener) {
    let (accept_tx, accept_rx) = mpsc::unbounded_channel();
    let connector = MemoryConnector {
        shared: Arc::new(Shared {
            accept_tx,
            refuse: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
        }),
    };
    (connector, MemoryListener { accept_rx })
}

struct Shared {
    accept_tx: mpsc::UnboundedSender<MemoryPeer>,
    refuse: AtomicBool,
    attempts: AtomicUsize,
}

/// Client side of the in-memory transport. Cheap to clone.
#[derive(Clone)]
pub struct MemoryConnector {
    shared: Arc<Shared>,
}

impl MemoryConnector {
    /// Makes every subsequent `connect` fail (or succeed again).
    pub fn set_refuse(&self, refuse: bool) {
        self.shared.refuse.store(refuse, Ordering::SeqCst);
    }

    /// How many times `connect` has been called, refused or not.
    pub fn attempts(&self) -> usize {
        self.shared.attempts.load(Ordering::SeqCst)
    }
}

impl Connector for MemoryConnector {
    type Connection = MemoryConnection;

    async fn connect(&self, url: &str) -> Result<Self::Connection, TransportError> {
        self.shared.attempts.fetch_add(1, Ordering::SeqCst);
        let refused = || TransportError::ConnectFailed {
            url: url.to_owned(),
            source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
        };
        if self.shared.refuse.load(Ordering::SeqCst) {
            return Err(refused());
        }

        let (to_peer, from_client) = mpsc::unbounded_channel();
        let (to_client, from_peer) = mpsc::unbounded_channel();
        let id = ConnectionId::next();
        let peer = MemoryPeer {
            id,
            url: url.to_owned(),
            tx: std::sync::Mutex::new(Some(to_client)),
            rx: Mutex::new(from_client),
        };
        // A dropped listener means nobody is accepting.
        self.shared.accept_tx.send(peer).map_err(|_| refused())?;

        tracing::debug!(%id, url, "memory connection opened");
        Ok(MemoryConnection {
            id,
            tx: std::sync::Mutex::new(Some(to_peer)),
            rx: Mutex::new(from_peer),
        })
    }
}

/// Receives the server end of every connection the paired connector opens.
pub struct MemoryListener {
    accept_rx: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryListener {
    /// Waits for the next connection. `None` once every connector is gone.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.accept_rx.recv().await
    }

    /// Returns an already-pending connection without waiting.
    pub fn try_accept(&mut self) -> Option<MemoryPeer> {
        self.accept_rx.try_recv().ok()
    }
}

/// Client end of an in-memory connection.
pub struct MemoryConnection {
    id: ConnectionId,
    tx: std::sync::Mutex<Option<Tx>>,
    rx: Mutex<Rx>,
}

impl Connection for MemoryConnection {
    async fn send(&self, msg: WireMessage) -> Result<(), TransportError> {
        send_on(&self.tx, msg)
    }

    async fn recv(&self) -> Result<Option<WireMessage>, TransportError> {
        Ok(self.rx.lock().await.recv().await)
    }

    async fn close(&self) -> Result<(), TransportError> {
        close_tx(&self.tx);
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

/// Server end of an in-memory connection.
pub struct MemoryPeer {
    id: ConnectionId,
    url: String,
    tx: std::sync::Mutex<Option<Tx>>,
    rx: Mutex<Rx>,
}

impl MemoryPeer {
    /// The URL the client dialled.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Pushes a message to the client.
    pub fn send(&self, msg: WireMessage) -> Result<(), TransportError> {
        send_on(&self.tx, msg)
    }

    /// Next message from the client, or `None` once the client closed or
    /// dropped its end.
    pub async fn recv(&self) -> Option<WireMessage> {
        self.rx.lock().await.recv().await
    }

    /// Closes the server end; the client's next `recv` returns `None`.
    pub fn close(&self) {
        close_tx(&self.tx);
    }
}

fn send_on(tx: &std::sync::Mutex<Option<Tx>>, msg: WireMessage) -> Result<(), TransportError> {
    let guard = tx
        .lock()
        .map_err(|_| TransportError::ConnectionClosed("sender poisoned".into()))?;
    let Some(tx) = guard.as_ref() else {
        return Err(TransportError::ConnectionClosed("closed locally".into()));
    };
    tx.send(msg)
        .map_err(|_| TransportError::ConnectionClosed("peer gone".into()))
}

fn close_tx(tx: &std::sync::Mutex<Option<Tx>>) {
    if let Ok(mut guard) = tx.lock() {
        guard.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_round_trip() {
        let (connector, mut listener) = memory_connector();
        let conn = connector.connect("mem://room").await.unwrap();
        let peer = listener.accept().await.unwrap();
        assert_eq!(peer.url(), "mem://room");
        assert_eq!(peer.id(), conn.id());

        conn.send(WireMessage::Binary(vec![1, 2])).await.unwrap();
        assert_eq!(peer.recv().await, Some(WireMessage::Binary(vec![1, 2])));

        peer.send(WireMessage::Text("hi".into())).unwrap();
        assert_eq!(
            conn.recv().await.unwrap(),
            Some(WireMessage::Text("hi".into()))
        );
    }

    #[tokio::test]
    async fn test_client_close_is_seen_by_peer() {
        let (connector, mut listener) = memory_connector();
        let conn = connector.connect("mem://a").await.unwrap();
        let peer = listener.accept().await.unwrap();
        conn.close().await.unwrap();
        assert_eq!(peer.recv().await, None);
        assert!(conn.send(WireMessage::Text("late".into())).await.is_err());
    }

    #[tokio::test]
    async fn test_peer_close_ends_client_recv() {
        let (connector, mut listener) = memory_connector();
        let conn = connector.connect("mem://a").await.unwrap();
        let peer = listener.accept().await.unwrap();
        peer.close();
        assert_eq!(conn.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_refuse_counts_attempts() {
        let (connector, _listener) = memory_connector();
        connector.set_refuse(true);
        let err = connector.connect("mem://a").await.err().unwrap();
        assert!(matches!(err, TransportError::ConnectFailed { .. }));
        connector.set_refuse(false);
        assert!(connector.connect("mem://a").await.is_ok());
        assert_eq!(connector.attempts(), 2);
    }
}

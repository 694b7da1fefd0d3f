//! Session management module
//!
//! Manages client sessions including:
//! - Session lifecycle (creation, tracking, cleanup)
//! - Per-session bounded outbound event queue
//! - Targeted sends and area broadcasts that never block the caller
//! - Connection limits (total and per IP)

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{NetworkError, Result};
use crate::protocol::OutboundEvent;

/// Unique session identifier
pub type SessionId = u64;

/// Default outbound queue length per session
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// A connected client session
pub struct Session {
    /// Unique session identifier
    pub id: SessionId,
    /// Remote address of the client
    pub address: SocketAddr,
    /// Time of session creation
    pub created_at: Instant,
    /// Outbound event queue, drained by the connection's writer
    outbound_tx: mpsc::Sender<OutboundEvent>,
}

impl Session {
    /// Create a new session feeding the given queue
    pub fn new(id: SessionId, address: SocketAddr, outbound_tx: mpsc::Sender<OutboundEvent>) -> Self {
        Self {
            id,
            address,
            created_at: Instant::now(),
            outbound_tx,
        }
    }

    /// Get the IP address as a string (without port)
    pub fn ip(&self) -> String {
        self.address.ip().to_string()
    }

    /// Queue an event without blocking
    pub fn try_send(&self, event: OutboundEvent) -> std::result::Result<(), NetworkError> {
        self.outbound_tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => NetworkError::WriteBufferFull,
            mpsc::error::TrySendError::Closed(_) => NetworkError::ConnectionClosed,
        })
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("connected_for", &self.created_at.elapsed())
            .finish()
    }
}

/// Thread-safe session manager
pub struct SessionManager {
    /// Map of session ID to session
    sessions: DashMap<SessionId, Arc<Session>>,
    /// Map of IP address to list of session IDs (for connection limiting)
    ip_to_sessions: DashMap<String, Vec<SessionId>>,
    /// Next session ID to assign
    next_id: AtomicU64,
    /// Outbound queue length per session
    queue_capacity: usize,
    /// Maximum concurrent sessions
    max_sessions: usize,
    /// Maximum sessions per IP
    max_per_ip: usize,
}

impl SessionManager {
    /// Create a new session manager
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_QUEUE_CAPACITY, 500, 10)
    }

    /// Create a session manager with custom limits
    pub fn with_limits(queue_capacity: usize, max_sessions: usize, max_per_ip: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            ip_to_sessions: DashMap::new(),
            next_id: AtomicU64::new(1),
            queue_capacity: queue_capacity.max(1),
            max_sessions,
            max_per_ip,
        }
    }

    /// Create a new session and register it.
    ///
    /// Returns the session together with the receiving end of its outbound
    /// queue, which the connection's writer drains.
    pub fn create_session(
        &self,
        address: SocketAddr,
    ) -> Result<(Arc<Session>, mpsc::Receiver<OutboundEvent>)> {
        let ip = address.ip().to_string();

        if self.sessions.len() >= self.max_sessions {
            warn!(
                address = %address,
                max = self.max_sessions,
                "Server is full"
            );
            return Err(NetworkError::TooManyConnections(ip).into());
        }

        // Check connection limit per IP
        let current_count = self.ip_to_sessions.get(&ip).map(|v| v.len()).unwrap_or(0);
        if current_count >= self.max_per_ip {
            warn!(
                ip = %ip,
                count = current_count,
                max = self.max_per_ip,
                "Connection limit exceeded for IP"
            );
            return Err(NetworkError::TooManyConnections(ip).into());
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (outbound_tx, outbound_rx) = mpsc::channel(self.queue_capacity);
        let session = Arc::new(Session::new(id, address, outbound_tx));

        self.sessions.insert(id, session.clone());
        self.ip_to_sessions.entry(ip).or_default().push(id);

        info!(
            session_id = id,
            address = %address,
            "Session created"
        );

        Ok((session, outbound_rx))
    }

    /// Get a session by ID
    pub fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.get(&id).map(|r| r.clone())
    }

    /// Queue an event for one session.
    ///
    /// Never blocks; a full or closed queue drops the event. Returns whether
    /// the event was queued.
    pub fn send(&self, id: SessionId, event: OutboundEvent) -> bool {
        let Some(session) = self.get(id) else {
            debug!(session_id = id, event = event.name(), "Dropping event for unknown session");
            return false;
        };

        match session.try_send(event) {
            Ok(()) => true,
            Err(NetworkError::WriteBufferFull) => {
                warn!(session_id = id, "Outbound queue full, dropping event");
                false
            }
            Err(e) => {
                debug!(session_id = id, error = %e, "Dropping event for closing session");
                false
            }
        }
    }

    /// Queue a copy of an event for every listed session
    pub fn broadcast(&self, ids: &[SessionId], event: &OutboundEvent) -> usize {
        ids.iter()
            .filter(|&&id| self.send(id, event.clone()))
            .count()
    }

    /// Remove a session
    pub fn remove(&self, id: SessionId) {
        if let Some((_, session)) = self.sessions.remove(&id) {
            let ip = session.ip();
            if let Some(mut sessions) = self.ip_to_sessions.get_mut(&ip) {
                sessions.retain(|&sid| sid != id);
            }
            self.ip_to_sessions.retain(|_, v| !v.is_empty());

            info!(
                session_id = id,
                connected_for = ?session.created_at.elapsed(),
                "Session removed"
            );
        }
    }

    /// Get the count of active sessions
    pub fn count(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_address() -> SocketAddr {
        "127.0.0.1:12345".parse().unwrap()
    }

    fn stopped(player_id: u32) -> OutboundEvent {
        OutboundEvent::MoveStopped {
            player_id,
            x: 0,
            y: 0,
        }
    }

    #[test]
    fn test_session_manager_create() {
        let manager = SessionManager::new();
        let (session, _rx) = manager.create_session(test_address()).unwrap();

        assert_eq!(session.id, 1);
        assert_eq!(manager.count(), 1);
        assert_eq!(manager.get(1).unwrap().id, 1);
    }

    #[test]
    fn test_session_manager_remove() {
        let manager = SessionManager::new();
        let (session, _rx) = manager.create_session(test_address()).unwrap();
        let id = session.id;

        manager.remove(id);

        assert!(manager.get(id).is_none());
        assert_eq!(manager.count(), 0);
        assert!(manager.ip_to_sessions.is_empty());
    }

    #[test]
    fn test_session_manager_ip_limit() {
        let manager = SessionManager::with_limits(8, 100, 2);
        let addr1: SocketAddr = "192.168.1.1:12345".parse().unwrap();
        let addr2: SocketAddr = "192.168.1.1:12346".parse().unwrap();
        let addr3: SocketAddr = "192.168.1.1:12347".parse().unwrap();

        assert!(manager.create_session(addr1).is_ok());
        assert!(manager.create_session(addr2).is_ok());
        assert!(manager.create_session(addr3).is_err()); // Should fail - limit exceeded
        assert_eq!(manager.ip_to_sessions.get("192.168.1.1").map(|v| v.len()), Some(2));

        // A slot frees up once a session leaves
        manager.remove(1);
        assert!(manager.create_session(addr3).is_ok());
    }

    #[test]
    fn test_session_manager_total_limit() {
        let manager = SessionManager::with_limits(8, 1, 10);
        assert!(manager.create_session("10.0.0.1:1".parse().unwrap()).is_ok());
        assert!(manager.create_session("10.0.0.2:1".parse().unwrap()).is_err());
    }

    #[tokio::test]
    async fn test_send_and_receive() {
        let manager = SessionManager::new();
        let (session, mut rx) = manager.create_session(test_address()).unwrap();

        assert!(manager.send(session.id, stopped(1)));
        assert_eq!(rx.recv().await, Some(stopped(1)));
    }

    #[test]
    fn test_send_to_unknown_session() {
        let manager = SessionManager::new();
        assert!(!manager.send(42, stopped(1)));
    }

    #[test]
    fn test_full_queue_drops_events() {
        let manager = SessionManager::with_limits(1, 10, 10);
        let (session, mut rx) = manager.create_session(test_address()).unwrap();

        assert!(manager.send(session.id, stopped(1)));
        assert!(!manager.send(session.id, stopped(2)));

        assert_eq!(rx.try_recv().ok(), Some(stopped(1)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_queue() {
        let manager = SessionManager::new();
        let (session, rx) = manager.create_session(test_address()).unwrap();
        drop(rx);

        assert_eq!(
            session.try_send(stopped(1)),
            Err(NetworkError::ConnectionClosed)
        );
    }

    #[test]
    fn test_broadcast() {
        let manager = SessionManager::new();
        let (a, mut rx_a) = manager.create_session("127.0.0.1:1".parse().unwrap()).unwrap();
        let (b, mut rx_b) = manager.create_session("127.0.0.1:2".parse().unwrap()).unwrap();
        let (_c, mut rx_c) = manager.create_session("127.0.0.1:3".parse().unwrap()).unwrap();

        let delivered = manager.broadcast(&[a.id, b.id, 99], &stopped(5));
        assert_eq!(delivered, 2);

        assert_eq!(rx_a.try_recv().ok(), Some(stopped(5)));
        assert_eq!(rx_b.try_recv().ok(), Some(stopped(5)));
        assert!(rx_c.try_recv().is_err());
    }
}

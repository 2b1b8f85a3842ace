use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::time::Instant;

use crate::core::{Hash, PieceBlock};
use crate::error::ErrorCode;
use crate::peer::{PeerConnection, PeerConnector, PeerStats};

#[derive(Debug, Default)]
struct TestState {
    connected: bool,
    closed: Option<ErrorCode>,
    disconnect_reason: Option<ErrorCode>,
    requested: Vec<PieceBlock>,
    stats: PeerStats,
    ticks: usize,
}

/// Scripted connection. Clones share their state, so a test can keep one clone and hand the
/// other to a transfer.
#[derive(Debug, Clone)]
pub struct TestConnection {
    endpoint: SocketAddr,
    state: Arc<Mutex<TestState>>,
}

impl TestConnection {
    pub fn new(endpoint: SocketAddr) -> Self {
        Self {
            endpoint,
            state: Arc::default(),
        }
    }

    pub fn boxed(&self) -> Box<dyn PeerConnection> {
        Box::new(self.clone())
    }

    pub fn request(&self, block: PieceBlock) {
        self.state.lock().unwrap().requested.push(block);
    }

    /// Simulates the remote side going away
    pub fn drop_connection(&self, reason: ErrorCode) {
        self.state.lock().unwrap().disconnect_reason = Some(reason);
    }

    pub fn report(&self, stats: PeerStats) {
        self.state.lock().unwrap().stats = stats;
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    pub fn closed(&self) -> Option<ErrorCode> {
        self.state.lock().unwrap().closed
    }

    pub fn ticks(&self) -> usize {
        self.state.lock().unwrap().ticks
    }
}

impl PeerConnection for TestConnection {
    fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    fn connect(&mut self) {
        self.state.lock().unwrap().connected = true;
    }

    fn close(&mut self, reason: ErrorCode) {
        let mut state = self.state.lock().unwrap();
        state.connected = false;
        state.closed = Some(reason);
        state.disconnect_reason = Some(reason);
    }

    fn is_disconnecting(&self) -> bool {
        self.state.lock().unwrap().disconnect_reason.is_some()
    }

    fn disconnect_reason(&self) -> Option<ErrorCode> {
        self.state.lock().unwrap().disconnect_reason
    }

    fn second_tick(&mut self, _now: Instant) -> PeerStats {
        let mut state = self.state.lock().unwrap();
        state.ticks += 1;
        std::mem::take(&mut state.stats)
    }

    fn take_requested_blocks(&mut self) -> Vec<PieceBlock> {
        std::mem::take(&mut self.state.lock().unwrap().requested)
    }
}

/// Connector handing out `TestConnection`s
#[derive(Debug, Clone, Default)]
pub struct TestConnector {
    connections: Arc<Mutex<Vec<TestConnection>>>,
}

impl TestConnector {
    pub fn connections(&self) -> Vec<TestConnection> {
        self.connections.lock().unwrap().clone()
    }
}

impl PeerConnector for TestConnector {
    fn connect(&self, _hash: Hash, endpoint: SocketAddr) -> Box<dyn PeerConnection> {
        let connection = TestConnection::new(endpoint);
        self.connections.lock().unwrap().push(connection.clone());
        connection.boxed()
    }
}

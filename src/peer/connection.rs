use std::net::SocketAddr;

use tokio::time::Instant;

use crate::core::{Hash, PieceBlock};
use crate::error::ErrorCode;
use crate::peer::PeerStats;

/// A connection to a single peer, owned by the transfer it serves
pub trait PeerConnection: Send {
    fn endpoint(&self) -> SocketAddr;

    /// Starts connecting to the remote endpoint
    fn connect(&mut self);

    fn close(&mut self, reason: ErrorCode);

    /// The connection is gone or going away and should be dropped by its transfer
    fn is_disconnecting(&self) -> bool;

    /// Why the connection went away, if known
    fn disconnect_reason(&self) -> Option<ErrorCode>;

    fn second_tick(&mut self, now: Instant) -> PeerStats;

    /// Blocks requested from the peer and not received yet
    fn take_requested_blocks(&mut self) -> Vec<PieceBlock>;
}

/// Creates outgoing connections
pub trait PeerConnector: Send + Sync {
    fn connect(&self, hash: Hash, endpoint: SocketAddr) -> Box<dyn PeerConnection>;
}

use std::cmp::Reverse;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use log::debug;
use priority_queue::PriorityQueue;
use tokio::time::Instant;

use crate::config::Config;
use crate::error::ErrorCode;

#[derive(Debug, Clone, Copy)]
struct PeerEntry {
    fail_count: u32,
    connected: bool,
}

/// Known peers of a transfer and the order in which to connect to them.
///
/// Peers that are not connected wait in a queue ordered by the time they may be contacted
/// again, then by number of failed attempts. Every failure pushes that time further away.
pub struct Policy {
    peers: HashMap<SocketAddr, PeerEntry>,
    candidates: PriorityQueue<SocketAddr, Reverse<(Instant, u32)>>,
    max_peer_list_size: usize,
    max_fail_count: u32,
    backoff: Duration,
}

impl Policy {
    pub fn new(config: &Config) -> Self {
        Self {
            peers: HashMap::new(),
            candidates: PriorityQueue::new(),
            max_peer_list_size: config.max_peer_list_size,
            max_fail_count: config.max_fail_count,
            backoff: config.peer_connect_backoff,
        }
    }

    /// Learns about a peer from source discovery. Returns `false` if the peer is already known
    /// or the list is full.
    pub fn add_peer(&mut self, endpoint: SocketAddr, now: Instant) -> bool {
        if self.peers.contains_key(&endpoint) || self.peers.len() >= self.max_peer_list_size {
            return false;
        }
        self.peers.insert(
            endpoint,
            PeerEntry {
                fail_count: 0,
                connected: false,
            },
        );
        self.candidates.push(endpoint, Reverse((now, 0)));
        true
    }

    /// Registers a connection that was established by other means than `connect_one_peer`
    pub fn new_connection(&mut self, endpoint: SocketAddr) -> bool {
        let full = self.peers.len() >= self.max_peer_list_size;
        match self.peers.get_mut(&endpoint) {
            Some(entry) => entry.connected = true,
            None if full => return false,
            None => {
                self.peers.insert(
                    endpoint,
                    PeerEntry {
                        fail_count: 0,
                        connected: true,
                    },
                );
            }
        }
        self.candidates.remove(&endpoint);
        true
    }

    pub fn connection_closed(&mut self, endpoint: SocketAddr, reason: ErrorCode, now: Instant) {
        let Some(entry) = self.peers.get_mut(&endpoint) else {
            return;
        };
        entry.connected = false;
        if !is_failure(reason) {
            self.candidates.push(endpoint, Reverse((now, entry.fail_count)));
            return;
        }
        entry.fail_count += 1;
        if entry.fail_count >= self.max_fail_count {
            debug!("forgetting peer {} after {} failures", endpoint, entry.fail_count);
            self.peers.remove(&endpoint);
            self.candidates.remove(&endpoint);
            return;
        }
        let next_connect = now + self.backoff * entry.fail_count;
        self.candidates
            .push(endpoint, Reverse((next_connect, entry.fail_count)));
    }

    pub fn num_peers(&self) -> usize {
        self.peers.len()
    }

    pub fn num_connect_candidates(&self) -> usize {
        self.candidates.len()
    }

    /// Picks the next peer to connect to, if any candidate may be contacted at `now`
    pub fn connect_one_peer(&mut self, now: Instant) -> Option<SocketAddr> {
        let (_, Reverse((next_connect, _))) = self.candidates.peek()?;
        if *next_connect > now {
            return None;
        }
        let (endpoint, _) = self.candidates.pop()?;
        if let Some(entry) = self.peers.get_mut(&endpoint) {
            entry.connected = true;
        }
        Some(endpoint)
    }
}

/// Closing a connection on our own initiative does not count against the peer
fn is_failure(reason: ErrorCode) -> bool {
    !matches!(
        reason,
        ErrorCode::TransferPaused | ErrorCode::TransferAborted | ErrorCode::TransferFinished
    )
}

use std::time::Duration;

/// Configuration shared by every transfer of a session
#[derive(Clone, Debug)]
pub struct Config {
    // Source Discovery Settings
    /// Minimal time between two source requests of an idle transfer
    pub sources_request_interval: Duration,

    // Peer Settings
    /// Maximum number of connections per transfer
    pub max_connections: usize,
    /// Maximum number of known peers per transfer
    pub max_peer_list_size: usize,
    /// Failed connection attempts after which a peer is forgotten
    pub max_fail_count: u32,
    /// Delay added before reconnecting, multiplied by the number of failures
    pub peer_connect_backoff: Duration,

    // Disk Settings
    /// Number of block buffers in the session buffer pool
    pub buffer_pool_size: usize,
    /// Time after which unused free buffers are released
    pub buffer_idle_timeout: Duration,

    // Event System Settings
    /// Size of the alerts queue
    pub alerts_buffer: usize,
    /// Size of the source requests queue
    pub sources_buffer: usize,
    /// Interval between transfer ticks
    pub tick_interval: Duration,
}

impl Config {
    pub fn with_sources_request_interval(mut self, interval: Duration) -> Self {
        self.sources_request_interval = interval;
        self
    }

    pub fn with_max_connections(mut self, n: usize) -> Self {
        self.max_connections = n;
        self
    }

    pub fn with_max_peer_list_size(mut self, n: usize) -> Self {
        self.max_peer_list_size = n;
        self
    }

    pub fn with_max_fail_count(mut self, n: u32) -> Self {
        self.max_fail_count = n;
        self
    }

    pub fn with_peer_connect_backoff(mut self, backoff: Duration) -> Self {
        self.peer_connect_backoff = backoff;
        self
    }

    pub fn with_buffer_pool_size(mut self, n: usize) -> Self {
        self.buffer_pool_size = n;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sources_request_interval: Duration::from_secs(60),
            max_connections: 15,
            max_peer_list_size: 200,
            max_fail_count: 3,
            peer_connect_backoff: Duration::from_secs(30),
            buffer_pool_size: 256,
            buffer_idle_timeout: Duration::from_secs(60),
            alerts_buffer: 256,
            sources_buffer: 64,
            tick_interval: Duration::from_secs(1),
        }
    }
}

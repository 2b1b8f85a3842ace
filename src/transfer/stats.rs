use std::time::Duration;

use crate::core::TransferRate;
use crate::peer::PeerStats;

#[derive(Debug, Default, Clone, Copy)]
struct Channel {
    total: u64,
    /// Bytes accumulated since the last tick
    current: u64,
    /// Bytes of the last complete tick
    last: u64,
}

impl Channel {
    fn add(&mut self, bytes: u64) {
        self.current += bytes;
    }

    fn second_tick(&mut self) {
        self.total += self.current;
        self.last = self.current;
        self.current = 0;
    }
}

/// Traffic counters of a transfer, fed by its connections
#[derive(Debug, Default, Clone)]
pub struct Statistics {
    download_payload: Channel,
    download_protocol: Channel,
    upload_payload: Channel,
    upload_protocol: Channel,
    elapsed: Duration,
}

impl Statistics {
    pub fn add(&mut self, stats: PeerStats) {
        self.download_payload.add(stats.download_payload);
        self.download_protocol.add(stats.download_protocol);
        self.upload_payload.add(stats.upload_payload);
        self.upload_protocol.add(stats.upload_protocol);
    }

    pub fn second_tick(&mut self, elapsed: Duration) {
        self.download_payload.second_tick();
        self.download_protocol.second_tick();
        self.upload_payload.second_tick();
        self.upload_protocol.second_tick();
        self.elapsed = elapsed;
    }

    pub fn download_rate(&self) -> TransferRate {
        self.rate(self.download_payload.last + self.download_protocol.last)
    }

    pub fn download_payload_rate(&self) -> TransferRate {
        self.rate(self.download_payload.last)
    }

    pub fn upload_rate(&self) -> TransferRate {
        self.rate(self.upload_payload.last + self.upload_protocol.last)
    }

    pub fn upload_payload_rate(&self) -> TransferRate {
        self.rate(self.upload_payload.last)
    }

    pub fn total_download(&self) -> u64 {
        self.download_payload.total + self.download_protocol.total
    }

    pub fn total_download_payload(&self) -> u64 {
        self.download_payload.total
    }

    pub fn total_upload(&self) -> u64 {
        self.upload_payload.total + self.upload_protocol.total
    }

    pub fn total_upload_payload(&self) -> u64 {
        self.upload_payload.total
    }

    fn rate(&self, bytes: u64) -> TransferRate {
        TransferRate::new(bytes, self.elapsed)
    }
}

mod alert;

use std::sync::Arc;

use log::{debug, warn};
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::time::Instant;

use crate::config::Config;
use crate::core::Hash;
use crate::disk::{BufferPool, DiskIo};
use crate::peer::PeerConnector;

pub use alert::*;

/// What a transfer needs from the session owning it
pub struct SessionContext {
    pub config: Config,
    pub disk: Arc<dyn DiskIo>,
    pub buffer_pool: BufferPool,
    pub connector: Option<Arc<dyn PeerConnector>>,
    alerts: Sender<Alert>,
    sources: Sender<SourcesRequest>,
}

impl SessionContext {
    /// Returns the context along with the receiving ends of the alerts and source requests
    pub fn new(
        config: Config,
        disk: Arc<dyn DiskIo>,
    ) -> (Self, Receiver<Alert>, Receiver<SourcesRequest>) {
        let (alerts, alerts_rx) = mpsc::channel(config.alerts_buffer);
        let (sources, sources_rx) = mpsc::channel(config.sources_buffer);
        let buffer_pool = BufferPool::new(config.buffer_pool_size);
        let context = Self {
            config,
            disk,
            buffer_pool,
            connector: None,
            alerts,
            sources,
        };
        (context, alerts_rx, sources_rx)
    }

    pub fn with_connector(mut self, connector: Arc<dyn PeerConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn post_alert(&self, alert: Alert) {
        if let Err(err) = self.alerts.try_send(alert) {
            warn!("failed posting alert: {:?}", err);
        }
    }

    /// Periodic housekeeping shared by all transfers
    pub fn second_tick(&self, now: Instant) {
        let freed = self
            .buffer_pool
            .trim(now, self.config.buffer_idle_timeout);
        if freed > 0 {
            debug!("released {} idle buffers", freed);
        }
    }

    pub fn send_sources_request(&self, hash: Hash, size: u64) {
        if let Err(err) = self.sources.try_send(SourcesRequest { hash, size }) {
            warn!("failed sending sources request: {:?}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::TokioDisk;

    #[test]
    fn full_alerts_queue_drops_alerts() {
        let config = Config {
            alerts_buffer: 1,
            ..Config::default()
        };
        let (context, mut alerts, _sources) = SessionContext::new(config, Arc::new(TokioDisk));
        let hash = Hash::default();

        context.post_alert(Alert::TransferAdded { hash });
        context.post_alert(Alert::TransferRemoved { hash });

        assert_eq!(alerts.try_recv().unwrap(), Alert::TransferAdded { hash });
        assert!(alerts.try_recv().is_err());
    }

    #[test]
    fn closed_sources_channel_is_tolerated() {
        let (context, _alerts, sources) =
            SessionContext::new(Config::default(), Arc::new(TokioDisk));
        drop(sources);

        context.send_sources_request(Hash::default(), 42);
    }

    #[test]
    fn trim_idle_buffers() {
        let (context, _alerts, _sources) =
            SessionContext::new(Config::default(), Arc::new(TokioDisk));
        let now = Instant::now();
        let buffer = context.buffer_pool.allocate().unwrap();
        context.buffer_pool.deallocate(buffer, now);

        context.second_tick(now + context.config.buffer_idle_timeout);

        let reused = context.buffer_pool.allocate();
        assert!(reused.is_some());
        assert_eq!(context.buffer_pool.in_use(), 1);
    }

    #[test]
    fn buffer_pool_sized_from_config() {
        let config = Config::default().with_buffer_pool_size(4);
        let (context, _alerts, _sources) = SessionContext::new(config, Arc::new(TokioDisk));

        assert_eq!(context.buffer_pool.capacity(), 4);
    }
}

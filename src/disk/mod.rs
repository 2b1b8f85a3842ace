//! Asynchronous disk jobs.
//!
//! A transfer never waits for the disk. It submits a `DiskOperation` and keeps the returned
//! `DiskHandle`, which it polls from its tick until the job completes.

mod buffer_pool;
mod piece_manager;
#[cfg(test)]
pub mod testing;

use std::io;
use std::sync::Arc;

use futures::FutureExt;
use log::debug;
use tokio::sync::oneshot::{self, Receiver};
use tokio_util::sync::CancellationToken;

use crate::core::{Hash, PieceBlock};

pub use buffer_pool::*;
pub use piece_manager::*;

#[derive(Debug)]
pub enum DiskOperation {
    /// Store a block received from the network
    Write { block: PieceBlock, buffer: Buffer },
    /// Read back a block recorded in resume data
    Restore { block: PieceBlock, buffer: Buffer },
    HashPiece { piece: usize },
    Release,
    Delete,
}

#[derive(Debug)]
pub enum DiskCompletion {
    Block {
        block: PieceBlock,
        restore: bool,
        buffer: Option<Buffer>,
        result: io::Result<()>,
    },
    Hash {
        piece: usize,
        result: io::Result<Hash>,
    },
    Release {
        result: io::Result<()>,
    },
    Delete {
        result: io::Result<()>,
    },
}

impl DiskOperation {
    pub async fn run(self, manager: &PieceManager) -> DiskCompletion {
        match self {
            Self::Write { block, buffer } => {
                let result = manager.write_block(block, &buffer).await;
                DiskCompletion::Block {
                    block,
                    restore: false,
                    buffer: Some(buffer),
                    result,
                }
            }
            Self::Restore { block, mut buffer } => {
                let length = manager.sizes().block_size(block) as usize;
                buffer.resize(length, 0);
                let result = manager.read_block(block, &mut buffer).await;
                DiskCompletion::Block {
                    block,
                    restore: true,
                    buffer: Some(buffer),
                    result,
                }
            }
            Self::HashPiece { piece } => DiskCompletion::Hash {
                piece,
                result: manager.hash_piece(piece).await,
            },
            Self::Release => DiskCompletion::Release {
                result: manager.release().await,
            },
            Self::Delete => DiskCompletion::Delete {
                result: manager.delete().await,
            },
        }
    }
}

/// Where transfers submit their disk jobs
pub trait DiskIo: Send + Sync {
    fn submit(&self, manager: Arc<PieceManager>, operation: DiskOperation) -> DiskHandle;
}

/// Result of polling a `DiskHandle`
#[derive(Debug)]
pub enum DiskPoll {
    Pending,
    Ready(DiskCompletion),
    /// The job went away without reporting a result
    Dropped,
}

/// Pending disk job
#[derive(Debug)]
pub struct DiskHandle {
    rx: Receiver<DiskCompletion>,
    token: CancellationToken,
}

impl DiskHandle {
    pub fn new(rx: Receiver<DiskCompletion>, token: CancellationToken) -> Self {
        Self { rx, token }
    }

    /// Checks for completion without blocking. Must not be called again once it returned
    /// `Ready` or `Dropped`.
    pub fn poll(&mut self) -> DiskPoll {
        match (&mut self.rx).now_or_never() {
            None => DiskPoll::Pending,
            Some(Ok(completion)) => DiskPoll::Ready(completion),
            Some(Err(_)) => DiskPoll::Dropped,
        }
    }

    /// Best effort, a job that is already running may still complete
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

/// Runs every job on its own tokio task.
///
/// A job cancelled before its task starts is skipped. A started job runs to the end: file
/// calls are handed to blocking threads, and dropping them halfway would let them land after
/// a later `Delete`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioDisk;

impl DiskIo for TokioDisk {
    fn submit(&self, manager: Arc<PieceManager>, operation: DiskOperation) -> DiskHandle {
        let (tx, rx) = oneshot::channel();
        let token = CancellationToken::new();
        let cancelled = token.clone();
        tokio::spawn(async move {
            if cancelled.is_cancelled() {
                debug!("disk job for {} cancelled", manager.file_path().display());
                return;
            }
            let completion = operation.run(&manager).await;
            if tx.send(completion).is_err() {
                debug!("disk completion dropped, nobody is waiting for it");
            }
        });
        DiskHandle::new(rx, token)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::core::{BLOCK_SIZE, Sizes};

    fn manager(name: &str, size: u64) -> Arc<PieceManager> {
        let path = std::env::temp_dir().join(format!("rustdonkey-disk-{}-{}", name, std::process::id()));
        Arc::new(PieceManager::new(path, Sizes::new(size)))
    }

    async fn wait(handle: &mut DiskHandle) -> DiskPoll {
        loop {
            match handle.poll() {
                DiskPoll::Pending => tokio::time::sleep(Duration::from_millis(1)).await,
                other => return other,
            }
        }
    }

    #[tokio::test]
    async fn write_then_restore_block() {
        let pool = BufferPool::new(2);
        let manager = manager("restore", BLOCK_SIZE);
        let block = PieceBlock::new(0, 0);
        let mut buffer = pool.allocate().unwrap();
        buffer.resize(BLOCK_SIZE as usize, 7);

        let mut write = TokioDisk.submit(Arc::clone(&manager), DiskOperation::Write { block, buffer });
        let DiskPoll::Ready(DiskCompletion::Block { result, restore, .. }) = wait(&mut write).await
        else {
            panic!("unexpected completion");
        };
        assert!(result.is_ok());
        assert!(!restore);

        let buffer = pool.allocate().unwrap();
        let mut read = TokioDisk.submit(Arc::clone(&manager), DiskOperation::Restore { block, buffer });
        let DiskPoll::Ready(DiskCompletion::Block {
            result,
            restore,
            buffer: Some(buffer),
            ..
        }) = wait(&mut read).await
        else {
            panic!("unexpected completion");
        };
        assert!(result.is_ok());
        assert!(restore);
        assert!(buffer.iter().all(|byte| *byte == 7));

        drop(buffer);
        assert_eq!(pool.in_use(), 0);
        manager.delete().await.unwrap();
    }

    #[tokio::test]
    async fn dropped_job() {
        let (tx, rx) = oneshot::channel();
        let mut handle = DiskHandle::new(rx, CancellationToken::new());
        assert!(matches!(handle.poll(), DiskPoll::Pending));

        drop(tx);

        assert!(matches!(handle.poll(), DiskPoll::Dropped));
    }
}

use std::io;
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot::{self, Sender};
use tokio_util::sync::CancellationToken;

use crate::core::Hash;
use crate::disk::{DiskCompletion, DiskHandle, DiskIo, DiskOperation, PieceManager};

struct Job {
    operation: DiskOperation,
    tx: Sender<DiskCompletion>,
    token: CancellationToken,
}

/// Disk that never runs anything by itself. Tests pick which job completes, in which order and
/// with which outcome. Jobs are identified by their submission order, starting at 0.
#[derive(Clone, Default)]
pub struct ManualDisk {
    jobs: Arc<Mutex<Vec<Option<Job>>>>,
}

impl DiskIo for ManualDisk {
    fn submit(&self, _manager: Arc<PieceManager>, operation: DiskOperation) -> DiskHandle {
        let (tx, rx) = oneshot::channel();
        let token = CancellationToken::new();
        let job = Job {
            operation,
            tx,
            token: token.clone(),
        };
        self.jobs.lock().unwrap().push(Some(job));
        DiskHandle::new(rx, token)
    }
}

impl ManualDisk {
    pub fn submitted(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    /// Short description of every job not completed yet, with its id
    pub fn pending(&self) -> Vec<(usize, String)> {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .enumerate()
            .filter_map(|(id, job)| job.as_ref().map(|job| (id, describe(&job.operation))))
            .collect()
    }

    pub fn is_cancelled(&self, id: usize) -> bool {
        self.jobs.lock().unwrap()[id]
            .as_ref()
            .is_some_and(|job| job.token.is_cancelled())
    }

    /// Completes a job successfully. Hash jobs report `Hash::default()`.
    pub fn complete(&self, id: usize) {
        self.complete_hash(id, Hash::default());
    }

    /// Completes a job successfully, hash jobs report `hash`
    pub fn complete_hash(&self, id: usize, hash: Hash) {
        let job = self.take(id);
        let completion = match job.operation {
            DiskOperation::Write { block, buffer } => DiskCompletion::Block {
                block,
                restore: false,
                buffer: Some(buffer),
                result: Ok(()),
            },
            DiskOperation::Restore { block, buffer } => DiskCompletion::Block {
                block,
                restore: true,
                buffer: Some(buffer),
                result: Ok(()),
            },
            DiskOperation::HashPiece { piece } => DiskCompletion::Hash {
                piece,
                result: Ok(hash),
            },
            DiskOperation::Release => DiskCompletion::Release { result: Ok(()) },
            DiskOperation::Delete => DiskCompletion::Delete { result: Ok(()) },
        };
        let _ = job.tx.send(completion);
    }

    pub fn fail(&self, id: usize) {
        let job = self.take(id);
        let error = || io::Error::other("disk failure");
        let restore = matches!(job.operation, DiskOperation::Restore { .. });
        let completion = match job.operation {
            DiskOperation::Write { block, buffer } | DiskOperation::Restore { block, buffer } => {
                DiskCompletion::Block {
                    block,
                    restore,
                    buffer: Some(buffer),
                    result: Err(error()),
                }
            }
            DiskOperation::HashPiece { piece } => DiskCompletion::Hash {
                piece,
                result: Err(error()),
            },
            DiskOperation::Release => DiskCompletion::Release { result: Err(error()) },
            DiskOperation::Delete => DiskCompletion::Delete { result: Err(error()) },
        };
        let _ = job.tx.send(completion);
    }

    /// Drops a job without reporting anything
    pub fn drop_job(&self, id: usize) {
        drop(self.take(id));
    }

    fn take(&self, id: usize) -> Job {
        self.jobs.lock().unwrap()[id]
            .take()
            .unwrap_or_else(|| panic!("job {id} already completed"))
    }
}

fn describe(operation: &DiskOperation) -> String {
    match operation {
        DiskOperation::Write { block, .. } => format!("write {block}"),
        DiskOperation::Restore { block, .. } => format!("restore {block}"),
        DiskOperation::HashPiece { piece } => format!("hash {piece}"),
        DiskOperation::Release => "release".to_string(),
        DiskOperation::Delete => "delete".to_string(),
    }
}
